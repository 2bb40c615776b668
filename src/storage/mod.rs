//! [`SubscriptionRepository`](crate::SubscriptionRepository) implementations.

mod memory;
mod sqlite;

pub use memory::MemoryRepository;
pub use sqlite::{SqliteRepository, StorageError};

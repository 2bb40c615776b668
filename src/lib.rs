//! Subscriber side of the WebSub (PubSubHubbub) protocol.
//!
//! - [`discovery`] resolves a topic's canonical URL and hubs
//! - [`protocol`] encodes hub requests, fans them out and decodes hub callbacks
//! - [`Subscriber`] drives the subscription lifecycle against an injected
//!   [`SubscriptionRepository`] and [`SubscriberDelegate`]
//! - [`storage`] provides in-memory and SQLite repositories

pub mod config;
pub mod discovery;
pub mod error;
pub mod protocol;
pub mod storage;
pub mod subscriber;
pub mod subscription;
pub mod util;

pub use error::SubscriberError;
pub use subscriber::{Subscriber, SubscriberDelegate, SubscriptionRepository};
pub use subscription::{Subscription, SubscriptionMark};

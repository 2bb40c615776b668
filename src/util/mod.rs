//! Shared helpers.
//!
//! - **Endpoint policy**: scheme and host checks applied to every outbound
//!   topic or hub URL before a request is made
//!
//! # Examples
//!
//! ```
//! use url::Url;
//! use websub_subscriber::util::EndpointPolicy;
//!
//! let policy = EndpointPolicy::default();
//! assert!(policy.check(&Url::parse("https://example.com/feed").unwrap()).is_ok());
//! assert!(policy.check(&Url::parse("http://192.168.1.1/hub").unwrap()).is_err());
//! ```

mod endpoint;

pub use endpoint::{EndpointError, EndpointPolicy};

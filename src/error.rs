use thiserror::Error;
use url::Url;

use crate::discovery::DiscoveryError;
use crate::protocol::SubscriptionVerification;
use crate::util::EndpointError;

/// Errors surfaced by [`Subscriber`](crate::Subscriber) operations.
///
/// Every error is scoped to the single call that produced it. Per-hub
/// announcement failures are not errors; they are reported in
/// [`AnnounceReport`](crate::protocol::AnnounceReport).
#[derive(Debug, Error)]
pub enum SubscriberError {
    #[error("discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),
    #[error("endpoint rejected: {0}")]
    Endpoint(#[from] EndpointError),
    /// The subscription was not pending in the verified mode, or the topic differs
    #[error("verification was not requested ({} for {})", .0.mode, .0.topic)]
    VerificationNotRequested(SubscriptionVerification),
    #[error("no subscription for callback {0}")]
    SubscriptionNotFound(Url),
    #[error("received payload for inactive subscription {0}")]
    InactiveSubscription(Url),
    /// Payload is neither a verification nor a denial
    #[error("validation payload matches neither verification nor denial")]
    UnidentifiedValidation,
    #[error("repository error: {0:#}")]
    Repository(#[source] anyhow::Error),
    #[error("delegate error: {0:#}")]
    Delegate(#[source] anyhow::Error),
}

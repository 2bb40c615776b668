//! Subscription records and their lifecycle.
//!
//! A [`Subscription`] is an immutable value owned by the repository. The
//! functions here only compute the next record; persisting it is always the
//! repository's job.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::protocol::{
    SubscriptionDenial, SubscriptionMode, SubscriptionRequest, SubscriptionVerification,
};

/// A recorded lifecycle transition.
///
/// The latest mark is the subscription's current state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "record", rename_all = "snake_case")]
pub enum SubscriptionMark {
    PendingSubscription(SubscriptionRequest),
    PendingUnsubscription(SubscriptionRequest),
    Subscribed(SubscriptionVerification),
    Unsubscribed(SubscriptionVerification),
    Denied(SubscriptionDenial),
}

impl SubscriptionMark {
    pub fn name(&self) -> &'static str {
        match self {
            Self::PendingSubscription(_) => "pending_subscription",
            Self::PendingUnsubscription(_) => "pending_unsubscription",
            Self::Subscribed(_) => "subscribed",
            Self::Unsubscribed(_) => "unsubscribed",
            Self::Denied(_) => "denied",
        }
    }
}

/// One subscription, keyed by its callback URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub callback: Url,
    pub topic: Url,
    pub hubs: Vec<Url>,
    /// Requested lease, replaced by the hub-granted one once verified
    pub lease_seconds: Option<u32>,
    /// `None` until the first transition is recorded
    pub state: Option<SubscriptionMark>,
}

impl Subscription {
    /// A freshly stored subscription with no recorded state.
    pub fn new(callback: Url, topic: Url, hubs: Vec<Url>, lease_seconds: Option<u32>) -> Self {
        Self {
            callback,
            topic,
            hubs,
            lease_seconds,
            state: None,
        }
    }

    pub fn is_pending_subscription(&self) -> bool {
        matches!(self.state, Some(SubscriptionMark::PendingSubscription(_)))
    }

    pub fn is_pending_unsubscription(&self) -> bool {
        matches!(self.state, Some(SubscriptionMark::PendingUnsubscription(_)))
    }

    /// Content is only accepted while the latest transition is `subscribed`.
    pub fn is_active(&self) -> bool {
        matches!(self.state, Some(SubscriptionMark::Subscribed(_)))
    }

    /// Builds the hub request for `mode` from this record.
    pub fn create_request(
        &self,
        mode: SubscriptionMode,
        lease_seconds: Option<u32>,
    ) -> SubscriptionRequest {
        SubscriptionRequest::new(&self.callback, &self.topic, mode, lease_seconds)
    }

    /// Returns the transition a verification triggers, or `None` when the
    /// subscription never asked for it.
    ///
    /// The subscription must be pending in the verification's mode, and the
    /// verified topic must equal the subscribed topic exactly.
    pub fn verification_mark(
        &self,
        verification: &SubscriptionVerification,
    ) -> Option<SubscriptionMark> {
        if verification.topic != self.topic.as_str() {
            return None;
        }
        match verification.mode {
            SubscriptionMode::Subscribe if self.is_pending_subscription() => {
                Some(SubscriptionMark::Subscribed(verification.clone()))
            }
            SubscriptionMode::Unsubscribe if self.is_pending_unsubscription() => {
                Some(SubscriptionMark::Unsubscribed(verification.clone()))
            }
            _ => None,
        }
    }

    /// The record after `mark` is applied.
    ///
    /// A subscribe verification that carries a granted lease replaces the
    /// stored lease.
    pub fn with_mark(&self, mark: SubscriptionMark) -> Subscription {
        let mut next = self.clone();
        if let SubscriptionMark::Subscribed(SubscriptionVerification {
            lease_seconds: Some(granted),
            ..
        }) = &mark
        {
            next.lease_seconds = Some(*granted);
        }
        next.state = Some(mark);
        next
    }
}

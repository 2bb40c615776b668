//! Subscriber core: subscribe/unsubscribe, inbound verification, and
//! content dispatch.
//!
//! Storage and application callbacks are injected through
//! [`SubscriptionRepository`] and [`SubscriberDelegate`]. The subscriber holds
//! no subscription state of its own; every call reads the current record
//! from the repository and asks it to persist the next one.

use async_trait::async_trait;
use url::Url;

use crate::discovery::{self, DiscoveryResult, DEFAULT_MAX_DISCOVERY_BYTES};
use crate::error::SubscriberError;
use crate::protocol::{
    announce, AnnounceReport, SubscriptionDenial, SubscriptionMode, SubscriptionValidation,
    SubscriptionVerification,
};
use crate::subscription::{Subscription, SubscriptionMark};
use crate::util::EndpointPolicy;

/// Persistent store of subscriptions, one per callback URL.
///
/// Implementations must serialize `mark` calls per callback so that a
/// verification and a denial racing for the same subscription cannot lose
/// an update.
#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    /// Creates (or replaces) the subscription for `callback`, with no state.
    async fn store(
        &self,
        callback: &Url,
        topic: &Url,
        hubs: &[Url],
        lease_seconds: Option<u32>,
    ) -> anyhow::Result<Subscription>;

    /// Records `mark` as the latest transition of `subscription`.
    ///
    /// Fails when no subscription exists for its callback.
    async fn mark(&self, subscription: &Subscription, mark: SubscriptionMark)
        -> anyhow::Result<()>;

    async fn subscription(&self, callback: &Url) -> anyhow::Result<Option<Subscription>>;

    async fn subscriptions(&self, topic: &Url) -> anyhow::Result<Vec<Subscription>>;
}

/// Application callbacks. Errors propagate to the caller as
/// [`SubscriberError::Delegate`].
#[async_trait]
pub trait SubscriberDelegate: Send + Sync {
    async fn on_received(&self, subscription: &Subscription, content: &[u8])
        -> anyhow::Result<()>;

    async fn on_verified(
        &self,
        subscription: &Subscription,
        verification: &SubscriptionVerification,
    ) -> anyhow::Result<()>;

    async fn on_denied(
        &self,
        subscription: &Subscription,
        denial: &SubscriptionDenial,
    ) -> anyhow::Result<()>;
}

/// The subscriber side of the hub protocol.
pub struct Subscriber<R, D> {
    client: reqwest::Client,
    repository: R,
    delegate: D,
    policy: EndpointPolicy,
    max_discovery_bytes: usize,
}

impl<R, D> Subscriber<R, D>
where
    R: SubscriptionRepository,
    D: SubscriberDelegate,
{
    /// Creates a subscriber with the default (strict) endpoint policy.
    ///
    /// Timeouts, redirects and the user agent are whatever `client` is
    /// configured with.
    pub fn new(client: reqwest::Client, repository: R, delegate: D) -> Self {
        Self {
            client,
            repository,
            delegate,
            policy: EndpointPolicy::default(),
            max_discovery_bytes: DEFAULT_MAX_DISCOVERY_BYTES,
        }
    }

    pub fn with_endpoint_policy(mut self, policy: EndpointPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_max_discovery_bytes(mut self, max_bytes: usize) -> Self {
        self.max_discovery_bytes = max_bytes;
        self
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Resolves the canonical topic and hubs for `topic`.
    ///
    /// Discovered hubs that the endpoint policy refuses are dropped; if none
    /// remain, the first refusal is returned.
    ///
    /// # Errors
    ///
    /// - [`SubscriberError::Endpoint`] - `topic` or every discovered hub is refused
    /// - [`SubscriberError::Discovery`] - no strategy produced a topic and a hub
    pub async fn discover(&self, topic: &Url) -> Result<DiscoveryResult, SubscriberError> {
        self.policy.check(topic)?;
        let (topic, hubs) = discovery::discover(&self.client, topic, self.max_discovery_bytes)
            .await?
            .into_parts();

        let mut allowed = Vec::with_capacity(hubs.len());
        let mut first_refusal = None;
        for hub in hubs {
            match self.policy.check(&hub) {
                Ok(()) => allowed.push(hub),
                Err(e) => {
                    tracing::warn!(hub = %hub, error = %e, "Ignoring discovered hub");
                    first_refusal.get_or_insert(e);
                }
            }
        }

        match (DiscoveryResult::new(topic, allowed), first_refusal) {
            (Some(result), _) => Ok(result),
            (None, Some(e)) => Err(e.into()),
            (None, None) => Err(discovery::DiscoveryError::NoHub.into()),
        }
    }

    /// Subscribes `callback` to `topic` and announces it to every hub.
    ///
    /// With a `preferred_hub`, discovery is skipped and the topic is used as
    /// given. Otherwise the discovered canonical topic and hub set are stored.
    ///
    /// Hub failures do not fail the call; inspect the returned report.
    ///
    /// # Errors
    ///
    /// Returns discovery, endpoint and repository errors. Nothing is stored
    /// when discovery fails.
    pub async fn subscribe(
        &self,
        topic: &Url,
        callback: &Url,
        lease_seconds: Option<u32>,
        preferred_hub: Option<&Url>,
    ) -> Result<AnnounceReport, SubscriberError> {
        let (topic, hubs) = match preferred_hub {
            Some(hub) => {
                self.policy.check(topic)?;
                self.policy.check(hub)?;
                (topic.clone(), vec![hub.clone()])
            }
            None => self.discover(topic).await?.into_parts(),
        };

        let subscription = self
            .repository
            .store(callback, &topic, &hubs, lease_seconds)
            .await
            .map_err(SubscriberError::Repository)?;

        let request = subscription.create_request(SubscriptionMode::Subscribe, lease_seconds);
        self.repository
            .mark(
                &subscription,
                SubscriptionMark::PendingSubscription(request.clone()),
            )
            .await
            .map_err(SubscriberError::Repository)?;

        tracing::info!(
            callback = %callback,
            topic = %subscription.topic,
            hubs = subscription.hubs.len(),
            "Subscription pending"
        );

        Ok(announce(&self.client, &request, &subscription.hubs).await)
    }

    /// Requests removal of the subscription for `callback` from all its hubs.
    ///
    /// # Errors
    ///
    /// [`SubscriberError::SubscriptionNotFound`] when `callback` is unknown,
    /// plus repository errors.
    pub async fn unsubscribe(&self, callback: &Url) -> Result<AnnounceReport, SubscriberError> {
        let subscription = self.find(callback).await?;

        let request = subscription.create_request(SubscriptionMode::Unsubscribe, None);
        self.repository
            .mark(
                &subscription,
                SubscriptionMark::PendingUnsubscription(request.clone()),
            )
            .await
            .map_err(SubscriberError::Repository)?;

        tracing::info!(callback = %callback, topic = %subscription.topic, "Unsubscription pending");

        Ok(announce(&self.client, &request, &subscription.hubs).await)
    }

    /// Applies a hub's verification or denial to the subscription for `callback`.
    ///
    /// A verification must match the pending mode and the subscribed topic. A
    /// denial is always accepted. On success the delegate is notified with
    /// the updated record; the caller then echoes the challenge (if any) to
    /// the hub.
    ///
    /// # Errors
    ///
    /// - [`SubscriberError::SubscriptionNotFound`] - unknown callback
    /// - [`SubscriberError::VerificationNotRequested`] - mode or topic mismatch;
    ///   the record is left unchanged
    /// - [`SubscriberError::Repository`] / [`SubscriberError::Delegate`]
    pub async fn verify(
        &self,
        validation: &SubscriptionValidation,
        callback: &Url,
    ) -> Result<(), SubscriberError> {
        let subscription = self.find(callback).await?;

        match validation {
            SubscriptionValidation::Verifying(verification) => {
                let Some(mark) = subscription.verification_mark(verification) else {
                    tracing::warn!(
                        callback = %callback,
                        mode = %verification.mode,
                        topic = %verification.topic,
                        "Rejected unrequested verification"
                    );
                    return Err(SubscriberError::VerificationNotRequested(
                        verification.clone(),
                    ));
                };
                let transition = mark.name();
                self.repository
                    .mark(&subscription, mark)
                    .await
                    .map_err(SubscriberError::Repository)?;
                tracing::info!(callback = %callback, state = transition, "Subscription verified");

                let updated = self.find(callback).await?;
                self.delegate
                    .on_verified(&updated, verification)
                    .await
                    .map_err(SubscriberError::Delegate)
            }
            SubscriptionValidation::Denied(denial) => {
                self.repository
                    .mark(&subscription, SubscriptionMark::Denied(denial.clone()))
                    .await
                    .map_err(SubscriberError::Repository)?;
                tracing::info!(
                    callback = %callback,
                    reason = denial.reason.as_deref().unwrap_or(""),
                    "Subscription denied"
                );

                let updated = self.find(callback).await?;
                self.delegate
                    .on_denied(&updated, denial)
                    .await
                    .map_err(SubscriberError::Delegate)
            }
        }
    }

    /// Hands pushed `content` to the delegate, unchanged.
    ///
    /// # Errors
    ///
    /// [`SubscriberError::InactiveSubscription`] unless the latest transition
    /// is `subscribed`, plus not-found, repository and delegate errors.
    pub async fn receive(&self, content: &[u8], callback: &Url) -> Result<(), SubscriberError> {
        let subscription = self.find(callback).await?;
        if !subscription.is_active() {
            tracing::warn!(callback = %callback, "Dropping content for inactive subscription");
            return Err(SubscriberError::InactiveSubscription(callback.clone()));
        }

        tracing::debug!(callback = %callback, bytes = content.len(), "Dispatching content");
        self.delegate
            .on_received(&subscription, content)
            .await
            .map_err(SubscriberError::Delegate)
    }

    /// All subscriptions for `topic`.
    pub async fn subscriptions(&self, topic: &Url) -> Result<Vec<Subscription>, SubscriberError> {
        self.repository
            .subscriptions(topic)
            .await
            .map_err(SubscriberError::Repository)
    }

    async fn find(&self, callback: &Url) -> Result<Subscription, SubscriberError> {
        self.repository
            .subscription(callback)
            .await
            .map_err(SubscriberError::Repository)?
            .ok_or_else(|| SubscriberError::SubscriptionNotFound(callback.clone()))
    }
}

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;
use url::Url;

use crate::subscriber::SubscriptionRepository;
use crate::subscription::{Subscription, SubscriptionMark};

/// Process-local repository.
///
/// A single lock guards every record, so marks are serialized across all
/// callbacks.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    records: Mutex<HashMap<Url, Subscription>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SubscriptionRepository for MemoryRepository {
    async fn store(
        &self,
        callback: &Url,
        topic: &Url,
        hubs: &[Url],
        lease_seconds: Option<u32>,
    ) -> Result<Subscription> {
        let subscription = Subscription::new(
            callback.clone(),
            topic.clone(),
            hubs.to_vec(),
            lease_seconds,
        );
        self.records
            .lock()
            .await
            .insert(callback.clone(), subscription.clone());
        Ok(subscription)
    }

    async fn mark(&self, subscription: &Subscription, mark: SubscriptionMark) -> Result<()> {
        let mut records = self.records.lock().await;
        let current = records
            .get_mut(&subscription.callback)
            .ok_or_else(|| anyhow!("no subscription for callback {}", subscription.callback))?;
        *current = current.with_mark(mark);
        Ok(())
    }

    async fn subscription(&self, callback: &Url) -> Result<Option<Subscription>> {
        Ok(self.records.lock().await.get(callback).cloned())
    }

    async fn subscriptions(&self, topic: &Url) -> Result<Vec<Subscription>> {
        let records = self.records.lock().await;
        let mut matching: Vec<Subscription> = records
            .values()
            .filter(|s| &s.topic == topic)
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.callback.as_str().cmp(b.callback.as_str()));
        Ok(matching)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::SubscriptionMode;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_store_replaces_and_clears_state() {
        let repo = MemoryRepository::new();
        let callback = url("https://sub.example.com/cb");
        let topic = url("https://example.com/feed");

        let first = repo.store(&callback, &topic, &[], None).await.unwrap();
        let request = first.create_request(SubscriptionMode::Subscribe, None);
        repo.mark(&first, SubscriptionMark::PendingSubscription(request))
            .await
            .unwrap();

        let other_topic = url("https://example.com/other");
        repo.store(&callback, &other_topic, &[], Some(60)).await.unwrap();

        let stored = repo.subscription(&callback).await.unwrap().unwrap();
        assert_eq!(stored.topic, other_topic);
        assert_eq!(stored.lease_seconds, Some(60));
        assert!(stored.state.is_none());
    }

    #[tokio::test]
    async fn test_mark_unknown_callback_fails() {
        let repo = MemoryRepository::new();
        let orphan = Subscription::new(
            url("https://sub.example.com/cb"),
            url("https://example.com/feed"),
            Vec::new(),
            None,
        );
        let request = orphan.create_request(SubscriptionMode::Subscribe, None);
        assert!(repo
            .mark(&orphan, SubscriptionMark::PendingSubscription(request))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_subscriptions_filtered_by_topic() {
        let repo = MemoryRepository::new();
        let topic = url("https://example.com/feed");
        repo.store(&url("https://sub.example.com/b"), &topic, &[], None)
            .await
            .unwrap();
        repo.store(&url("https://sub.example.com/a"), &topic, &[], None)
            .await
            .unwrap();
        repo.store(&url("https://sub.example.com/c"), &url("https://example.com/x"), &[], None)
            .await
            .unwrap();

        let found = repo.subscriptions(&topic).await.unwrap();
        let callbacks: Vec<&str> = found.iter().map(|s| s.callback.as_str()).collect();
        assert_eq!(callbacks, vec!["https://sub.example.com/a", "https://sub.example.com/b"]);
    }
}

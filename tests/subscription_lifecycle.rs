//! End-to-end subscription lifecycle: discovery, announcement, hub
//! verification and content delivery.
//!
//! Topic pages and hubs are served by wiremock; subscriptions live in a
//! `MemoryRepository`.

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use tokio::sync::Mutex;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use websub_subscriber::protocol::{
    SubscriptionDenial, SubscriptionValidation, SubscriptionVerification,
};
use websub_subscriber::storage::MemoryRepository;
use websub_subscriber::util::EndpointPolicy;
use websub_subscriber::{
    Subscriber, SubscriberDelegate, SubscriberError, Subscription, SubscriptionRepository,
};

const CALLBACK: &str = "https://sub.example.com/callback/42";

#[derive(Default)]
struct Inbox {
    received: Mutex<Vec<Vec<u8>>>,
    verified: Mutex<Vec<String>>,
    denied: Mutex<Vec<Option<String>>>,
}

#[async_trait]
impl SubscriberDelegate for Inbox {
    async fn on_received(&self, _s: &Subscription, content: &[u8]) -> anyhow::Result<()> {
        self.received.lock().await.push(content.to_vec());
        Ok(())
    }

    async fn on_verified(
        &self,
        _s: &Subscription,
        verification: &SubscriptionVerification,
    ) -> anyhow::Result<()> {
        self.verified
            .lock()
            .await
            .push(verification.challenge.clone());
        Ok(())
    }

    async fn on_denied(&self, _s: &Subscription, denial: &SubscriptionDenial) -> anyhow::Result<()> {
        self.denied.lock().await.push(denial.reason.clone());
        Ok(())
    }
}

fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
}

/// Serves a topic page advertising `hub_path` on the same server, plus the hub itself.
async fn topic_and_hub(hub_status: u16) -> (MockServer, Url, Url) {
    let server = MockServer::start().await;
    let hub = url(&format!("{}/hub", server.uri()));

    Mock::given(method("GET"))
        .and(path("/feed"))
        .respond_with(ResponseTemplate::new(200).insert_header(
            "Link",
            format!(r#"<https://example.com/feed>; rel="self", <{hub}>; rel="hub""#).as_str(),
        ))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/hub"))
        .respond_with(ResponseTemplate::new(hub_status))
        .mount(&server)
        .await;

    let topic = url(&format!("{}/feed", server.uri()));
    (server, topic, hub)
}

fn subscriber() -> Subscriber<MemoryRepository, Inbox> {
    Subscriber::new(reqwest::Client::new(), MemoryRepository::new(), Inbox::default())
        .with_endpoint_policy(EndpointPolicy::permissive())
}

async fn hub_bodies(server: &MockServer) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.method.as_str() == "POST")
        .map(|r| String::from_utf8(r.body).unwrap())
        .collect()
}

#[tokio::test]
async fn test_subscribe_discovers_stores_and_announces() {
    let (server, topic, hub) = topic_and_hub(202).await;
    let s = subscriber();

    let report = s.subscribe(&topic, &url(CALLBACK), None, None).await.unwrap();
    assert_eq!(report.accepted().collect::<Vec<_>>(), vec![&hub]);

    let stored = s
        .repository()
        .subscription(&url(CALLBACK))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.topic.as_str(), "https://example.com/feed");
    assert_eq!(stored.hubs, vec![hub]);
    assert!(stored.is_pending_subscription());

    assert_eq!(
        hub_bodies(&server).await,
        vec![format!(
            "hub.callback={CALLBACK}&hub.topic=https://example.com/feed&hub.mode=subscribe"
        )]
    );
}

#[tokio::test]
async fn test_full_lifecycle_from_query_string_verification() {
    let (server, topic, _hub) = topic_and_hub(202).await;
    let s = subscriber();
    s.subscribe(&topic, &url(CALLBACK), Some(3600), None)
        .await
        .unwrap();

    // Hub challenge as it would arrive on the callback's query string
    let challenge = SubscriptionValidation::from_form(
        "hub.mode=subscribe&hub.topic=https%3A%2F%2Fexample.com%2Ffeed&hub.challenge=kx81&hub.lease_seconds=7200",
    )
    .unwrap();
    s.verify(&challenge, &url(CALLBACK)).await.unwrap();

    let active = s
        .repository()
        .subscription(&url(CALLBACK))
        .await
        .unwrap()
        .unwrap();
    assert!(active.is_active());
    assert_eq!(active.lease_seconds, Some(7200));

    s.receive(b"<feed>update</feed>", &url(CALLBACK)).await.unwrap();

    let report = s.unsubscribe(&url(CALLBACK)).await.unwrap();
    assert_eq!(report.outcomes.len(), 1);

    let goodbye = SubscriptionValidation::from_form(
        "hub.mode=unsubscribe&hub.topic=https://example.com/feed&hub.challenge=zz9",
    )
    .unwrap();
    s.verify(&goodbye, &url(CALLBACK)).await.unwrap();

    let late = s.receive(b"<feed>late</feed>", &url(CALLBACK)).await;
    assert!(matches!(late, Err(SubscriberError::InactiveSubscription(_))));

    let bodies = hub_bodies(&server).await;
    assert_eq!(bodies.len(), 2);
    assert!(bodies[0].ends_with("&hub.mode=subscribe&hub.lease_seconds=3600"));
    assert!(bodies[1].ends_with("&hub.mode=unsubscribe"));
}

#[tokio::test]
async fn test_hub_rejection_still_leaves_subscription_pending() {
    let (_server, topic, hub) = topic_and_hub(500).await;
    let s = subscriber();

    let report = s.subscribe(&topic, &url(CALLBACK), None, None).await.unwrap();
    assert!(report.all_failed());
    assert_eq!(report.failed().map(|(h, _)| h).collect::<Vec<_>>(), vec![&hub]);

    let stored = s
        .repository()
        .subscription(&url(CALLBACK))
        .await
        .unwrap()
        .unwrap();
    assert!(stored.is_pending_subscription());
}

#[tokio::test]
async fn test_json_denial_after_subscribe() {
    let (_server, topic, _hub) = topic_and_hub(202).await;
    let s = subscriber();
    s.subscribe(&topic, &url(CALLBACK), None, None).await.unwrap();

    let denial = SubscriptionValidation::from_json(
        br#"{"hub.mode":"denied","hub.topic":"https://example.com/feed","hub.reason":"over quota"}"#,
    )
    .unwrap();
    s.verify(&denial, &url(CALLBACK)).await.unwrap();

    let stored = s
        .repository()
        .subscription(&url(CALLBACK))
        .await
        .unwrap()
        .unwrap();
    assert!(!stored.is_active());
    assert!(!stored.is_pending_subscription());
}

#[tokio::test]
async fn test_verification_for_other_topic_is_rejected() {
    let (_server, topic, _hub) = topic_and_hub(202).await;
    let s = subscriber();
    s.subscribe(&topic, &url(CALLBACK), None, None).await.unwrap();

    // The stored topic is the discovered canonical one, not the fetched URL
    let verification = SubscriptionValidation::from_form(&format!(
        "hub.mode=subscribe&hub.topic={}&hub.challenge=c",
        topic
    ))
    .unwrap();
    let result = s.verify(&verification, &url(CALLBACK)).await;
    assert!(matches!(result, Err(SubscriberError::VerificationNotRequested(_))));
}

#[tokio::test]
async fn test_resubscribe_replaces_previous_record() {
    let (_server, topic, hub) = topic_and_hub(202).await;
    let s = subscriber();
    s.subscribe(&topic, &url(CALLBACK), None, None).await.unwrap();
    s.verify(
        &SubscriptionValidation::from_form(
            "hub.mode=subscribe&hub.topic=https://example.com/feed&hub.challenge=c",
        )
        .unwrap(),
        &url(CALLBACK),
    )
    .await
    .unwrap();

    let other_topic = url("https://example.com/other");
    s.subscribe(&other_topic, &url(CALLBACK), None, Some(&hub))
        .await
        .unwrap();

    let stored = s
        .repository()
        .subscription(&url(CALLBACK))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.topic, other_topic);
    assert!(stored.is_pending_subscription());
    assert!(s
        .subscriptions(&url("https://example.com/feed"))
        .await
        .unwrap()
        .is_empty());
}

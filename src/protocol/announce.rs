use futures::stream::{self, StreamExt};
use thiserror::Error;
use url::Url;

use super::request::{SubscriptionRequest, FORM_CONTENT_TYPE};

/// Why a single hub announcement failed.
#[derive(Debug, Error)]
pub enum AnnounceError {
    #[error("hub request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("hub responded with HTTP {0}")]
    HttpStatus(u16),
}

/// Result of announcing to one hub: the response status, or why it failed.
#[derive(Debug)]
pub struct HubOutcome {
    pub hub: Url,
    pub result: Result<u16, AnnounceError>,
}

/// Per-hub outcomes of one fan-out, in completion order.
///
/// Announcements are best-effort: a failing hub never affects the others,
/// and any hub that accepted the request may still verify the subscription.
#[derive(Debug, Default)]
pub struct AnnounceReport {
    pub outcomes: Vec<HubOutcome>,
}

impl AnnounceReport {
    /// Hubs that answered with a 2xx status.
    pub fn accepted(&self) -> impl Iterator<Item = &Url> {
        self.outcomes
            .iter()
            .filter(|o| o.result.is_ok())
            .map(|o| &o.hub)
    }

    /// Hubs that could not be reached or rejected the request.
    pub fn failed(&self) -> impl Iterator<Item = (&Url, &AnnounceError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (&o.hub, e)))
    }

    /// True when at least one hub was contacted and none accepted.
    pub fn all_failed(&self) -> bool {
        !self.outcomes.is_empty() && self.outcomes.iter().all(|o| o.result.is_err())
    }
}

/// POSTs `request` to every hub concurrently and waits for all of them.
///
/// The body is encoded once and sent unchanged to each hub. Failures are
/// logged and collected in the report; they never abort the other hubs.
pub async fn announce(
    client: &reqwest::Client,
    request: &SubscriptionRequest,
    hubs: &[Url],
) -> AnnounceReport {
    let body = request.url_encoded();
    let mode = request.mode;

    let outcomes: Vec<HubOutcome> = stream::iter(hubs.iter().cloned())
        .map(|hub| {
            let client = client.clone();
            let body = body.clone();

            async move {
                let result = post_to_hub(&client, &hub, body).await;
                match &result {
                    Ok(status) => {
                        tracing::debug!(hub = %hub, mode = %mode, status = status, "Hub accepted request")
                    }
                    Err(e) => {
                        tracing::warn!(hub = %hub, mode = %mode, error = %e, "Hub announcement failed")
                    }
                }
                HubOutcome { hub, result }
            }
        })
        .buffer_unordered(hubs.len().max(1))
        .collect()
        .await;

    AnnounceReport { outcomes }
}

async fn post_to_hub(
    client: &reqwest::Client,
    hub: &Url,
    body: String,
) -> Result<u16, AnnounceError> {
    let response = client
        .post(hub.clone())
        .header(reqwest::header::CONTENT_TYPE, FORM_CONTENT_TYPE)
        .body(body)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        return Err(AnnounceError::HttpStatus(status.as_u16()));
    }
    Ok(status.as_u16())
}

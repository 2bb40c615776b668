//! Topic and hub discovery.
//!
//! A single GET is issued against the topic URL. The response is then run
//! through an ordered chain of independent strategies:
//!
//! 1. the `Link` response header
//! 2. `<link>` tags in an HTML head
//! 3. plain `<link>` elements in XML (RSS, Atom with default namespace)
//! 4. `<atom:link>` elements in XML
//!
//! The first strategy yielding both a topic and at least one hub wins.
//!
//! # Example
//!
//! ```ignore
//! use websub_subscriber::discovery::discover;
//!
//! let found = discover(&client, &topic, 5 * 1024 * 1024).await?;
//! println!("{} via {:?}", found.topic(), found.hubs());
//! ```

mod link;
mod markup;
mod strategy;

pub use link::{parse_link_header, Link, LinkRelation};
pub use markup::{html_links, xml_links, XmlLinkElement};
pub use strategy::DiscoveryStrategy;

use futures::StreamExt;
use thiserror::Error;
use url::Url;

/// Default cap on the discovery response body.
pub const DEFAULT_MAX_DISCOVERY_BYTES: usize = 5 * 1024 * 1024; // 5MB

/// A canonical topic URL together with the hubs that serve it.
///
/// The hub list is never empty and never contains duplicates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryResult {
    topic: Url,
    hubs: Vec<Url>,
}

impl DiscoveryResult {
    /// Returns `None` when `hubs` is empty.
    pub fn new(topic: Url, hubs: Vec<Url>) -> Option<Self> {
        if hubs.is_empty() {
            return None;
        }
        Some(Self { topic, hubs })
    }

    pub fn topic(&self) -> &Url {
        &self.topic
    }

    pub fn hubs(&self) -> &[Url] {
        &self.hubs
    }

    pub fn into_parts(self) -> (Url, Vec<Url>) {
        (self.topic, self.hubs)
    }
}

/// Errors that can occur during discovery.
///
/// Each strategy failure has its own variant so callers can log exactly where
/// discovery gave up.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The GET against the topic URL produced no HTTP response
    #[error("failed to perform discovery request: {0}")]
    Request(#[from] reqwest::Error),
    /// Response body exceeded the configured size limit
    #[error("discovery response too large (limit {0} bytes)")]
    TooLarge(usize),
    #[error("response contains no Link header")]
    NoLinkHeader,
    /// Link data present, but no usable `rel="self"` link
    #[error("no topic link (rel=\"self\") found")]
    NoTopic,
    /// Link data present, but no usable `rel="hub"` link
    #[error("no hub link (rel=\"hub\") found")]
    NoHub,
    #[error("response body is not valid UTF-8")]
    UndecodableBody,
    #[error("failed to parse XML: {0}")]
    XmlParser(String),
    #[error("HTML contains no link elements")]
    NoLinkInHtml,
    #[error("XML contains no link elements")]
    NoLinkInXml,
    /// Every body strategy came up empty
    #[error("response body contains no link data")]
    NoLinkInBody,
}

impl DiscoveryError {
    /// True when links were found but the topic or hub set was unusable.
    pub fn is_incomplete(&self) -> bool {
        matches!(self, DiscoveryError::NoTopic | DiscoveryError::NoHub)
    }
}

/// A fetched topic response, as seen by the discovery strategies.
#[derive(Debug, Clone)]
pub struct FetchedResource {
    /// Final URL after redirects; base for relative link values
    pub url: Url,
    /// All `Link` header values joined with `,`
    pub link_header: Option<String>,
    pub body: Vec<u8>,
}

impl FetchedResource {
    /// The body as UTF-8 text.
    pub fn text(&self) -> Result<&str, DiscoveryError> {
        std::str::from_utf8(&self.body).map_err(|_| DiscoveryError::UndecodableBody)
    }
}

/// Resolves the canonical topic and hub set for `topic`.
///
/// # Arguments
///
/// * `client` - HTTP client (caller controls timeouts and redirects)
/// * `topic` - URL to discover from
/// * `max_bytes` - cap on the response body
///
/// # Errors
///
/// Returns [`DiscoveryError::Request`] if no HTTP response was obtained,
/// [`DiscoveryError::TooLarge`] if the body exceeds `max_bytes`, and otherwise
/// the error described by [`discover_from`].
pub async fn discover(
    client: &reqwest::Client,
    topic: &Url,
    max_bytes: usize,
) -> Result<DiscoveryResult, DiscoveryError> {
    let resource = fetch_resource(client, topic, max_bytes).await?;
    discover_from(&resource)
}

/// Runs the strategy chain against an already-fetched response.
///
/// Header discovery goes first. A body that is not UTF-8 then fails
/// immediately; otherwise the body strategies are tried in order. When all of
/// them fail, the error is the last "incomplete" one (links found, topic or
/// hub missing) if any strategy got that far, else
/// [`DiscoveryError::NoLinkInBody`].
pub fn discover_from(resource: &FetchedResource) -> Result<DiscoveryResult, DiscoveryError> {
    let mut incomplete = None;

    match DiscoveryStrategy::LinkHeader.attempt(resource) {
        Ok(result) => return Ok(found(DiscoveryStrategy::LinkHeader, resource, result)),
        Err(e) => {
            tracing::debug!(url = %resource.url, strategy = "link-header", error = %e, "Discovery strategy failed");
            if e.is_incomplete() {
                incomplete = Some(e);
            }
        }
    }

    resource.text()?;

    for strategy in DiscoveryStrategy::BODY_FALLBACKS {
        match strategy.attempt(resource) {
            Ok(result) => return Ok(found(strategy, resource, result)),
            Err(e) => {
                tracing::debug!(url = %resource.url, strategy = strategy.name(), error = %e, "Discovery strategy failed");
                if e.is_incomplete() {
                    incomplete = Some(e);
                }
            }
        }
    }

    Err(incomplete.unwrap_or(DiscoveryError::NoLinkInBody))
}

fn found(
    strategy: DiscoveryStrategy,
    resource: &FetchedResource,
    result: DiscoveryResult,
) -> DiscoveryResult {
    tracing::info!(
        url = %resource.url,
        strategy = strategy.name(),
        topic = %result.topic(),
        hubs = result.hubs().len(),
        "Discovered hubs"
    );
    result
}

/// Issues the discovery GET and reads the body with a size limit.
///
/// Any HTTP status is accepted: error pages may still carry link data.
async fn fetch_resource(
    client: &reqwest::Client,
    topic: &Url,
    max_bytes: usize,
) -> Result<FetchedResource, DiscoveryError> {
    let response = client.get(topic.clone()).send().await?;

    if !response.status().is_success() {
        tracing::debug!(url = %topic, status = %response.status(), "Discovery request returned non-success status");
    }

    let url = response.url().clone();
    let link_header = {
        let values: Vec<&str> = response
            .headers()
            .get_all(reqwest::header::LINK)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect();
        (!values.is_empty()).then(|| values.join(","))
    };

    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len > max_bytes as u64 {
            return Err(DiscoveryError::TooLarge(max_bytes));
        }
    }

    let mut body = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if body.len().saturating_add(chunk.len()) > max_bytes {
            return Err(DiscoveryError::TooLarge(max_bytes));
        }
        body.extend_from_slice(&chunk);
    }

    Ok(FetchedResource {
        url,
        link_header,
        body,
    })
}

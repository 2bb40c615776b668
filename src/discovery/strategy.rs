use url::Url;

use super::link::{parse_link_header, Link, LinkRelation};
use super::markup::{html_links, xml_links, XmlLinkElement};
use super::{DiscoveryError, DiscoveryResult, FetchedResource};

/// One way of finding topic and hub links on a fetched resource.
///
/// Strategies are independent: each one reads the same already-fetched
/// response and either produces a complete [`DiscoveryResult`] or a typed
/// failure. The engine tries them in a fixed order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryStrategy {
    /// HTTP `Link` response header.
    LinkHeader,
    /// `<link>` tags in an HTML document head.
    Html,
    /// Plain `<link>` elements in an XML document (RSS, default-namespace Atom).
    Rss,
    /// Namespaced `<atom:link>` elements in an XML document.
    Atom,
}

impl DiscoveryStrategy {
    /// Body strategies, in the order they are attempted after header discovery fails.
    pub const BODY_FALLBACKS: [DiscoveryStrategy; 3] = [Self::Html, Self::Rss, Self::Atom];

    pub fn name(self) -> &'static str {
        match self {
            Self::LinkHeader => "link-header",
            Self::Html => "html",
            Self::Rss => "rss",
            Self::Atom => "atom",
        }
    }

    /// Attempts discovery against a fetched resource.
    ///
    /// # Errors
    ///
    /// - [`DiscoveryError::NoLinkHeader`] - no `Link` header (header strategy)
    /// - [`DiscoveryError::UndecodableBody`] - body is not UTF-8 (body strategies)
    /// - [`DiscoveryError::XmlParser`] - body is not well-formed XML (RSS/Atom)
    /// - [`DiscoveryError::NoLinkInHtml`] / [`DiscoveryError::NoLinkInXml`] - no usable link elements
    /// - [`DiscoveryError::NoTopic`] / [`DiscoveryError::NoHub`] - link data present but incomplete
    pub fn attempt(self, resource: &FetchedResource) -> Result<DiscoveryResult, DiscoveryError> {
        let links = match self {
            Self::LinkHeader => {
                let header = resource
                    .link_header
                    .as_deref()
                    .ok_or(DiscoveryError::NoLinkHeader)?;
                parse_link_header(header)
            }
            Self::Html => {
                let links = html_links(resource.text()?);
                if links.is_empty() {
                    return Err(DiscoveryError::NoLinkInHtml);
                }
                links
            }
            Self::Rss | Self::Atom => {
                let element = if self == Self::Rss {
                    XmlLinkElement::Plain
                } else {
                    XmlLinkElement::Atom
                };
                let links = xml_links(resource.text()?, element)
                    .map_err(|e| DiscoveryError::XmlParser(e.to_string()))?;
                if links.is_empty() {
                    return Err(DiscoveryError::NoLinkInXml);
                }
                links
            }
        };

        select_candidates(&links, &resource.url)
    }
}

/// Picks the first `self` link as topic and every `hub` link as a hub.
///
/// Values are resolved against `base`, so relative hrefs are accepted. Any
/// hub value that fails to resolve rejects the whole hub set.
fn select_candidates(links: &[Link], base: &Url) -> Result<DiscoveryResult, DiscoveryError> {
    let topic = links
        .iter()
        .find(|link| link.relation == LinkRelation::SelfLink)
        .and_then(|link| resolve(&link.value, base))
        .ok_or(DiscoveryError::NoTopic)?;

    let mut hubs: Vec<Url> = Vec::new();
    for link in links.iter().filter(|l| l.relation == LinkRelation::Hub) {
        let hub = resolve(&link.value, base).ok_or(DiscoveryError::NoHub)?;
        if !hubs.contains(&hub) {
            hubs.push(hub);
        }
    }

    DiscoveryResult::new(topic, hubs).ok_or(DiscoveryError::NoHub)
}

fn resolve(value: &str, base: &Url) -> Option<Url> {
    if value.is_empty() {
        return None;
    }
    base.join(value).ok()
}

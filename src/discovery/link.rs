//! Link relation parsing shared by header and markup discovery.
//!
//! Relation matching is substring based, not an exact token match. A relation
//! containing both `self` and `hub` resolves to [`LinkRelation::SelfLink`].

/// Relation of a discovered link to the resource it was found on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkRelation {
    /// `rel="self"`: the canonical topic URL.
    SelfLink,
    /// `rel="hub"`: a hub accepting subscriptions for the topic.
    Hub,
    /// Anything else (`alternate`, `stylesheet`, ...).
    Other,
}

impl LinkRelation {
    /// Classifies a raw relation token. `self` is checked before `hub`.
    pub fn classify(rel: &str) -> Self {
        if rel.contains("self") {
            return Self::SelfLink;
        }
        if rel.contains("hub") {
            return Self::Hub;
        }
        Self::Other
    }
}

/// A `(value, relation)` pair produced while scanning a header or document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    /// URL text as found, with angle brackets and surrounding whitespace removed.
    pub value: String,
    pub relation: LinkRelation,
}

impl Link {
    /// Parses one comma-separated fragment of a `Link` header,
    /// e.g. `<https://hub.example.com/>; rel="hub"`.
    ///
    /// Returns `None` when the fragment has no parameter part to take a
    /// relation from.
    pub fn from_header_fragment(fragment: &str) -> Option<Self> {
        let mut segments = fragment.split(';');
        let value = segments.next()?;
        let params: Vec<&str> = segments.collect();
        let last = *params.last()?;

        // Prefer an explicit rel= parameter, otherwise fall back to the last segment
        let rel = params
            .iter()
            .find_map(|param| {
                let (key, value) = param.split_once('=')?;
                key.trim().eq_ignore_ascii_case("rel").then_some(value)
            })
            .unwrap_or(last);

        Some(Self {
            value: normalize_value(value),
            relation: LinkRelation::classify(rel),
        })
    }

    /// Builds a link from the `rel` and `href` attributes of a markup element.
    pub fn from_attributes(rel: Option<&str>, href: Option<&str>) -> Option<Self> {
        Some(Self {
            value: normalize_value(href?),
            relation: LinkRelation::classify(rel?),
        })
    }
}

fn normalize_value(raw: &str) -> String {
    let trimmed = raw.trim();
    trimmed
        .strip_prefix('<')
        .and_then(|v| v.strip_suffix('>'))
        .unwrap_or(trimmed)
        .trim()
        .to_owned()
}

/// Splits a (possibly multi-valued) `Link` header into parsed links,
/// skipping fragments that do not decompose.
pub fn parse_link_header(header: &str) -> Vec<Link> {
    header
        .split(',')
        .filter_map(Link::from_header_fragment)
        .collect()
}

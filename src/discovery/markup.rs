//! Extraction of `<link>` elements from HTML and XML documents.
//!
//! HTML is scanned with plain string matching (no HTML parser dependency),
//! since real-world pages are rarely well-formed XML. RSS and Atom documents go
//! through `quick-xml`.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::link::Link;

/// Which XML element carries link data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XmlLinkElement {
    /// Unprefixed `<link>` (RSS channels, default-namespace Atom).
    Plain,
    /// Namespaced `<atom:link>`, as embedded in RSS 2.0 feeds.
    Atom,
}

impl XmlLinkElement {
    fn qualified_name(self) -> &'static [u8] {
        match self {
            XmlLinkElement::Plain => b"link",
            XmlLinkElement::Atom => b"atom:link",
        }
    }
}

/// Collects every `<link>` tag in the document head that carries both `rel` and `href`.
///
/// When the document has no `</head>`, the whole text is scanned.
pub fn html_links(html: &str) -> Vec<Link> {
    // ASCII lowercasing keeps byte offsets aligned with the original text
    let html_lower = html.to_ascii_lowercase();
    let scope_end = html_lower.find("</head>").unwrap_or(html_lower.len());
    let mut links = Vec::new();
    let mut search_from = 0;

    while search_from < scope_end {
        let Some(found) = html_lower[search_from..scope_end].find("<link") else {
            break;
        };
        let tag_start = search_from + found;
        let name_end = tag_start + "<link".len();

        // Skip <linkfoo> and similar
        match html_lower.as_bytes().get(name_end) {
            Some(b) if b.is_ascii_whitespace() || *b == b'/' || *b == b'>' => {}
            _ => {
                search_from = name_end;
                continue;
            }
        }

        let Some(tag_len) = html_lower[tag_start..].find('>') else {
            break;
        };
        let tag = &html[tag_start..=tag_start + tag_len];

        let rel = extract_attr_value(tag, "rel");
        let href = extract_attr_value(tag, "href").map(unescape_entities);
        if let Some(link) = Link::from_attributes(rel, href.as_deref()) {
            links.push(link);
        }

        search_from = tag_start + tag_len + 1;
    }

    links
}

/// Extracts the value of an attribute from a tag string (case-preserving).
///
/// Accepts double-quoted, single-quoted and unquoted values. The attribute
/// name must be preceded by whitespace, so `data-href` never matches `href`.
fn extract_attr_value<'a>(tag: &'a str, attr_name: &str) -> Option<&'a str> {
    let tag_lower = tag.to_ascii_lowercase();
    let attr_prefix = format!("{attr_name}=");
    let mut search_from = 0;

    let value_start = loop {
        let pos = search_from + tag_lower[search_from..].find(&attr_prefix)?;
        let preceded_by_space = pos > 0 && tag.as_bytes()[pos - 1].is_ascii_whitespace();
        if preceded_by_space {
            break pos + attr_prefix.len();
        }
        search_from = pos + attr_prefix.len();
    };

    let rest = &tag[value_start..];
    match *rest.as_bytes().first()? {
        quote @ (b'"' | b'\'') => {
            let inner = &rest[1..];
            let end = inner.find(quote as char)?;
            Some(&inner[..end])
        }
        _ => {
            let end = rest
                .find(|c: char| c.is_ascii_whitespace() || c == '>')
                .unwrap_or(rest.len());
            (end > 0).then(|| &rest[..end])
        }
    }
}

fn unescape_entities(value: &str) -> String {
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Collects every `element` in an XML document that carries both `rel` and `href`.
///
/// # Errors
///
/// Returns the underlying `quick-xml` error when the document is not
/// well-formed XML.
pub fn xml_links(xml: &str, element: XmlLinkElement) -> Result<Vec<Link>, quick_xml::Error> {
    // SEC-002: quick-xml (0.37) never expands <!ENTITY> declarations, so
    // decode_and_unescape_value() only resolves the five XML builtins.
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let name = element.qualified_name();
    let mut links = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) if e.name().as_ref() == name => {
                if let Some(link) = link_from_element(&e, &reader) {
                    links.push(link);
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(links)
}

fn link_from_element(e: &BytesStart<'_>, reader: &Reader<&[u8]>) -> Option<Link> {
    let mut rel = None;
    let mut href = None;

    for attr_result in e.attributes() {
        let attr = match attr_result {
            Ok(attr) => attr,
            Err(e) => {
                tracing::debug!(error = %e, "Skipping malformed link attribute");
                continue;
            }
        };
        let slot = match attr.key.as_ref() {
            b"rel" => &mut rel,
            b"href" => &mut href,
            _ => continue,
        };
        match attr.decode_and_unescape_value(reader.decoder()) {
            Ok(value) => *slot = Some(value.into_owned()),
            Err(e) => tracing::debug!(error = %e, "Skipping undecodable link attribute"),
        }
    }

    Link::from_attributes(rel.as_deref(), href.as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::link::LinkRelation;
    use pretty_assertions::assert_eq;

    fn values(links: &[Link], relation: LinkRelation) -> Vec<&str> {
        links
            .iter()
            .filter(|l| l.relation == relation)
            .map(|l| l.value.as_str())
            .collect()
    }

    // --- HTML scanning ---

    #[test]
    fn test_html_links_in_head() {
        let html = r#"<html><head>
            <link rel="self" href="https://example.com/feed">
            <link rel="hub" href="https://hub.example.com/">
            <link rel="stylesheet" href="/style.css">
        </head><body></body></html>"#;
        let links = html_links(html);
        assert_eq!(links.len(), 3);
        assert_eq!(values(&links, LinkRelation::SelfLink), vec!["https://example.com/feed"]);
        assert_eq!(values(&links, LinkRelation::Hub), vec!["https://hub.example.com/"]);
    }

    #[test]
    fn test_html_links_reversed_attrs_and_single_quotes() {
        let html = "<head><LINK href='https://hub.example.com/' REL='hub'/></head>";
        let links = html_links(html);
        assert_eq!(values(&links, LinkRelation::Hub), vec!["https://hub.example.com/"]);
    }

    #[test]
    fn test_html_links_unquoted_values() {
        let html = "<head><link rel=hub href=https://hub.example.com/hub></head>";
        let links = html_links(html);
        assert_eq!(values(&links, LinkRelation::Hub), vec!["https://hub.example.com/hub"]);
    }

    #[test]
    fn test_html_links_ignore_body() {
        let html = r#"<html><head><title>x</title></head>
            <body><link rel="hub" href="https://hub.example.com/"></body></html>"#;
        assert!(html_links(html).is_empty());
    }

    #[test]
    fn test_html_links_skip_similar_tag_names() {
        let html = r#"<head><linkset rel="hub" href="https://a.example/"></linkset></head>"#;
        assert!(html_links(html).is_empty());
    }

    #[test]
    fn test_html_links_data_attribute_does_not_shadow_href() {
        let html = r#"<head><link data-href="https://wrong.example/" rel="hub" href="https://hub.example.com/"></head>"#;
        let links = html_links(html);
        assert_eq!(values(&links, LinkRelation::Hub), vec!["https://hub.example.com/"]);
    }

    #[test]
    fn test_html_links_unescape_href() {
        let html = r#"<head><link rel="hub" href="https://hub.example.com/?a=1&amp;b=2"></head>"#;
        let links = html_links(html);
        assert_eq!(values(&links, LinkRelation::Hub), vec!["https://hub.example.com/?a=1&b=2"]);
    }

    #[test]
    fn test_html_links_non_ascii_text_keeps_offsets() {
        let html = r#"<head><title>İstanbul ünïcödé</title><link rel="hub" href="https://hub.example.com/"></head>"#;
        let links = html_links(html);
        assert_eq!(values(&links, LinkRelation::Hub), vec!["https://hub.example.com/"]);
    }

    #[test]
    fn test_html_links_unterminated_tag() {
        assert!(html_links("<head><link rel=\"hub\" href=\"x\"").is_empty());
    }

    // --- XML scanning ---

    const RSS_WITH_ATOM_LINKS: &str = r#"<?xml version="1.0"?>
<rss version="2.0" xmlns:atom="http://www.w3.org/2005/Atom">
  <channel>
    <title>Example</title>
    <link>https://example.com</link>
    <atom:link rel="self" href="https://example.com/rss.xml" type="application/rss+xml"/>
    <atom:link rel="hub" href="https://hub.example.com/"/>
  </channel>
</rss>"#;

    #[test]
    fn test_xml_atom_links() {
        let links = xml_links(RSS_WITH_ATOM_LINKS, XmlLinkElement::Atom).unwrap();
        assert_eq!(values(&links, LinkRelation::SelfLink), vec!["https://example.com/rss.xml"]);
        assert_eq!(values(&links, LinkRelation::Hub), vec!["https://hub.example.com/"]);
    }

    #[test]
    fn test_xml_plain_links_without_rel_are_skipped() {
        let links = xml_links(RSS_WITH_ATOM_LINKS, XmlLinkElement::Plain).unwrap();
        assert!(links.is_empty());
    }

    #[test]
    fn test_xml_plain_links_in_atom_feed() {
        let atom = r#"<?xml version="1.0"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <link href="https://example.com/atom.xml" rel="self"/>
  <link href="https://hub.example.com/a" rel="hub"/>
  <link href="https://hub.example.com/b" rel="hub"/>
</feed>"#;
        let links = xml_links(atom, XmlLinkElement::Plain).unwrap();
        assert_eq!(
            values(&links, LinkRelation::Hub),
            vec!["https://hub.example.com/a", "https://hub.example.com/b"]
        );
    }

    #[test]
    fn test_xml_unescapes_attribute_values() {
        let xml = r#"<feed><link rel="hub" href="https://hub.example.com/?a=1&amp;b=2"/></feed>"#;
        let links = xml_links(xml, XmlLinkElement::Plain).unwrap();
        assert_eq!(values(&links, LinkRelation::Hub), vec!["https://hub.example.com/?a=1&b=2"]);
    }

    #[test]
    fn test_xml_malformed_document_errors() {
        let result = xml_links("<feed><link rel=\"hub\" href=\"x\"/></channel>", XmlLinkElement::Plain);
        assert!(result.is_err());
    }

    // SEC-002: custom entities are never expanded
    #[test]
    fn test_xml_custom_entity_not_expanded() {
        let xml = r#"<?xml version="1.0"?>
<!DOCTYPE feed [<!ENTITY xxe SYSTEM "file:///etc/passwd">]>
<feed><link rel="hub" href="&xxe;"/></feed>"#;
        let links = xml_links(xml, XmlLinkElement::Plain).unwrap();
        assert!(links.is_empty());
    }
}

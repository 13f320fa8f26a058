//! URL sanitization and link harvesting with selector fallback chains.
//!
//! Discovery of categories, products and internal documents all reduce to
//! the same step: run a fallback chain of link selectors against one page,
//! sanitize each `href` against the catalog origin, and deduplicate by url.
//! The navigation side lives in [`crate::pipeline`]; this module only sees
//! HTML.

use std::collections::HashSet;

use crate::dom::{collapse_whitespace, DomDocument, DomNode, HtmlDocument};
use crate::models::CrawlTarget;

/// Normalize a discovered href against the catalog origin.
///
/// Returns `None` for anything that is not an http(s) link after repair
/// (`javascript:`, `mailto:`, fragments, relative paths).
pub fn sanitize(url: &str, base: &str) -> Option<String> {
    let base = base.trim_end_matches('/');
    let mut url = url.trim().to_string();
    if url.is_empty() {
        return None;
    }

    if url.starts_with("//") {
        url = format!("https:{url}");
    }

    // Naive concatenation upstream can yield "https://x.comhttps://x.com/foo".
    if !base.is_empty() && url.starts_with(base) && url.matches(base).count() > 1 {
        if let Some(last) = url.rfind(base) {
            url = url[last..].to_string();
        }
    }

    if url.starts_with('/') {
        return Some(format!("{base}{url}"));
    }
    if url.starts_with("http") {
        return Some(url);
    }
    None
}

/// Targets found by the first selector in `chain` that yields any usable link.
///
/// An exhausted chain yields an empty list; the caller decides whether that
/// is an error.
pub fn harvest_links<D: DomDocument>(doc: &D, chain: &[String], base: &str) -> Vec<CrawlTarget> {
    for selector in chain {
        let targets = dedup_by_url(
            doc.select_all(selector)
                .iter()
                .filter_map(|node| link_target(node, base)),
        );
        if !targets.is_empty() {
            tracing::debug!(selector = %selector, count = targets.len(), "Link selector matched");
            return targets;
        }
        tracing::debug!(selector = %selector, "Link selector matched nothing, falling back");
    }
    Vec::new()
}

pub fn harvest_links_html(html: &str, chain: &[String], base: &str) -> Vec<CrawlTarget> {
    harvest_links(&HtmlDocument::parse(html), chain, base)
}

/// First non-empty text from a fallback chain of content selectors.
pub fn harvest_text<D: DomDocument>(doc: &D, chain: &[String]) -> Option<String> {
    chain.iter().find_map(|selector| {
        let text = doc
            .select_all(selector)
            .iter()
            .map(|node| node.text())
            .collect::<Vec<_>>()
            .join(" ");
        let text = collapse_whitespace(&text);
        (!text.is_empty()).then_some(text)
    })
}

pub fn harvest_text_html(html: &str, chain: &[String]) -> Option<String> {
    harvest_text(&HtmlDocument::parse(html), chain)
}

fn link_target<N: DomNode>(node: &N, base: &str) -> Option<CrawlTarget> {
    let href = node.attr("href")?;
    let url = sanitize(&href, base)?;
    let name = [
        Some(node.text()),
        node.attr("aria-label"),
        node.attr("title"),
    ]
    .into_iter()
    .flatten()
    .map(|s| collapse_whitespace(&s))
    .find(|s| !s.is_empty())
    .unwrap_or_else(|| url.clone());
    Some(CrawlTarget::new(url, name))
}

/// Keep the first occurrence of each url, preserving order.
pub fn dedup_by_url(targets: impl IntoIterator<Item = CrawlTarget>) -> Vec<CrawlTarget> {
    let mut seen = HashSet::new();
    targets
        .into_iter()
        .filter(|t| seen.insert(t.url.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://x.com";

    #[test]
    fn test_sanitize_rules() {
        assert_eq!(sanitize("/foo", BASE).as_deref(), Some("https://x.com/foo"));
        assert_eq!(
            sanitize("https://x.comhttps://x.com/foo", BASE).as_deref(),
            Some("https://x.com/foo")
        );
        assert_eq!(sanitize("javascript:void(0)", BASE), None);
        assert_eq!(
            sanitize("//cdn.x.com/a.pdf", BASE).as_deref(),
            Some("https://cdn.x.com/a.pdf")
        );
        assert_eq!(
            sanitize("https://other.org/p", BASE).as_deref(),
            Some("https://other.org/p")
        );
        assert_eq!(sanitize("foo/bar", BASE), None);
        assert_eq!(sanitize("#top", BASE), None);
        assert_eq!(sanitize("  ", BASE), None);
    }

    #[test]
    fn test_sanitize_trailing_slash_base() {
        assert_eq!(
            sanitize("/foo", "https://x.com/").as_deref(),
            Some("https://x.com/foo")
        );
        assert_eq!(
            sanitize("https://x.comhttps://x.comhttps://x.com/a", "https://x.com/").as_deref(),
            Some("https://x.com/a")
        );
    }

    #[test]
    fn test_first_matching_selector_wins() {
        let html = r#"
            <nav class="primary"></nav>
            <ul class="cats">
              <li><a href="/routers"> Routers </a></li>
              <li><a href="/switches">Switches</a></li>
              <li><a href="/routers">Routers again</a></li>
              <li><a href="mailto:sales@x.com">Mail</a></li>
            </ul>
            <div class="footer"><a href="/about">About</a></div>
        "#;
        let chain = vec![
            ".primary a".to_string(),
            ".cats a".to_string(),
            ".footer a".to_string(),
        ];
        let targets = harvest_links_html(html, &chain, BASE);
        assert_eq!(
            targets,
            vec![
                CrawlTarget::new("https://x.com/routers", "Routers"),
                CrawlTarget::new("https://x.com/switches", "Switches"),
            ]
        );
    }

    #[test]
    fn test_chain_skips_selectors_with_only_invalid_links() {
        let html = r##"
            <div class="a"><a href="#">Top</a></div>
            <div class="b"><a href="/ok" title="Fallback"></a></div>
        "##;
        let chain = vec![".a a".to_string(), ".b a".to_string()];
        let targets = harvest_links_html(html, &chain, BASE);
        assert_eq!(targets, vec![CrawlTarget::new("https://x.com/ok", "Fallback")]);
    }

    #[test]
    fn test_exhausted_chain_is_empty() {
        let chain = vec![".none a".to_string()];
        assert!(harvest_links_html("<p>nothing</p>", &chain, BASE).is_empty());
        assert!(harvest_links_html("<p>nothing</p>", &[], BASE).is_empty());
    }

    #[test]
    fn test_harvest_text_falls_back() {
        let html = "<body><article>  Manual \n text </article></body>";
        let chain = vec!["main".to_string(), "article".to_string(), "body".to_string()];
        assert_eq!(harvest_text_html(html, &chain).as_deref(), Some("Manual text"));
        assert_eq!(harvest_text_html(html, &["main".to_string()]), None);
    }
}

//! Page extraction engine.
//!
//! Applies a [`Schema`] to a [`DomDocument`] and produces an
//! [`ExtractedRecord`]. Extraction never fails: a selector that matches
//! nothing yields an empty value for that field and the rest of the record
//! is still filled in.
//!
//! # Rules
//!
//! | Spec | Result |
//! |------|--------|
//! | `Scalar`, one match | trimmed text |
//! | `Scalar`, several matches | texts joined with spaces, whitespace collapsed |
//! | `Scalar`, no match | `""` on the primary tier, `null` on retry tiers |
//! | `Scalar` named `resources`/`listing` | resolved `href` values |
//! | `Collection` | one nested record per container |
//! | `ExpandablePanel`, primary | `{title, content}` per trigger via `aria-controls` |
//! | `ExpandablePanel`, retry | the modal container read with the nested fields |
//! | `Slide` | one nested record per slide; `description` keeps list items |
//!
//! After extraction the canonical string fields (`preTitle`, `title`,
//! `subtitle`, `description`) are reduced to single strings.

use crate::dom::{collapse_whitespace, DomDocument, DomNode, HtmlDocument};
use crate::models::{CrawlTarget, ExtractedRecord, FieldValue, Fields};
use crate::schema::{FieldSpec, Schema, CANONICAL_STRING_FIELDS, CONTENT, DESCRIPTION, TITLE, URL_FIELDS};
use url::Url;

/// Which extraction path a tier uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractMode {
    /// Tier 0.
    Primary,
    /// Any tier after the first.
    Retry,
}

impl ExtractMode {
    pub fn for_tier(tier: usize) -> Self {
        if tier == 0 {
            ExtractMode::Primary
        } else {
            ExtractMode::Retry
        }
    }

    /// The value a scalar field takes when nothing matched.
    fn empty_scalar(self) -> FieldValue {
        match self {
            ExtractMode::Primary => FieldValue::Text(String::new()),
            ExtractMode::Retry => FieldValue::Null,
        }
    }
}

/// Where a field sits, which changes how `description` is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Parent {
    Page,
    Collection,
    Slide,
}

/// Schema-driven extractor bound to one catalog origin.
#[derive(Debug, Clone)]
pub struct Extractor {
    origin: Url,
}

impl Extractor {
    pub fn new(origin: Url) -> Self {
        Self { origin }
    }

    /// Parse an HTML snapshot and extract from it.
    pub fn extract_html(
        &self,
        html: &str,
        schema: &Schema,
        tier: usize,
        target: &CrawlTarget,
    ) -> ExtractedRecord {
        let doc = HtmlDocument::parse(html);
        self.extract(&doc, schema, tier, target)
    }

    pub fn extract<D: DomDocument>(
        &self,
        doc: &D,
        schema: &Schema,
        tier: usize,
        target: &CrawlTarget,
    ) -> ExtractedRecord {
        let mode = ExtractMode::for_tier(tier);
        let root = doc.root();
        let mut record = ExtractedRecord::new(target);
        record.fields = self.apply(doc, &root, schema, mode, Parent::Page);
        canonicalize(&mut record.fields);
        record
    }

    fn apply<'d, D: DomDocument>(
        &self,
        doc: &'d D,
        scope: &D::Node<'d>,
        schema: &Schema,
        mode: ExtractMode,
        parent: Parent,
    ) -> Fields {
        schema
            .iter()
            .map(|(name, spec)| {
                let value = self.field(doc, scope, name, spec, mode, parent);
                (name.to_string(), value)
            })
            .collect()
    }

    fn field<'d, D: DomDocument>(
        &self,
        doc: &'d D,
        scope: &D::Node<'d>,
        name: &str,
        spec: &FieldSpec,
        mode: ExtractMode,
        parent: Parent,
    ) -> FieldValue {
        match spec {
            FieldSpec::Scalar { selector } => {
                if URL_FIELDS.contains(&name) {
                    return self.hrefs(scope, selector, mode);
                }
                if name == DESCRIPTION {
                    match parent {
                        Parent::Collection => {
                            let items = list_items(scope, selector);
                            if !items.is_empty() {
                                return FieldValue::List(items);
                            }
                        }
                        Parent::Slide => return slide_description(scope, selector),
                        Parent::Page => {}
                    }
                }
                scalar(scope, selector, mode)
            }
            FieldSpec::Collection { container, fields } => FieldValue::Records(
                scope
                    .select_all(container)
                    .iter()
                    .map(|node| self.apply(doc, node, fields, mode, Parent::Collection))
                    .collect(),
            ),
            FieldSpec::ExpandablePanel {
                trigger,
                container,
                fields,
            } => match mode {
                ExtractMode::Primary => panels_from_triggers(doc, scope, trigger),
                ExtractMode::Retry => match scope.select_all(container).first() {
                    Some(modal) => FieldValue::Records(vec![self.apply(
                        doc,
                        modal,
                        fields,
                        mode,
                        Parent::Page,
                    )]),
                    None => {
                        tracing::debug!(field = name, container = %container, "Panel container not found");
                        FieldValue::Records(Vec::new())
                    }
                },
            },
            FieldSpec::Slide {
                container,
                slide,
                fields,
            } => {
                let slides = scope
                    .select_all(container)
                    .first()
                    .map(|c| c.select_all(slide))
                    .unwrap_or_default();
                FieldValue::Records(
                    slides
                        .iter()
                        .map(|node| self.apply(doc, node, fields, mode, Parent::Slide))
                        .collect(),
                )
            }
        }
    }

    fn hrefs<N: DomNode>(&self, scope: &N, selector: &str, mode: ExtractMode) -> FieldValue {
        let urls: Vec<String> = scope
            .select_all(selector)
            .iter()
            .filter_map(|node| node.attr("href"))
            .filter_map(|href| self.resolve_href(&href))
            .collect();
        if urls.is_empty() {
            mode.empty_scalar()
        } else {
            FieldValue::List(urls)
        }
    }

    /// Resolve an href against the origin. Only http(s) results are kept.
    pub fn resolve_href(&self, href: &str) -> Option<String> {
        let href = href.trim();
        if href.is_empty() {
            return None;
        }
        let url = self.origin.join(href).ok()?;
        matches!(url.scheme(), "http" | "https").then(|| url.into())
    }
}

fn scalar<N: DomNode>(scope: &N, selector: &str, mode: ExtractMode) -> FieldValue {
    let matches = scope.select_all(selector);
    match matches.len() {
        0 => {
            tracing::debug!(selector, "Selector matched nothing");
            mode.empty_scalar()
        }
        1 => FieldValue::Text(matches[0].text().trim().to_string()),
        _ => {
            let joined = matches
                .iter()
                .map(|node| node.text())
                .collect::<Vec<_>>()
                .join(" ");
            FieldValue::Text(collapse_whitespace(&joined))
        }
    }
}

/// Text of every `li` under every match of `selector`.
fn list_items<N: DomNode>(scope: &N, selector: &str) -> Vec<String> {
    scope
        .select_all(selector)
        .iter()
        .flat_map(|node| node.select_all("li"))
        .map(|li| collapse_whitespace(&li.text()))
        .filter(|text| !text.is_empty())
        .collect()
}

fn slide_description<N: DomNode>(scope: &N, selector: &str) -> FieldValue {
    let items = list_items(scope, selector);
    if !items.is_empty() {
        return FieldValue::List(items);
    }
    FieldValue::List(
        scope
            .select_all(selector)
            .iter()
            .map(|node| collapse_whitespace(&node.text()))
            .filter(|text| !text.is_empty())
            .collect(),
    )
}

fn panels_from_triggers<'d, D: DomDocument>(
    doc: &'d D,
    scope: &D::Node<'d>,
    trigger: &str,
) -> FieldValue {
    let mut panels = Vec::new();
    for node in scope.select_all(trigger) {
        let title = node
            .attr("aria-label")
            .map(|label| collapse_whitespace(&label))
            .filter(|label| !label.is_empty())
            .unwrap_or_else(|| collapse_whitespace(&node.text()));
        let content = node
            .attr("aria-controls")
            .and_then(|id| doc.element_by_id(id.trim()))
            .map(|panel| collapse_whitespace(&panel.text()))
            .unwrap_or_default();
        if title.is_empty() && content.is_empty() {
            continue;
        }
        let mut panel = Fields::new();
        panel.insert(TITLE.to_string(), FieldValue::Text(title));
        panel.insert(CONTENT.to_string(), FieldValue::Text(content));
        panels.push(panel);
    }
    FieldValue::Records(panels)
}

/// Reduce the canonical string fields to one string each.
fn canonicalize(fields: &mut Fields) {
    for name in CANONICAL_STRING_FIELDS {
        let Some(value) = fields.get_mut(name) else {
            continue;
        };
        if matches!(value, FieldValue::List(_) | FieldValue::Records(_)) {
            let mut parts = Vec::new();
            value.collect_text(&mut parts);
            let joined = collapse_whitespace(&parts.join(" "));
            *value = if joined.is_empty() {
                FieldValue::Null
            } else {
                FieldValue::Text(joined)
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldSpec, Schema, PRE_TITLE, SUBTITLE};

    fn target() -> CrawlTarget {
        CrawlTarget::new("https://x.com/p/router-x", "Router X")
    }

    fn extractor() -> Extractor {
        Extractor::new(Url::parse("https://x.com/").unwrap())
    }

    fn schema(fields: Vec<(&str, FieldSpec)>) -> Schema {
        Schema::new(fields).unwrap()
    }

    #[test]
    fn test_single_match_is_trimmed() {
        let html = r#"<h1 class="title"> Router X </h1>"#;
        let s = schema(vec![(TITLE, FieldSpec::scalar(".title"))]);
        let record = extractor().extract_html(html, &s, 0, &target());
        assert_eq!(record.get(TITLE), Some(&FieldValue::from("Router X")));
        assert_eq!(record.url, "https://x.com/p/router-x");
        assert_eq!(record.link_text, "Router X");
    }

    #[test]
    fn test_multiple_matches_are_joined() {
        let html = r#"<p class="sub">A</p><p class="sub">B</p><p class="sub">  C
            D </p>"#;
        let s = schema(vec![(SUBTITLE, FieldSpec::scalar(".sub"))]);
        let record = extractor().extract_html(html, &s, 0, &target());
        assert_eq!(record.get(SUBTITLE), Some(&FieldValue::from("A B C D")));
    }

    #[test]
    fn test_missing_scalar_policy_differs_by_tier() {
        let s = schema(vec![(TITLE, FieldSpec::scalar(".nope"))]);
        let primary = extractor().extract_html("<p></p>", &s, 0, &target());
        let retry = extractor().extract_html("<p></p>", &s, 2, &target());
        assert_eq!(primary.get(TITLE), Some(&FieldValue::Text(String::new())));
        assert_eq!(retry.get(TITLE), Some(&FieldValue::Null));
    }

    #[test]
    fn test_unparseable_selector_degrades_to_empty() {
        let s = schema(vec![
            (TITLE, FieldSpec::scalar("h1")),
            (PRE_TITLE, FieldSpec::scalar("div[[")),
        ]);
        let record = extractor().extract_html("<h1>Ok</h1>", &s, 1, &target());
        assert_eq!(record.get(TITLE), Some(&FieldValue::from("Ok")));
        assert_eq!(record.get(PRE_TITLE), Some(&FieldValue::Null));
    }

    #[test]
    fn test_collection_keeps_description_items() {
        let html = r#"
            <div class="card"><h3>Speed</h3><div class="body"><ul><li>Fast</li><li> Very  fast</li></ul></div></div>
            <div class="card"><h3>Range</h3><div class="body">Long range</div></div>
        "#;
        let s = schema(vec![(
            "features",
            FieldSpec::collection(
                ".card",
                schema(vec![
                    (TITLE, FieldSpec::scalar("h3")),
                    (DESCRIPTION, FieldSpec::scalar(".body")),
                ]),
            ),
        )]);
        let record = extractor().extract_html(html, &s, 0, &target());
        let FieldValue::Records(cards) = record.get("features").unwrap() else {
            panic!("expected records");
        };
        assert_eq!(cards.len(), 2);
        assert_eq!(cards[0][TITLE], FieldValue::from("Speed"));
        assert_eq!(
            cards[0][DESCRIPTION],
            FieldValue::List(vec!["Fast".into(), "Very fast".into()])
        );
        assert_eq!(cards[1][DESCRIPTION], FieldValue::from("Long range"));
    }

    #[test]
    fn test_expandable_panel_primary_and_retry_paths() {
        let html = r#"
            <div class="acc">
              <button aria-controls="p1" aria-label="Ports">ignored</button>
              <button aria-controls="p2">  Power </button>
            </div>
            <div id="p1">4x   GbE</div>
            <div id="p2">12V DC</div>
            <div class="modal"><h2>Modal</h2><div class="body">Hidden</div></div>
        "#;
        let s = schema(vec![(
            "specifications",
            FieldSpec::expandable_panel(
                ".acc [aria-controls]",
                ".modal",
                schema(vec![
                    (TITLE, FieldSpec::scalar("h2")),
                    (CONTENT, FieldSpec::scalar(".body")),
                ]),
            ),
        )]);

        let primary = extractor().extract_html(html, &s, 0, &target());
        let FieldValue::Records(panels) = primary.get("specifications").unwrap() else {
            panic!("expected records");
        };
        assert_eq!(panels.len(), 2);
        assert_eq!(panels[0][TITLE], FieldValue::from("Ports"));
        assert_eq!(panels[0][CONTENT], FieldValue::from("4x GbE"));
        assert_eq!(panels[1][TITLE], FieldValue::from("Power"));
        assert_eq!(panels[1][CONTENT], FieldValue::from("12V DC"));

        let retry = extractor().extract_html(html, &s, 1, &target());
        let FieldValue::Records(modal) = retry.get("specifications").unwrap() else {
            panic!("expected records");
        };
        assert_eq!(modal.len(), 1);
        assert_eq!(modal[0][TITLE], FieldValue::from("Modal"));
        assert_eq!(modal[0][CONTENT], FieldValue::from("Hidden"));
    }

    #[test]
    fn test_slide_description_is_a_sequence() {
        let html = r#"
            <div class="gallery">
              <div class="slide"><p class="cap">Front</p><div class="desc"><ul><li>LEDs</li><li>Ports</li></ul></div></div>
              <div class="slide"><p class="cap">Back</p><div class="desc">Plain text</div></div>
            </div>
        "#;
        let s = schema(vec![(
            "gallery",
            FieldSpec::slide(
                ".gallery",
                ".slide",
                schema(vec![
                    ("caption", FieldSpec::scalar(".cap")),
                    (DESCRIPTION, FieldSpec::scalar(".desc")),
                ]),
            ),
        )]);
        let record = extractor().extract_html(html, &s, 0, &target());
        let FieldValue::Records(slides) = record.get("gallery").unwrap() else {
            panic!("expected records");
        };
        assert_eq!(slides[0]["caption"], FieldValue::from("Front"));
        assert_eq!(
            slides[0][DESCRIPTION],
            FieldValue::List(vec!["LEDs".into(), "Ports".into()])
        );
        assert_eq!(
            slides[1][DESCRIPTION],
            FieldValue::List(vec!["Plain text".into()])
        );
    }

    #[test]
    fn test_url_fields_resolve_hrefs() {
        let html = r#"
            <ul class="res">
              <li><a href="/docs/manual.pdf">Manual</a></li>
              <li><a href="https://cdn.example.org/sheet.pdf">Sheet</a></li>
              <li><a href="guide.html">Guide</a></li>
            </ul>
        "#;
        let s = schema(vec![("resources", FieldSpec::scalar(".res a"))]);
        let record = extractor().extract_html(html, &s, 0, &target());
        assert_eq!(
            record.get("resources"),
            Some(&FieldValue::List(vec![
                "https://x.com/docs/manual.pdf".into(),
                "https://cdn.example.org/sheet.pdf".into(),
                "https://x.com/guide.html".into(),
            ]))
        );
    }

    #[test]
    fn test_resolve_href_follows_url_rules() {
        let ex = extractor();
        assert_eq!(
            ex.resolve_href("//cdn.x.com/a.pdf").as_deref(),
            Some("https://cdn.x.com/a.pdf")
        );
        assert_eq!(
            ex.resolve_href("../docs/a.pdf").as_deref(),
            Some("https://x.com/docs/a.pdf")
        );
        assert_eq!(
            ex.resolve_href(" /docs/./b.pdf ").as_deref(),
            Some("https://x.com/docs/b.pdf")
        );
        assert_eq!(ex.resolve_href("javascript:void(0)"), None);
        assert_eq!(ex.resolve_href("mailto:a@x.com"), None);
        assert_eq!(ex.resolve_href("   "), None);
    }

    #[test]
    fn test_non_http_hrefs_are_dropped_from_url_fields() {
        let html = r#"
            <div class="res">
              <a href="javascript:void(0)">Open</a>
              <a href="mailto:sales@x.com">Mail</a>
              <a href="//cdn.x.com/sheet.pdf">Sheet</a>
            </div>
        "#;
        let s = schema(vec![("resources", FieldSpec::scalar(".res a"))]);
        let record = extractor().extract_html(html, &s, 0, &target());
        assert_eq!(
            record.get("resources"),
            Some(&FieldValue::List(vec!["https://cdn.x.com/sheet.pdf".into()]))
        );
    }

    #[test]
    fn test_canonical_fields_forced_to_strings() {
        let mut fields = Fields::new();
        fields.insert(
            DESCRIPTION.into(),
            FieldValue::List(vec![" Fast ".into(), "secure".into()]),
        );
        fields.insert(TITLE.into(), FieldValue::List(vec!["  ".into()]));
        fields.insert("features".into(), FieldValue::List(vec!["kept".into()]));
        canonicalize(&mut fields);
        assert_eq!(fields[DESCRIPTION], FieldValue::from("Fast secure"));
        assert_eq!(fields[TITLE], FieldValue::Null);
        assert_eq!(fields["features"], FieldValue::List(vec!["kept".into()]));
    }
}

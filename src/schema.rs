//! Declarative selector schemas and the retry ladder they form.
//!
//! A [`Schema`] is an ordered field name → [`FieldSpec`] mapping. Schemas
//! are immutable and only exist in a validated state: every constructor,
//! including deserialization from the `[[tiers]]` config section, runs the
//! same shape checks.
//!
//! # Config shape
//!
//! ```toml
//! [[tiers]]
//! name = "structured"
//! required = ["title", "preTitle"]
//!
//! [tiers.fields.title]
//! kind = "scalar"
//! selector = "h1"
//!
//! [tiers.fields.features]
//! kind = "collection"
//! container = ".feature"
//! fields = { name = { kind = "scalar", selector = "h3" } }
//! ```

use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::SchemaError;
use crate::models::ExtractedRecord;

pub const PRE_TITLE: &str = "preTitle";
pub const TITLE: &str = "title";
pub const SUBTITLE: &str = "subtitle";
pub const DESCRIPTION: &str = "description";
pub const CONTENT: &str = "content";

/// Fields that are always reduced to a single string after extraction.
pub const CANONICAL_STRING_FIELDS: [&str; 4] = [PRE_TITLE, TITLE, SUBTITLE, DESCRIPTION];

/// Fields whose matches are links; their `href` is resolved instead of text.
pub const URL_FIELDS: [&str; 2] = ["resources", "listing"];

/// Keys every record carries alongside its fields; a schema may not reuse them.
pub const RESERVED_FIELDS: [&str; 2] = ["url", "linkText"];

/// How one field is located on a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum FieldSpec {
    /// Text of every element matching `selector`.
    Scalar { selector: String },
    /// One nested record per `container` match.
    Collection { container: String, fields: Schema },
    /// Accordion or tab panels. The primary tier follows `trigger` elements
    /// to the panels they control; retry tiers read the single modal
    /// `container` with `fields`.
    ExpandablePanel {
        trigger: String,
        container: String,
        fields: Schema,
    },
    /// One nested record per `slide` under the first `container` match.
    Slide {
        container: String,
        slide: String,
        fields: Schema,
    },
}

impl FieldSpec {
    pub fn scalar(selector: impl Into<String>) -> Self {
        FieldSpec::Scalar {
            selector: selector.into(),
        }
    }

    pub fn collection(container: impl Into<String>, fields: Schema) -> Self {
        FieldSpec::Collection {
            container: container.into(),
            fields,
        }
    }

    pub fn expandable_panel(
        trigger: impl Into<String>,
        container: impl Into<String>,
        fields: Schema,
    ) -> Self {
        FieldSpec::ExpandablePanel {
            trigger: trigger.into(),
            container: container.into(),
            fields,
        }
    }

    pub fn slide(container: impl Into<String>, slide: impl Into<String>, fields: Schema) -> Self {
        FieldSpec::Slide {
            container: container.into(),
            slide: slide.into(),
            fields,
        }
    }

    fn validate(&self, field: &str) -> Result<(), SchemaError> {
        let selectors: Vec<(&'static str, &str)> = match self {
            FieldSpec::Scalar { selector } => vec![("scalar", selector)],
            FieldSpec::Collection { container, .. } => vec![("container", container)],
            FieldSpec::ExpandablePanel {
                trigger, container, ..
            } => vec![("trigger", trigger), ("container", container)],
            FieldSpec::Slide {
                container, slide, ..
            } => vec![("container", container), ("slide", slide)],
        };
        for (what, selector) in selectors {
            if selector.trim().is_empty() {
                return Err(SchemaError::EmptySelector {
                    field: field.to_string(),
                    what,
                });
            }
        }
        Ok(())
    }
}

/// An ordered, validated field name → [`FieldSpec`] mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    try_from = "IndexMap<String, FieldSpec>",
    into = "IndexMap<String, FieldSpec>"
)]
pub struct Schema {
    fields: IndexMap<String, FieldSpec>,
}

impl Schema {
    /// Build a schema, rejecting empty schemas, blank or reserved names, and blank selectors.
    ///
    /// Nested schemas are already validated by their own construction.
    pub fn new<I, K>(fields: I) -> Result<Self, SchemaError>
    where
        I: IntoIterator<Item = (K, FieldSpec)>,
        K: Into<String>,
    {
        let fields: IndexMap<String, FieldSpec> =
            fields.into_iter().map(|(k, v)| (k.into(), v)).collect();
        if fields.is_empty() {
            return Err(SchemaError::Empty);
        }
        for (name, spec) in &fields {
            if name.trim().is_empty() {
                return Err(SchemaError::EmptyFieldName);
            }
            if RESERVED_FIELDS.contains(&name.as_str()) {
                return Err(SchemaError::ReservedFieldName {
                    field: name.clone(),
                });
            }
            spec.validate(name)?;
        }
        Ok(Self { fields })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldSpec)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn get(&self, field: &str) -> Option<&FieldSpec> {
        self.fields.get(field)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl TryFrom<IndexMap<String, FieldSpec>> for Schema {
    type Error = SchemaError;

    fn try_from(fields: IndexMap<String, FieldSpec>) -> Result<Self, Self::Error> {
        Schema::new(fields)
    }
}

impl From<Schema> for IndexMap<String, FieldSpec> {
    fn from(schema: Schema) -> Self {
        schema.fields
    }
}

/// One rung of the retry ladder: a schema and the fields it must produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tier {
    pub name: String,
    /// A record passes this tier when every listed field is non-empty.
    pub required: Vec<String>,
    /// Navigation timeout override in seconds; `0` waits indefinitely.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    pub fields: Schema,
}

impl Tier {
    pub fn new(name: impl Into<String>, required: &[&str], fields: Schema) -> Self {
        Self {
            name: name.into(),
            required: required.iter().map(|s| s.to_string()).collect(),
            timeout_secs: None,
            fields,
        }
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Success predicate: all required fields present and non-empty.
    pub fn is_satisfied_by(&self, record: &ExtractedRecord) -> bool {
        self.required.iter().all(|field| record.has(field))
    }

    /// Resolve this tier's navigation timeout, `None` meaning unbounded.
    pub fn timeout(&self, default_secs: u64) -> Option<Duration> {
        match self.timeout_secs.unwrap_or(default_secs) {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    fn validate(&self) -> Result<(), SchemaError> {
        for field in &self.required {
            if self.fields.get(field).is_none() {
                return Err(SchemaError::UnknownRequiredField {
                    tier: self.name.clone(),
                    field: field.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Ordered tiers of decreasing strictness. Index 0 is the primary pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryLadder {
    tiers: Vec<Tier>,
}

impl RetryLadder {
    pub fn new(tiers: Vec<Tier>) -> Result<Self, SchemaError> {
        if tiers.is_empty() {
            return Err(SchemaError::NoTiers);
        }
        for tier in &tiers {
            tier.validate()?;
        }
        Ok(Self { tiers })
    }

    pub fn primary(&self) -> &Tier {
        &self.tiers[0]
    }

    /// Tiers after the primary one, with their ladder index.
    pub fn retries(&self) -> impl Iterator<Item = (usize, &Tier)> {
        self.tiers.iter().enumerate().skip(1)
    }

    pub fn tiers(&self) -> &[Tier] {
        &self.tiers
    }

    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }
}

/// The ladder used when the config declares no `[[tiers]]`.
pub mod builtin {
    use super::*;

    fn schema<const N: usize>(fields: [(&str, FieldSpec); N]) -> Schema {
        // Literal schemas below are non-empty with non-blank selectors.
        Schema::new(fields).unwrap_or_else(|e| panic!("built-in schema is invalid: {e}"))
    }

    pub fn structured() -> Tier {
        Tier::new(
            "structured",
            &[TITLE, PRE_TITLE],
            schema([
                (PRE_TITLE, FieldSpec::scalar(".product-hero__eyebrow")),
                (TITLE, FieldSpec::scalar(".product-hero__title")),
                (SUBTITLE, FieldSpec::scalar(".product-hero__subtitle")),
                (DESCRIPTION, FieldSpec::scalar(".product-hero__description")),
                (
                    "features",
                    FieldSpec::collection(
                        ".feature-card",
                        schema([
                            (TITLE, FieldSpec::scalar(".feature-card__title")),
                            (DESCRIPTION, FieldSpec::scalar(".feature-card__body")),
                        ]),
                    ),
                ),
                (
                    "specifications",
                    FieldSpec::expandable_panel(
                        ".spec-accordion [aria-controls]",
                        ".spec-modal",
                        schema([
                            (TITLE, FieldSpec::scalar(".spec-modal__title")),
                            (CONTENT, FieldSpec::scalar(".spec-modal__content")),
                        ]),
                    ),
                ),
                ("resources", FieldSpec::scalar(".resource-list a[href]")),
                (
                    "gallery",
                    FieldSpec::slide(
                        ".product-gallery",
                        ".product-gallery__slide",
                        schema([
                            ("caption", FieldSpec::scalar(".slide__caption")),
                            (DESCRIPTION, FieldSpec::scalar(".slide__description")),
                        ]),
                    ),
                ),
            ]),
        )
    }

    pub fn legacy_template() -> Tier {
        Tier::new(
            "legacy-template",
            &[TITLE, PRE_TITLE],
            schema([
                (PRE_TITLE, FieldSpec::scalar(".product-header .category-label")),
                (TITLE, FieldSpec::scalar(".product-header h1")),
                (SUBTITLE, FieldSpec::scalar(".product-header h2")),
                (DESCRIPTION, FieldSpec::scalar(".product-overview p")),
                (
                    "features",
                    FieldSpec::collection(
                        ".product-features .feature",
                        schema([
                            (TITLE, FieldSpec::scalar("h3")),
                            (DESCRIPTION, FieldSpec::scalar(".feature-text")),
                        ]),
                    ),
                ),
                (
                    "specifications",
                    FieldSpec::expandable_panel(
                        ".tabs [role=tab]",
                        "#spec-modal",
                        schema([
                            (TITLE, FieldSpec::scalar(".modal-title")),
                            (CONTENT, FieldSpec::scalar(".modal-body")),
                        ]),
                    ),
                ),
                ("listing", FieldSpec::scalar(".product-listing a[href]")),
            ]),
        )
    }

    pub fn compact_template() -> Tier {
        Tier::new(
            "compact-template",
            &[TITLE, PRE_TITLE],
            schema([
                (PRE_TITLE, FieldSpec::scalar(".compact-product .eyebrow")),
                (TITLE, FieldSpec::scalar(".compact-product h1")),
                (SUBTITLE, FieldSpec::scalar(".compact-product .tagline")),
                (DESCRIPTION, FieldSpec::scalar(".compact-product .summary")),
            ]),
        )
    }

    pub fn content_container() -> Tier {
        Tier::new(
            "content-container",
            &[CONTENT],
            schema([(CONTENT, FieldSpec::scalar("#main-content"))]),
        )
    }

    pub fn page_body() -> Tier {
        Tier::new(
            "page-body",
            &[CONTENT],
            schema([(CONTENT, FieldSpec::scalar("body"))]),
        )
    }

    pub fn ladder() -> RetryLadder {
        RetryLadder {
            tiers: vec![
                structured(),
                legacy_template(),
                compact_template(),
                content_container(),
                page_body(),
            ],
        }
    }
}

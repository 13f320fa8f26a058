//! Core data models used throughout the harvester.
//!
//! These types are what flows between discovery, extraction, the retry
//! ladder, and the persisted artifacts. Every persisted type serializes with
//! camelCase keys so the JSON artifacts keep one consistent shape.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A page queued for extraction. Identity is the url.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlTarget {
    pub url: String,
    pub display_name: String,
}

impl CrawlTarget {
    pub fn new(url: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            display_name: display_name.into(),
        }
    }
}

/// Ordered field name → value mapping produced by a schema.
pub type Fields = IndexMap<String, FieldValue>;

/// The value of one extracted field.
///
/// `Null` and `Text("")` are deliberately distinct: the primary tier reports
/// a missing scalar as an empty string while retry tiers report `null`.
///
/// JSON has no way to tell an empty list of strings from an empty list of
/// records, so an empty `Records` reads back as `List([])`. Both are empty
/// and carry no text; compare with [`FieldValue::is_empty`], not `==`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum FieldValue {
    #[default]
    Null,
    Text(String),
    List(Vec<String>),
    Records(Vec<Fields>),
}

impl FieldValue {
    /// True for `null`, blank text, and sequences with no non-blank entry.
    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Null => true,
            FieldValue::Text(s) => s.trim().is_empty(),
            FieldValue::List(items) => items.iter().all(|s| s.trim().is_empty()),
            FieldValue::Records(records) => records
                .iter()
                .all(|r| r.values().all(FieldValue::is_empty)),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Flatten into plain text, depth-first, for indexing.
    pub fn collect_text(&self, out: &mut Vec<String>) {
        match self {
            FieldValue::Null => {}
            FieldValue::Text(s) => {
                if !s.trim().is_empty() {
                    out.push(s.trim().to_string());
                }
            }
            FieldValue::List(items) => {
                out.extend(
                    items
                        .iter()
                        .map(|s| s.trim())
                        .filter(|s| !s.is_empty())
                        .map(str::to_string),
                );
            }
            FieldValue::Records(records) => {
                for record in records {
                    for value in record.values() {
                        value.collect_text(out);
                    }
                }
            }
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

/// A structured record extracted from one page.
///
/// Always carries the page `url` and the `linkText` it was discovered under;
/// the schema's fields are flattened next to them when serialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedRecord {
    pub url: String,
    pub link_text: String,
    #[serde(flatten)]
    pub fields: Fields,
}

impl ExtractedRecord {
    pub fn new(target: &CrawlTarget) -> Self {
        Self {
            url: target.url.clone(),
            link_text: target.display_name.clone(),
            fields: Fields::new(),
        }
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    /// True when the named field exists and is not empty.
    pub fn has(&self, field: &str) -> bool {
        self.fields.get(field).is_some_and(|v| !v.is_empty())
    }

    /// All text carried by the record, link text first, in field order.
    pub fn raw_text(&self) -> String {
        let mut parts = Vec::new();
        if !self.link_text.trim().is_empty() {
            parts.push(self.link_text.trim().to_string());
        }
        for value in self.fields.values() {
            value.collect_text(&mut parts);
        }
        parts.join("\n")
    }
}

/// A record that has been accepted into the canonical store.
pub type CanonicalRecord = ExtractedRecord;

/// A target that no tier has extracted successfully yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedTarget {
    pub url: String,
    pub display_name: String,
    pub error_reason: String,
    pub first_seen_at: DateTime<Utc>,
}

impl FailedTarget {
    pub fn target(&self) -> CrawlTarget {
        CrawlTarget::new(&self.url, &self.display_name)
    }
}

/// A product in the category tree with the internal documents it links to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductNode {
    pub url: String,
    pub display_name: String,
    #[serde(default)]
    pub internal_links: Vec<CrawlTarget>,
}

/// A category and the products discovered under it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryNode {
    pub url: String,
    pub display_name: String,
    #[serde(default)]
    pub products: Vec<ProductNode>,
}

/// The text content of an internal document linked from a product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalDocument {
    pub url: String,
    pub link_text: String,
    pub product_url: String,
    pub content: String,
}

/// One indexed record: its text, vector, and the record it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorEntry {
    pub url: String,
    pub raw_text: String,
    pub vector: Vec<f32>,
    pub content_hash: String,
    pub source_record: ExtractedRecord,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_serializes_flat_with_camel_case_keys() {
        let mut record = ExtractedRecord::new(&CrawlTarget::new("https://x.com/a", "A"));
        record.fields.insert("title".into(), "Router X".into());
        record.fields.insert("subtitle".into(), FieldValue::Null);

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["url"], "https://x.com/a");
        assert_eq!(json["linkText"], "A");
        assert_eq!(json["title"], "Router X");
        assert!(json["subtitle"].is_null());

        let back: ExtractedRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_empty_and_null_are_distinct_values_but_both_empty() {
        assert_ne!(FieldValue::Null, FieldValue::Text(String::new()));
        assert!(FieldValue::Null.is_empty());
        assert!(FieldValue::Text("  ".into()).is_empty());
        assert!(FieldValue::List(vec![" ".into()]).is_empty());
        assert!(!FieldValue::List(vec!["x".into()]).is_empty());
    }

    #[test]
    fn test_empty_records_reload_as_empty_list() {
        let mut record = ExtractedRecord::new(&CrawlTarget::new("https://x.com/a", "A"));
        record.fields.insert("panels".into(), FieldValue::Records(Vec::new()));
        let mut port = Fields::new();
        port.insert("name".into(), "Port".into());
        record.fields.insert("features".into(), FieldValue::Records(vec![port]));

        let json = serde_json::to_string(&record).unwrap();
        let back: ExtractedRecord = serde_json::from_str(&json).unwrap();

        assert_eq!(back.get("panels"), Some(&FieldValue::List(Vec::new())));
        assert!(back.get("panels").is_some_and(FieldValue::is_empty));
        assert_eq!(back.get("features"), record.get("features"));
        assert_eq!(back.raw_text(), record.raw_text());
    }

    #[test]
    fn test_raw_text_walks_nested_values() {
        let mut nested = Fields::new();
        nested.insert("name".into(), "Port".into());
        nested.insert("items".into(), FieldValue::List(vec!["4x GbE".into()]));

        let mut record = ExtractedRecord::new(&CrawlTarget::new("u", "Router"));
        record.fields.insert("title".into(), "Router X".into());
        record.fields.insert("features".into(), FieldValue::Records(vec![nested]));

        assert_eq!(record.raw_text(), "Router\nRouter X\nPort\n4x GbE");
    }
}

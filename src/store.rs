//! Canonical merge store.
//!
//! Two url-keyed merge policies, used by different pipeline stages:
//!
//! - [`CanonicalStore::upsert`]: first writer wins. A record whose url is
//!   already stored is ignored, so re-running a crawl never overwrites data.
//! - [`ProductLinkStore::merge`]: union. When a product shows up again (under
//!   another category, or in a later run) its internal links are merged with
//!   the stored ones, deduplicated by link url.
//!
//! Both are idempotent: applying the same input twice leaves the store as it
//! was after the first application.

use std::collections::HashSet;
use std::path::PathBuf;

use crate::error::PersistError;
use crate::models::{CanonicalRecord, CrawlTarget, ProductNode};
use crate::persist::JsonFile;

/// Extracted records keyed by url.
pub struct CanonicalStore {
    file: JsonFile<CanonicalRecord>,
}

impl CanonicalStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, PersistError> {
        Ok(Self {
            file: JsonFile::open_or_quarantine(path)?,
        })
    }

    /// Insert `record` unless its url is already present. Returns whether it was inserted.
    pub fn upsert(&mut self, record: CanonicalRecord) -> Result<bool, PersistError> {
        if self.contains(&record.url) {
            tracing::debug!(url = %record.url, "Record already stored, keeping existing");
            return Ok(false);
        }
        self.file.update(|records| records.push(record))?;
        Ok(true)
    }

    pub fn contains(&self, url: &str) -> bool {
        self.file.items().iter().any(|r| r.url == url)
    }

    pub fn all(&self) -> &[CanonicalRecord] {
        self.file.items()
    }

    pub fn len(&self) -> usize {
        self.file.len()
    }

    pub fn is_empty(&self) -> bool {
        self.file.is_empty()
    }
}

/// Products with their internal links, keyed by product url.
pub struct ProductLinkStore {
    file: JsonFile<ProductNode>,
}

impl ProductLinkStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, PersistError> {
        Ok(Self {
            file: JsonFile::open_or_quarantine(path)?,
        })
    }

    /// Union `incoming` into the stored products and write once.
    pub fn merge(
        &mut self,
        incoming: impl IntoIterator<Item = ProductNode>,
    ) -> Result<(), PersistError> {
        self.file.update(|products| {
            for product in incoming {
                merge_product(products, product);
            }
        })
    }

    pub fn all(&self) -> &[ProductNode] {
        self.file.items()
    }

    pub fn len(&self) -> usize {
        self.file.len()
    }

    pub fn is_empty(&self) -> bool {
        self.file.is_empty()
    }
}

/// Add `product` to `products`, unioning internal links if its url is already there.
pub fn merge_product(products: &mut Vec<ProductNode>, product: ProductNode) {
    match products.iter_mut().find(|p| p.url == product.url) {
        Some(existing) => union_links(&mut existing.internal_links, product.internal_links),
        None => {
            let mut product = product;
            let links = std::mem::take(&mut product.internal_links);
            union_links(&mut product.internal_links, links);
            products.push(product);
        }
    }
}

/// Append links from `incoming` whose url is not yet in `links`.
pub fn union_links(links: &mut Vec<CrawlTarget>, incoming: Vec<CrawlTarget>) {
    let mut seen: HashSet<String> = links.iter().map(|l| l.url.clone()).collect();
    for link in incoming {
        if seen.insert(link.url.clone()) {
            links.push(link);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExtractedRecord;
    use tempfile::TempDir;

    fn link(url: &str) -> CrawlTarget {
        CrawlTarget::new(url, url)
    }

    fn product(url: &str, links: &[&str]) -> ProductNode {
        ProductNode {
            url: url.to_string(),
            display_name: url.to_string(),
            internal_links: links.iter().map(|l| link(l)).collect(),
        }
    }

    fn urls(links: &[CrawlTarget]) -> HashSet<&str> {
        links.iter().map(|l| l.url.as_str()).collect()
    }

    #[test]
    fn test_upsert_keeps_existing() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("canonical-records.json");
        let mut store = CanonicalStore::open(&path).unwrap();

        let mut first = ExtractedRecord::new(&link("https://x.com/a"));
        first.fields.insert("title".into(), "First".into());
        let mut second = first.clone();
        second.fields.insert("title".into(), "Second".into());

        assert!(store.upsert(first.clone()).unwrap());
        assert!(!store.upsert(second).unwrap());
        assert!(!store.upsert(first.clone()).unwrap());

        let reopened = CanonicalStore::open(&path).unwrap();
        assert_eq!(reopened.all(), &[first]);
    }

    #[test]
    fn test_union_is_order_independent() {
        let a = product("p", &["l1", "l2"]);
        let b = product("p", &["l2", "l3", "l3"]);

        let mut ab = Vec::new();
        merge_product(&mut ab, a.clone());
        merge_product(&mut ab, b.clone());

        let mut ba = Vec::new();
        merge_product(&mut ba, b);
        merge_product(&mut ba, a);

        assert_eq!(ab.len(), 1);
        assert_eq!(ab[0].internal_links.len(), 3);
        assert_eq!(urls(&ab[0].internal_links), urls(&ba[0].internal_links));
    }

    #[test]
    fn test_merge_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let mut store = ProductLinkStore::open(tmp.path().join("merged.json")).unwrap();
        let batch = vec![product("p1", &["a", "b"]), product("p2", &["c"])];

        store.merge(batch.clone()).unwrap();
        let once = store.all().to_vec();
        store.merge(batch).unwrap();
        assert_eq!(store.all(), once.as_slice());
        assert_eq!(store.len(), 2);
    }
}

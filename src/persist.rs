//! File-backed JSON artifacts.
//!
//! Every persisted collection is one pretty-printed JSON array. A
//! [`JsonFile`] loads the whole array when opened and rewrites the whole
//! file on every mutation; there is no locking, so one process owns a data
//! directory at a time.
//!
//! A missing or zero-length file opens as an empty collection. A file that
//! exists but does not parse is [`PersistError::Malformed`]; callers that
//! prefer to keep going use [`JsonFile::open_or_quarantine`], which moves the
//! bad file aside instead of overwriting it.
//!
//! Single-object artifacts (the vector index) go through [`load_document`]
//! and [`save_document`] with the same write-then-rename discipline.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::PersistError;

pub const FAILED_TARGETS: &str = "failed-targets.json";
pub const PRODUCTS: &str = "products.json";
pub const CATALOG_TREE: &str = "catalog-tree.json";
pub const PRODUCTS_MERGED: &str = "products-merged.json";
pub const INTERNAL_CONTENT: &str = "internal-content.json";
pub const CANONICAL_RECORDS: &str = "canonical-records.json";
pub const VECTOR_INDEX: &str = "vector-index.json";

/// Paths of the artifacts under one data directory.
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path(&self, artifact: &str) -> PathBuf {
        self.root.join(artifact)
    }
}

/// A JSON array on disk, held in memory between writes.
#[derive(Debug)]
pub struct JsonFile<T> {
    path: PathBuf,
    items: Vec<T>,
}

impl<T> JsonFile<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Load `path`, failing on malformed content.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, PersistError> {
        let path = path.into();
        let items = read_items(&path)?;
        Ok(Self { path, items })
    }

    /// Load `path`; if it is malformed, rename it to `<name>.corrupt` and start empty.
    pub fn open_or_quarantine(path: impl Into<PathBuf>) -> Result<Self, PersistError> {
        let path = path.into();
        match read_items(&path) {
            Ok(items) => Ok(Self { path, items }),
            Err(PersistError::Malformed { source, .. }) => {
                let quarantined = quarantine(&path)?;
                tracing::warn!(
                    path = %path.display(),
                    moved_to = %quarantined.display(),
                    error = %source,
                    "Malformed artifact quarantined, starting empty"
                );
                Ok(Self {
                    path,
                    items: Vec::new(),
                })
            }
            Err(e) => Err(e),
        }
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn into_items(self) -> Vec<T> {
        self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Replace the contents and write them out.
    pub fn replace(&mut self, items: Vec<T>) -> Result<(), PersistError> {
        self.items = items;
        self.flush()
    }

    /// Mutate in place, then write out.
    pub fn update<R>(&mut self, f: impl FnOnce(&mut Vec<T>) -> R) -> Result<R, PersistError> {
        let result = f(&mut self.items);
        self.flush()?;
        Ok(result)
    }

    /// Write the whole array through a sibling temp file and rename.
    pub fn flush(&self) -> Result<(), PersistError> {
        write_json(&self.path, &self.items)
    }
}

/// Load a single JSON document; `None` when the file is missing or empty.
pub fn load_document<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, PersistError> {
    match read_text(path)? {
        Some(content) => serde_json::from_str(&content)
            .map(Some)
            .map_err(|source| PersistError::Malformed {
                path: path.to_path_buf(),
                source,
            }),
        None => Ok(None),
    }
}

/// Write a single JSON document.
pub fn save_document<T: Serialize>(path: &Path, value: &T) -> Result<(), PersistError> {
    write_json(path, value)
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), PersistError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(io_error(parent))?;
        }
    }

    let mut body = serde_json::to_string_pretty(value).map_err(|source| PersistError::Malformed {
        path: path.to_path_buf(),
        source,
    })?;
    body.push('\n');

    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, body).map_err(io_error(&tmp))?;
    fs::rename(&tmp, path).map_err(io_error(path))?;
    Ok(())
}

/// File contents, or `None` when the file is missing or blank.
fn read_text(path: &Path) -> Result<Option<String>, PersistError> {
    match fs::read_to_string(path) {
        Ok(content) if content.trim().is_empty() => Ok(None),
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(PersistError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn read_items<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, PersistError> {
    Ok(load_document(path)?.unwrap_or_default())
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> PersistError {
    let path = path.to_path_buf();
    move |source| PersistError::Io { path, source }
}

/// Rename `path` to `<name>.corrupt`, replacing any earlier quarantined copy.
pub fn quarantine(path: &Path) -> Result<PathBuf, PersistError> {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".corrupt");
    let quarantined = path.with_file_name(name);
    fs::rename(path, &quarantined).map_err(io_error(&quarantined))?;
    Ok(quarantined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CrawlTarget;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_opens_empty() {
        let tmp = TempDir::new().unwrap();
        let file: JsonFile<CrawlTarget> = JsonFile::open(tmp.path().join("none.json")).unwrap();
        assert!(file.is_empty());
    }

    #[test]
    fn test_writes_survive_reopen() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested/products.json");
        let mut file: JsonFile<CrawlTarget> = JsonFile::open(&path).unwrap();
        file.replace(vec![CrawlTarget::new("https://x.com/a", "A")])
            .unwrap();
        file.update(|items| items.push(CrawlTarget::new("https://x.com/b", "B")))
            .unwrap();

        let reopened: JsonFile<CrawlTarget> = JsonFile::open(&path).unwrap();
        assert_eq!(reopened.len(), 2);
        assert_eq!(reopened.items()[1].display_name, "B");

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"displayName\": \"A\""));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_malformed_is_explicit() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("failed-targets.json");
        fs::write(&path, "[{not json").unwrap();
        let err = JsonFile::<CrawlTarget>::open(&path).unwrap_err();
        assert!(matches!(err, PersistError::Malformed { .. }));
    }

    #[test]
    fn test_quarantine_moves_bad_file_aside() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("failed-targets.json");
        fs::write(&path, "{\"oops\": true}").unwrap();

        let file = JsonFile::<CrawlTarget>::open_or_quarantine(&path).unwrap();
        assert!(file.is_empty());
        assert!(!path.exists());
        let moved = tmp.path().join("failed-targets.json.corrupt");
        assert_eq!(fs::read_to_string(moved).unwrap(), "{\"oops\": true}");
    }

    #[test]
    fn test_document_round_trip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("vector-index.json");
        assert_eq!(load_document::<CrawlTarget>(&path).unwrap(), None);
        let target = CrawlTarget::new("https://x.com/a", "A");
        save_document(&path, &target).unwrap();
        assert_eq!(load_document(&path).unwrap(), Some(target));
    }
}

//! On-disk index snapshots and corpus fingerprints.
//!
//! A snapshot is the JSON serialization of an [`Index`] wrapped with a
//! format version. It is keyed by a fingerprint: a SHA-256 digest over the
//! corpus root and every document's relative path and modification time.
//! Comparing the stored fingerprint with one computed from a fresh
//! discovery tells whether the snapshot is current without reading any
//! document content.
//!
//! Snapshots are written to a temporary file and renamed into place, so a
//! reader never observes a partially written index.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::{DocsError, Result};
use crate::index::Index;
use crate::models::SourceFile;

/// Bumped whenever the serialized layout of [`Index`] changes.
pub const FORMAT_VERSION: u32 = 1;

/// Compute the corpus fingerprint from `(relative path, mtime)` pairs.
///
/// The result does not depend on the order of `files`.
pub fn fingerprint<'a, I>(root: &Path, files: I) -> String
where
    I: IntoIterator<Item = (&'a str, i64)>,
{
    let mut entries: Vec<(&str, i64)> = files.into_iter().collect();
    entries.sort_unstable();

    let mut hasher = Sha256::new();
    hasher.update(root.to_string_lossy().as_bytes());
    hasher.update([0u8]);
    for (relative, modified) in entries {
        hasher.update(relative.as_bytes());
        hasher.update([0u8]);
        hasher.update(modified.to_le_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Fingerprint of a discovered file set.
pub fn fingerprint_files(root: &Path, files: &[SourceFile]) -> String {
    fingerprint(root, files.iter().map(|f| (f.relative.as_str(), f.modified)))
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    format_version: u32,
    saved_at: DateTime<Utc>,
    index: &'a Index,
}

#[derive(Deserialize)]
struct Snapshot {
    format_version: u32,
    #[allow(dead_code)]
    saved_at: DateTime<Utc>,
    index: Index,
}

/// Reads and writes index snapshots at a fixed path.
#[derive(Debug, Clone)]
pub struct IndexStore {
    path: PathBuf,
}

impl IndexStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Persist `index`, replacing any previous snapshot atomically.
    pub fn save(&self, index: &Index) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let snapshot = SnapshotRef {
            format_version: FORMAT_VERSION,
            saved_at: Utc::now(),
            index,
        };
        let bytes = serde_json::to_vec(&snapshot)?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        std::fs::write(&tmp, &bytes)?;
        std::fs::rename(&tmp, &self.path)?;

        info!(
            path = %self.path.display(),
            documents = index.doc_count(),
            bytes = bytes.len(),
            "index snapshot saved"
        );
        Ok(())
    }

    /// Load the snapshot if it matches `current_fingerprint`.
    ///
    /// Fails with [`DocsError::StaleIndex`] when the corpus changed since
    /// the snapshot was written; the snapshot is never partially trusted.
    pub fn load(&self, current_fingerprint: &str) -> Result<Index> {
        let index = self.read()?;
        if index.fingerprint() != current_fingerprint {
            return Err(DocsError::StaleIndex {
                path: self.path.clone(),
                expected: index.fingerprint().to_string(),
                actual: current_fingerprint.to_string(),
            });
        }
        debug!(path = %self.path.display(), generation = index.generation(), "index snapshot is current");
        Ok(index)
    }

    /// Load the snapshot without a freshness check.
    ///
    /// The structure is still validated; a stale snapshot read this way is
    /// only fit to seed an incremental update.
    pub fn read(&self) -> Result<Index> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(DocsError::NotFound {
                    path: self.path.clone(),
                })
            }
            Err(e) => return Err(DocsError::read(&self.path, e)),
        };

        let snapshot: Snapshot =
            serde_json::from_slice(&bytes).map_err(|e| self.corrupt(e.to_string()))?;

        if snapshot.format_version != FORMAT_VERSION {
            return Err(self.corrupt(format!(
                "unsupported format version {} (expected {})",
                snapshot.format_version, FORMAT_VERSION
            )));
        }

        snapshot.index.verify().map_err(|reason| self.corrupt(reason))?;
        Ok(snapshot.index)
    }

    fn corrupt(&self, reason: String) -> DocsError {
        DocsError::CorruptIndex {
            path: self.path.clone(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::Analyzer;
    use crate::builder::IndexBuilder;
    use crate::models::{DocFormat, Document};
    use tempfile::TempDir;

    fn doc(relative: &str, text: &str, modified: i64) -> Document {
        Document {
            id: relative.to_string(),
            path: PathBuf::from("/docs").join(relative),
            relative: relative.to_string(),
            format: DocFormat::Plain,
            title: relative.to_string(),
            byte_len: text.len() as u64,
            modified,
            text: text.to_string(),
        }
    }

    fn sample_index() -> Index {
        IndexBuilder::new(Analyzer::default())
            .build(
                Path::new("/docs"),
                vec![
                    doc("a.md", "AWS Lambda functions scale automatically", 1),
                    doc("b.md", "Python virtual environments isolate dependencies", 2),
                ],
            )
            .unwrap()
            .index
    }

    #[test]
    fn test_fingerprint_is_order_independent() {
        let root = Path::new("/docs");
        let a = fingerprint(root, vec![("a.md", 1), ("b.md", 2)]);
        let b = fingerprint(root, vec![("b.md", 2), ("a.md", 1)]);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_fingerprint_changes_with_mtime_path_and_root() {
        let root = Path::new("/docs");
        let base = fingerprint(root, vec![("a.md", 1)]);
        assert_ne!(base, fingerprint(root, vec![("a.md", 2)]));
        assert_ne!(base, fingerprint(root, vec![("c.md", 1)]));
        assert_ne!(base, fingerprint(Path::new("/other"), vec![("a.md", 1)]));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let tmp = TempDir::new().unwrap();
        let store = IndexStore::new(tmp.path().join("nested/index.json"));
        let index = sample_index();

        store.save(&index).unwrap();
        assert!(store.exists());

        let loaded = store.load(index.fingerprint()).unwrap();
        assert_eq!(loaded, index);
    }

    #[test]
    fn test_stale_fingerprint_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let store = IndexStore::new(tmp.path().join("index.json"));
        let index = sample_index();
        store.save(&index).unwrap();

        match store.load("0000") {
            Err(DocsError::StaleIndex {
                expected, actual, ..
            }) => {
                assert_eq!(expected, index.fingerprint());
                assert_eq!(actual, "0000");
            }
            other => panic!("expected StaleIndex, got {:?}", other),
        }

        // Reading without a freshness check still works for incremental updates.
        assert_eq!(store.read().unwrap(), index);
    }

    #[test]
    fn test_missing_snapshot_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let store = IndexStore::new(tmp.path().join("absent.json"));
        assert!(matches!(store.read(), Err(DocsError::NotFound { .. })));
    }

    #[test]
    fn test_corrupt_snapshot() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("index.json");
        std::fs::write(&path, b"{ not json").unwrap();
        let store = IndexStore::new(&path);
        assert!(matches!(store.read(), Err(DocsError::CorruptIndex { .. })));
    }

    #[test]
    fn test_wrong_format_version() {
        let tmp = TempDir::new().unwrap();
        let store = IndexStore::new(tmp.path().join("index.json"));
        store.save(&sample_index()).unwrap();

        let mut value: serde_json::Value =
            serde_json::from_slice(&std::fs::read(store.path()).unwrap()).unwrap();
        value["format_version"] = serde_json::json!(99);
        std::fs::write(store.path(), serde_json::to_vec(&value).unwrap()).unwrap();

        match store.read() {
            Err(DocsError::CorruptIndex { reason, .. }) => {
                assert!(reason.contains("format version 99"))
            }
            other => panic!("expected CorruptIndex, got {:?}", other),
        }
    }
}

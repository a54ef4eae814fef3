//! Filesystem document loader.
//!
//! Walks a corpus root, keeps files whose extension is on the allow-list,
//! and reads them into normalized [`Document`]s. Discovery only stats files;
//! content is read lazily, one document per iterator step, so a large corpus
//! is never resident in memory at once.

use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::CorpusConfig;
use crate::error::{DocsError, Result};
use crate::extract;
use crate::models::{document_id, DocFormat, Document, SourceFile};

const DEFAULT_EXCLUDES: &[&str] = &["**/.git/**", "**/target/**", "**/node_modules/**"];

/// Discovers and reads documents under a corpus root.
#[derive(Debug, Clone)]
pub struct DocumentLoader {
    root: PathBuf,
    extensions: Vec<String>,
    exclude_set: GlobSet,
    follow_symlinks: bool,
}

impl DocumentLoader {
    /// Create a loader for `root`, matching files by extension (with or
    /// without a leading dot, case-insensitive).
    ///
    /// Fails with [`DocsError::NotFound`] if the root is not an existing
    /// directory.
    pub fn new(root: impl AsRef<Path>, extensions: &[String]) -> Result<Self> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(DocsError::NotFound {
                path: root.to_path_buf(),
            });
        }
        let root = root.canonicalize()?;

        let extensions = extensions
            .iter()
            .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
            .collect();

        Ok(Self {
            root,
            extensions,
            exclude_set: build_globset(&[])?,
            follow_symlinks: false,
        })
    }

    pub fn from_config(config: &CorpusConfig) -> Result<Self> {
        Ok(Self::new(&config.root, &config.extensions)?
            .with_excludes(&config.exclude_globs)?
            .follow_symlinks(config.follow_symlinks))
    }

    /// Exclude files matching any of `patterns` (relative to the root), in
    /// addition to VCS and build directories.
    pub fn with_excludes(mut self, patterns: &[String]) -> Result<Self> {
        self.exclude_set = build_globset(patterns)?;
        Ok(self)
    }

    pub fn follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    /// Canonical corpus root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// List candidate files in discovery order (sorted by relative path).
    ///
    /// Unreadable directory entries are logged and skipped.
    pub fn discover(&self) -> Result<Vec<SourceFile>> {
        if !self.root.is_dir() {
            return Err(DocsError::NotFound {
                path: self.root.clone(),
            });
        }

        let mut files = Vec::new();
        let walker = WalkDir::new(&self.root).follow_links(self.follow_symlinks);
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "skipping unreadable directory entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            if !self.matches_extension(path) {
                continue;
            }

            let relative = relative_path(&self.root, path);
            if self.exclude_set.is_match(&relative) {
                continue;
            }

            let metadata = match entry.metadata() {
                Ok(m) => m,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping file without metadata");
                    continue;
                }
            };

            files.push(SourceFile {
                path: path.to_path_buf(),
                format: DocFormat::from_path(path),
                byte_len: metadata.len(),
                modified: modified_nanos(metadata.modified().ok()),
                relative,
            });
        }

        // Sort for deterministic ordering
        files.sort_by(|a, b| a.relative.cmp(&b.relative));
        debug!(root = %self.root.display(), files = files.len(), "discovered corpus files");

        Ok(files)
    }

    /// Discover files and return a lazy sequence of loaded documents.
    ///
    /// Each item is read only when the iterator reaches it. A file that
    /// cannot be read yields `Err(DocsError::Read)` and iteration continues
    /// with the next file.
    pub fn load(&self) -> Result<Documents> {
        Ok(Documents {
            files: self.discover()?.into_iter(),
        })
    }

    fn matches_extension(&self, path: &Path) -> bool {
        path.extension()
            .map(|ext| {
                let ext = ext.to_string_lossy().to_ascii_lowercase();
                self.extensions.iter().any(|allowed| *allowed == ext)
            })
            .unwrap_or(false)
    }
}

/// Lazy iterator over the documents of a corpus. Unreadable files come
/// through as `Err` items for the consumer to report.
#[derive(Debug)]
pub struct Documents {
    files: std::vec::IntoIter<SourceFile>,
}

impl Iterator for Documents {
    type Item = Result<Document>;

    fn next(&mut self) -> Option<Self::Item> {
        let file = self.files.next()?;
        Some(read_document(file))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.files.size_hint()
    }
}

/// Read and normalize a single discovered file.
pub fn read_document(file: SourceFile) -> Result<Document> {
    let bytes = std::fs::read(&file.path).map_err(|e| DocsError::read(&file.path, e))?;
    let raw = String::from_utf8(bytes).map_err(|e| DocsError::read(&file.path, e))?;

    let title = extract::extract_title(&raw, file.format, &file.path);
    let text = extract::normalize(&raw, file.format);

    Ok(Document {
        id: document_id(&file.relative),
        byte_len: raw.len() as u64,
        path: file.path,
        relative: file.relative,
        format: file.format,
        title,
        modified: file.modified,
        text,
    })
}

/// `/`-separated path of `path` relative to `root`.
pub fn relative_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().to_string()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn modified_nanos(modified: Option<SystemTime>) -> i64 {
    modified
        .and_then(|m| m.duration_since(SystemTime::UNIX_EPOCH).ok())
        .map(|d| i64::try_from(d.as_nanos()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    let all = DEFAULT_EXCLUDES
        .iter()
        .map(|p| p.to_string())
        .chain(patterns.iter().cloned());
    for pattern in all {
        let glob = Glob::new(&pattern).map_err(|e| DocsError::InvalidPattern {
            pattern: pattern.clone(),
            reason: e.to_string(),
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|e| DocsError::InvalidPattern {
        pattern: patterns.join(", "),
        reason: e.to_string(),
    })
}

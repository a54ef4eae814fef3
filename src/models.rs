//! Core data models used throughout docs-harness.
//!
//! These types represent the files, documents, and search results that flow
//! through the loading, indexing, and retrieval pipeline.

use std::path::{Path, PathBuf};

use chrono::DateTime;
use serde::{Deserialize, Serialize};

/// Format tag of a loaded document, derived from its file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocFormat {
    Markdown,
    Plain,
    Html,
}

impl DocFormat {
    /// Map a file extension (without the dot, any case) to a format.
    ///
    /// Unknown extensions are treated as plain text so that a widened
    /// allow-list still indexes something sensible.
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "md" | "markdown" | "mdx" => DocFormat::Markdown,
            "html" | "htm" | "xhtml" => DocFormat::Html,
            _ => DocFormat::Plain,
        }
    }

    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .map(|e| Self::from_extension(&e.to_string_lossy()))
            .unwrap_or(DocFormat::Plain)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocFormat::Markdown => "markdown",
            DocFormat::Plain => "plain",
            DocFormat::Html => "html",
        }
    }
}

/// A candidate file found during discovery, before its content is read.
///
/// Discovery only stats files, so fingerprinting and incremental
/// change detection never need to read file contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Absolute path (unique key).
    pub path: PathBuf,
    /// Path relative to the corpus root, `/`-separated.
    pub relative: String,
    pub format: DocFormat,
    pub byte_len: u64,
    /// Modification time in nanoseconds since the Unix epoch.
    pub modified: i64,
}

/// A document read and normalized by the loader.
///
/// Immutable for the lifetime of an indexing pass. The normalized text is
/// dropped once the builder has derived term statistics from it.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    pub path: PathBuf,
    pub relative: String,
    pub format: DocFormat,
    pub title: String,
    pub byte_len: u64,
    pub modified: i64,
    pub text: String,
}

/// A ranked search result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    /// Stable document id (relative path with separators replaced by `_`).
    pub id: String,
    /// Absolute path of the document.
    pub path: PathBuf,
    pub title: String,
    pub format: DocFormat,
    /// Relevance score; results are ordered by this value, descending.
    pub score: f64,
    /// Bounded window of text around the first matching term.
    pub excerpt: String,
}

/// Derive the stable document id from a relative path.
pub fn document_id(relative: &str) -> String {
    relative.replace(['/', '\\'], "_")
}

/// Format a nanosecond timestamp as ISO 8601.
pub fn format_ts_iso(nanos: i64) -> String {
    DateTime::from_timestamp_nanos(nanos)
        .format("%Y-%m-%dT%H:%M:%SZ")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(DocFormat::from_extension("MD"), DocFormat::Markdown);
        assert_eq!(DocFormat::from_extension("htm"), DocFormat::Html);
        assert_eq!(DocFormat::from_extension("txt"), DocFormat::Plain);
        assert_eq!(
            DocFormat::from_path(Path::new("/docs/guide/index.html")),
            DocFormat::Html
        );
        assert_eq!(DocFormat::from_path(Path::new("README")), DocFormat::Plain);
    }

    #[test]
    fn test_document_id() {
        assert_eq!(document_id("guide/setup.md"), "guide_setup.md");
        assert_eq!(document_id("a.md"), "a.md");
    }

    #[test]
    fn test_format_ts_iso() {
        assert_eq!(format_ts_iso(0), "1970-01-01T00:00:00Z");
        assert_eq!(format_ts_iso(1_700_000_000_000_000_000), "2023-11-14T22:13:20Z");
    }
}

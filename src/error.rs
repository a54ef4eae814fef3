//! Error kinds surfaced by the indexing and retrieval core.
//!
//! Every externally visible failure carries enough context (paths,
//! expected vs. actual fingerprints) for a caller to choose between
//! retrying, rebuilding the index, or reporting the failure to a user.

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Main error type for docs-harness operations.
#[derive(Error, Debug)]
pub enum DocsError {
    #[error("path not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("failed to read {}: {reason}", path.display())]
    Read { path: PathBuf, reason: String },

    #[error("no index loaded; build or load an index before searching")]
    NotIndexed,

    #[error("access denied: {} is outside {}", path.display(), root.display())]
    AccessDenied { path: PathBuf, root: PathBuf },

    #[error("index at {} is stale: expected fingerprint {expected}, corpus is {actual}", path.display())]
    StaleIndex {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("no matching documents under {}", root.display())]
    EmptyCorpus { root: PathBuf },

    #[error("index at {} is unusable: {reason}", path.display())]
    CorruptIndex { path: PathBuf, reason: String },

    #[error("invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for docs-harness operations.
pub type Result<T> = std::result::Result<T, DocsError>;

/// Stable, caller-facing classification of a [`DocsError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    ReadError,
    NotIndexed,
    AccessDenied,
    StaleIndex,
    EmptyCorpus,
    CorruptIndex,
    InvalidInput,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::ReadError => "read_error",
            ErrorKind::NotIndexed => "not_indexed",
            ErrorKind::AccessDenied => "access_denied",
            ErrorKind::StaleIndex => "stale_index",
            ErrorKind::EmptyCorpus => "empty_corpus",
            ErrorKind::CorruptIndex => "corrupt_index",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::Internal => "internal",
        }
    }
}

impl DocsError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DocsError::NotFound { .. } => ErrorKind::NotFound,
            DocsError::Read { .. } => ErrorKind::ReadError,
            DocsError::NotIndexed => ErrorKind::NotIndexed,
            DocsError::AccessDenied { .. } => ErrorKind::AccessDenied,
            DocsError::StaleIndex { .. } => ErrorKind::StaleIndex,
            DocsError::EmptyCorpus { .. } => ErrorKind::EmptyCorpus,
            DocsError::CorruptIndex { .. } => ErrorKind::CorruptIndex,
            DocsError::InvalidPattern { .. } => ErrorKind::InvalidInput,
            DocsError::Io(_) | DocsError::Serialization(_) => ErrorKind::Internal,
        }
    }

    /// Whether rebuilding the index from the corpus is the expected remedy.
    pub fn needs_rebuild(&self) -> bool {
        matches!(
            self,
            DocsError::NotIndexed | DocsError::StaleIndex { .. } | DocsError::CorruptIndex { .. }
        )
    }

    pub(crate) fn read(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        DocsError::Read {
            path: path.into(),
            reason: err.to_string(),
        }
    }
}

//! Tool adapter: the two operations exposed to an orchestration layer.
//!
//! [`DocsTool`] wraps a shared [`QueryEngine`] and offers exactly
//! `search_docs` and `read_doc`. Failures never escape as opaque faults;
//! every [`DocsError`] is translated into a [`ToolError`] carrying a stable
//! kind string and a human-readable message, which serializes as:
//!
//! ```json
//! { "error": { "kind": "access_denied", "message": "..." } }
//! ```
//!
//! `read_doc` only serves files under the corpus root. Requests are first
//! normalized lexically (so `..` cannot climb out), then canonicalized to
//! catch symlinks that point elsewhere. Indexed symlinks are served only
//! when the corpus is configured to follow them.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::{Config, RetrievalConfig};
use crate::error::{DocsError, ErrorKind};
use crate::extract;
use crate::models::{DocFormat, SearchResult};
use crate::search::QueryEngine;

pub const SEARCH_TOOL: &str = "search_docs";
pub const READ_TOOL: &str = "read_doc";

/// Caller-facing error payload.
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[error("{message}")]
pub struct ToolError {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ToolError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::InvalidInput,
            message: message.into(),
            details: None,
        }
    }

    /// `{ "error": { .. } }` envelope.
    pub fn to_value(&self) -> Value {
        json!({ "error": self })
    }
}

impl From<DocsError> for ToolError {
    fn from(err: DocsError) -> Self {
        let details = match &err {
            DocsError::StaleIndex {
                expected, actual, ..
            } => Some(json!({ "expected": expected, "actual": actual })),
            _ => None,
        };
        Self {
            kind: err.kind(),
            message: err.to_string(),
            details,
        }
    }
}

/// Descriptor of one tool, as listed to an agent.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadResponse {
    pub path: PathBuf,
    pub title: String,
    pub format: DocFormat,
    pub content: String,
}

/// Stateless facade over a [`QueryEngine`] and the corpus root.
#[derive(Debug, Clone)]
pub struct DocsTool {
    engine: Arc<QueryEngine>,
    root: PathBuf,
    default_limit: usize,
    max_limit: usize,
    follow_symlinks: bool,
}

impl DocsTool {
    pub fn new(
        engine: Arc<QueryEngine>,
        root: &Path,
        retrieval: &RetrievalConfig,
    ) -> Result<Self, DocsError> {
        let root = root.canonicalize().map_err(|_| DocsError::NotFound {
            path: root.to_path_buf(),
        })?;
        Ok(Self {
            engine,
            root,
            default_limit: retrieval.default_limit,
            max_limit: retrieval.max_limit,
            follow_symlinks: false,
        })
    }

    pub fn from_config(engine: Arc<QueryEngine>, config: &Config) -> Result<Self, DocsError> {
        Ok(Self::new(engine, &config.corpus.root, &config.retrieval)?
            .follow_symlinks(config.corpus.follow_symlinks))
    }

    /// Serve indexed documents that are symlinks to files outside the root.
    /// Matches the loader's `follow_symlinks` setting.
    pub fn follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Ranked search. `limit` defaults to the configured default and is
    /// capped at the configured maximum.
    pub fn search(&self, query: &str, limit: Option<usize>) -> Result<Vec<SearchResult>, ToolError> {
        let limit = limit.unwrap_or(self.default_limit).min(self.max_limit);
        Ok(self.engine.search(query, limit)?)
    }

    /// Return the raw content of a document under the corpus root.
    pub fn read(&self, path: &str) -> Result<ReadResponse, ToolError> {
        if path.trim().is_empty() {
            return Err(ToolError::invalid_input("path must not be empty"));
        }

        let requested = resolve_within(&self.root, Path::new(path))?;
        let canonical = requested.canonicalize().map_err(|_| DocsError::NotFound {
            path: requested.clone(),
        })?;

        let resolved = if canonical.starts_with(&self.root) {
            canonical
        } else if self.follow_symlinks && self.is_indexed(&requested) {
            // Links are part of the corpus when the loader follows them.
            requested
        } else {
            warn!(path = %canonical.display(), "read outside corpus root rejected");
            return Err(DocsError::AccessDenied {
                path: canonical,
                root: self.root.clone(),
            }
            .into());
        };

        if !resolved.is_file() {
            return Err(DocsError::NotFound { path: resolved }.into());
        }

        let bytes = std::fs::read(&resolved).map_err(|e| DocsError::read(&resolved, e))?;
        let content = String::from_utf8(bytes).map_err(|e| DocsError::read(&resolved, e))?;
        let format = DocFormat::from_path(&resolved);
        let title = extract::extract_title(&content, format, &resolved);
        debug!(path = %resolved.display(), bytes = content.len(), "document read");

        Ok(ReadResponse {
            path: resolved,
            title,
            format,
            content,
        })
    }

    fn is_indexed(&self, path: &Path) -> bool {
        self.engine
            .index()
            .map(|index| index.contains_path(path))
            .unwrap_or(false)
    }

    /// Descriptors for the two exposed tools.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        vec![
            ToolDefinition {
                name: SEARCH_TOOL,
                description: "Search the documentation corpus and return the most relevant documents with excerpts.",
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "query": { "type": "string", "description": "Search query" },
                        "max_results": {
                            "type": "integer",
                            "description": "Max results",
                            "default": self.default_limit,
                            "minimum": 1,
                            "maximum": self.max_limit
                        }
                    },
                    "required": ["query"]
                }),
            },
            ToolDefinition {
                name: READ_TOOL,
                description: "Read the full content of a document returned by search_docs.",
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "path": { "type": "string", "description": "Document path, absolute or relative to the corpus root" }
                    },
                    "required": ["path"]
                }),
            },
        ]
    }

    /// Dispatch a JSON tool call. Always answers with a JSON value; failures
    /// use the `{ "error": { .. } }` envelope.
    pub fn invoke(&self, name: &str, params: &Value) -> Value {
        let result = match name {
            SEARCH_TOOL => self.invoke_search(params),
            READ_TOOL => self.invoke_read(params),
            other => Err(ToolError::invalid_input(format!("unknown tool '{}'", other))),
        };
        match result {
            Ok(value) => value,
            Err(e) => {
                debug!(tool = name, kind = e.kind.as_str(), "tool call failed");
                e.to_value()
            }
        }
    }

    fn invoke_search(&self, params: &Value) -> Result<Value, ToolError> {
        let query = params["query"]
            .as_str()
            .ok_or_else(|| ToolError::invalid_input("query must be a string"))?;
        let limit = match &params["max_results"] {
            Value::Null => None,
            v => Some(
                v.as_u64()
                    .ok_or_else(|| ToolError::invalid_input("max_results must be a non-negative integer"))?
                    as usize,
            ),
        };
        let results = self.search(query, limit)?;
        Ok(json!({ "results": results }))
    }

    fn invoke_read(&self, params: &Value) -> Result<Value, ToolError> {
        let path = params["path"]
            .as_str()
            .ok_or_else(|| ToolError::invalid_input("path must be a string"))?;
        let doc = self.read(path)?;
        serde_json::to_value(doc).map_err(|e| DocsError::from(e).into())
    }
}

/// Join `requested` onto `root` and fold `.`/`..` components without
/// touching the filesystem. Fails with [`DocsError::AccessDenied`] if the
/// result is not under `root`.
pub fn resolve_within(root: &Path, requested: &Path) -> Result<PathBuf, DocsError> {
    let joined = if requested.is_absolute() {
        requested.to_path_buf()
    } else {
        root.join(requested)
    };

    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::ParentDir => {
                normalized.pop();
            }
            Component::CurDir => {}
            other => normalized.push(other.as_os_str()),
        }
    }

    if normalized.starts_with(root) {
        Ok(normalized)
    } else {
        Err(DocsError::AccessDenied {
            path: normalized,
            root: root.to_path_buf(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::Analyzer;
    use crate::builder::IndexBuilder;
    use crate::loader::DocumentLoader;
    use std::fs;
    use tempfile::TempDir;

    fn setup() -> (TempDir, DocsTool) {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("docs");
        fs::create_dir_all(root.join("guide")).unwrap();
        fs::write(root.join("a.md"), "# Lambda\n\nAWS Lambda functions scale automatically").unwrap();
        fs::write(root.join("b.md"), "Python virtual environments isolate dependencies.").unwrap();
        fs::write(root.join("guide/setup.txt"), "install steps").unwrap();
        fs::write(tmp.path().join("secret.md"), "outside the corpus").unwrap();

        let loader = DocumentLoader::new(&root, &["md".to_string(), "txt".to_string()]).unwrap();
        let outcome = IndexBuilder::new(Analyzer::default())
            .build_from_loader(&loader)
            .unwrap();
        let engine = Arc::new(QueryEngine::new());
        engine.publish(outcome.index);

        let tool = DocsTool::new(engine, &root, &RetrievalConfig::default()).unwrap();
        (tmp, tool)
    }

    #[test]
    fn test_resolve_within_rejects_traversal() {
        let root = Path::new("/tmp/docs");
        assert_eq!(
            resolve_within(root, Path::new("guide/../a.md")).unwrap(),
            PathBuf::from("/tmp/docs/a.md")
        );
        assert!(matches!(
            resolve_within(root, Path::new("../../etc/passwd")),
            Err(DocsError::AccessDenied { .. })
        ));
        assert!(matches!(
            resolve_within(root, Path::new("/etc/passwd")),
            Err(DocsError::AccessDenied { .. })
        ));
        // Sibling directory sharing the prefix string.
        assert!(resolve_within(root, Path::new("/tmp/docs-private/x.md")).is_err());
    }

    #[test]
    fn test_search_uses_default_and_max_limit() {
        let (_tmp, tool) = setup();
        let results = tool.search("AWS scaling", None).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "a.md");
        assert_eq!(results[0].title, "Lambda");
        assert!(tool.search("lambda", Some(1000)).unwrap().len() <= 50);
    }

    #[test]
    fn test_read_relative_and_absolute() {
        let (_tmp, tool) = setup();
        let doc = tool.read("guide/setup.txt").unwrap();
        assert_eq!(doc.content, "install steps");
        assert_eq!(doc.format, DocFormat::Plain);

        let hit = &tool.search("lambda", None).unwrap()[0];
        let doc = tool.read(&hit.path.to_string_lossy()).unwrap();
        assert_eq!(doc.title, "Lambda");
        assert!(doc.content.contains("scale automatically"));
    }

    #[test]
    fn test_read_outside_root_is_denied() {
        let (_tmp, tool) = setup();
        let err = tool.read("../../etc/passwd").unwrap_err();
        assert_eq!(err.kind, ErrorKind::AccessDenied);
        let err = tool.read("../secret.md").unwrap_err();
        assert_eq!(err.kind, ErrorKind::AccessDenied);
    }

    #[cfg(unix)]
    #[test]
    fn test_read_symlink_escape_is_denied() {
        let (tmp, tool) = setup();
        std::os::unix::fs::symlink(tmp.path().join("secret.md"), tool.root().join("link.md")).unwrap();
        let err = tool.read("link.md").unwrap_err();
        assert_eq!(err.kind, ErrorKind::AccessDenied);
    }

    #[cfg(unix)]
    #[test]
    fn test_read_indexed_file_swapped_for_symlink_is_denied() {
        let (tmp, tool) = setup();
        let indexed = tool.root().join("a.md");
        assert!(tool.read("a.md").is_ok());

        fs::remove_file(&indexed).unwrap();
        std::os::unix::fs::symlink(tmp.path().join("secret.md"), &indexed).unwrap();

        let err = tool.read("a.md").unwrap_err();
        assert_eq!(err.kind, ErrorKind::AccessDenied);
        let err = tool.read(&indexed.to_string_lossy()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::AccessDenied);
    }

    #[cfg(unix)]
    #[test]
    fn test_read_indexed_symlink_allowed_when_following_links() {
        let (tmp, tool) = setup();
        let tool = tool.follow_symlinks(true);
        let indexed = tool.root().join("a.md");
        fs::remove_file(&indexed).unwrap();
        std::os::unix::fs::symlink(tmp.path().join("secret.md"), &indexed).unwrap();

        assert_eq!(tool.read("a.md").unwrap().content, "outside the corpus");
        let err = tool.read("../secret.md").unwrap_err();
        assert_eq!(err.kind, ErrorKind::AccessDenied);
    }

    #[test]
    fn test_read_missing_file() {
        let (_tmp, tool) = setup();
        let err = tool.read("nope.md").unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
        assert_eq!(tool.read("  ").unwrap_err().kind, ErrorKind::InvalidInput);
    }

    #[test]
    fn test_invoke_dispatch() {
        let (_tmp, tool) = setup();
        let value = tool.invoke(SEARCH_TOOL, &json!({ "query": "python", "max_results": 3 }));
        assert_eq!(value["results"][0]["id"], "b.md");

        let value = tool.invoke(READ_TOOL, &json!({ "path": "a.md" }));
        assert_eq!(value["title"], "Lambda");

        let value = tool.invoke(READ_TOOL, &json!({ "path": "../../etc/passwd" }));
        assert_eq!(value["error"]["kind"], "access_denied");
        assert!(value["error"]["message"].is_string());

        let value = tool.invoke("delete_everything", &json!({}));
        assert_eq!(value["error"]["kind"], "invalid_input");

        let value = tool.invoke(SEARCH_TOOL, &json!({ "max_results": 3 }));
        assert_eq!(value["error"]["kind"], "invalid_input");
    }

    #[test]
    fn test_unindexed_engine_reports_not_indexed() {
        let tmp = TempDir::new().unwrap();
        let tool = DocsTool::new(
            Arc::new(QueryEngine::new()),
            tmp.path(),
            &RetrievalConfig::default(),
        )
        .unwrap();
        let value = tool.invoke(SEARCH_TOOL, &json!({ "query": "anything" }));
        assert_eq!(value["error"]["kind"], "not_indexed");
    }

    #[test]
    fn test_stale_error_carries_details() {
        let err = ToolError::from(DocsError::StaleIndex {
            path: PathBuf::from("/data/index.json"),
            expected: "aaa".to_string(),
            actual: "bbb".to_string(),
        });
        assert_eq!(err.kind, ErrorKind::StaleIndex);
        assert_eq!(err.details, Some(json!({ "expected": "aaa", "actual": "bbb" })));
    }

    #[test]
    fn test_definitions() {
        let (_tmp, tool) = setup();
        let defs = tool.definitions();
        let names: Vec<&str> = defs.iter().map(|d| d.name).collect();
        assert_eq!(names, vec![SEARCH_TOOL, READ_TOOL]);
        assert_eq!(defs[0].parameters["properties"]["max_results"]["default"], 5);
        assert_eq!(defs[1].parameters["required"], json!(["path"]));
    }
}

//! Index lifecycle orchestration.
//!
//! Coordinates discovery → build or update → persistence, and brings a
//! [`QueryEngine`] to the `Ready` state before its first query:
//!
//! - a persisted snapshot whose fingerprint matches the corpus and whose
//!   analyzer settings match the configuration is loaded as-is;
//! - a stale snapshot seeds an incremental update;
//! - otherwise the corpus is fully indexed.
//!
//! When `index.path` is configured the resulting generation is saved.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::builder::{BuildOutcome, BuildReport, IndexBuilder};
use crate::config::Config;
use crate::error::{DocsError, Result};
use crate::index::Index;
use crate::loader::DocumentLoader;
use crate::models::SourceFile;
use crate::search::QueryEngine;
use crate::store::{self, IndexStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexMode {
    /// Rebuild every document from scratch.
    Full,
    /// Reuse unchanged documents from the persisted snapshot, if any.
    Incremental,
}

/// How the serving index of an [`OpenedEngine`] was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexSource {
    Loaded,
    Built,
    Updated,
}

#[derive(Debug)]
pub struct OpenedEngine {
    pub engine: Arc<QueryEngine>,
    pub source: IndexSource,
    /// Present when the index was built or updated.
    pub report: Option<BuildReport>,
}

/// Index the configured corpus and persist the result when an index path
/// is configured.
pub async fn run_index(config: &Config, mode: IndexMode) -> Result<BuildOutcome> {
    let loader = DocumentLoader::from_config(&config.corpus)?;
    let files = loader.discover()?;
    let store = config.index.path.as_ref().map(IndexStore::new);

    let previous = match (mode, &store) {
        (IndexMode::Incremental, Some(store)) => read_previous(store),
        _ => None,
    };

    let outcome = index_files(config, loader.root(), files, previous.as_ref()).await?;
    if let Some(store) = &store {
        store.save(&outcome.index)?;
    }
    Ok(outcome)
}

/// Produce a ready [`QueryEngine`] for the configured corpus.
///
/// Loads a current snapshot, updates a stale one, or builds from scratch.
pub async fn open_engine(config: &Config) -> Result<OpenedEngine> {
    let loader = DocumentLoader::from_config(&config.corpus)?;
    let files = loader.discover()?;
    let engine = Arc::new(QueryEngine::from_config(&config.retrieval));

    let Some(path) = &config.index.path else {
        let outcome = index_files(config, loader.root(), files, None).await?;
        engine.publish(outcome.index);
        return Ok(OpenedEngine {
            engine,
            source: IndexSource::Built,
            report: Some(outcome.report),
        });
    };

    let store = IndexStore::new(path);
    let current = store::fingerprint_files(loader.root(), &files);

    let previous = match store.load(&current) {
        Ok(index) if index.analyzer_config() != &config.analyzer => {
            info!(
                path = %store.path().display(),
                "analyzer settings changed, rebuilding index"
            );
            None
        }
        Ok(index) => {
            info!(
                path = %store.path().display(),
                documents = index.doc_count(),
                generation = index.generation(),
                "loaded current index snapshot"
            );
            engine.publish(index);
            return Ok(OpenedEngine {
                engine,
                source: IndexSource::Loaded,
                report: None,
            });
        }
        Err(DocsError::StaleIndex { .. }) => {
            info!(path = %store.path().display(), "index snapshot is stale, updating");
            read_previous(&store)
        }
        Err(DocsError::NotFound { .. }) => None,
        Err(e) if e.needs_rebuild() => {
            warn!(path = %store.path().display(), error = %e, "discarding index snapshot");
            None
        }
        Err(e) => return Err(e),
    };

    let source = if previous.is_some() {
        IndexSource::Updated
    } else {
        IndexSource::Built
    };
    let outcome = index_files(config, loader.root(), files, previous.as_ref()).await?;
    store.save(&outcome.index)?;
    engine.publish(outcome.index);

    Ok(OpenedEngine {
        engine,
        source,
        report: Some(outcome.report),
    })
}

async fn index_files(
    config: &Config,
    root: &Path,
    files: Vec<SourceFile>,
    previous: Option<&Index>,
) -> Result<BuildOutcome> {
    let builder = IndexBuilder::from_config(config);
    match previous {
        Some(previous) => builder.update(previous, root, files).await,
        None => builder.build_concurrent(root, files).await,
    }
}

fn read_previous(store: &IndexStore) -> Option<Index> {
    match store.read() {
        Ok(index) => Some(index),
        Err(DocsError::NotFound { .. }) => None,
        Err(e) => {
            warn!(path = %store.path().display(), error = %e, "ignoring unusable index snapshot");
            None
        }
    }
}

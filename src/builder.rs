//! Index construction: full rebuilds and incremental updates.
//!
//! File reads and analysis may fan out across blocking worker tasks,
//! bounded by a semaphore. Workers only produce per-document term counts;
//! merging them into the postings map happens serially, in discovery
//! order, so document ids and posting lists are identical no matter how
//! the workers were scheduled.
//!
//! # Incremental update
//!
//! 1. Discover the current file set.
//! 2. Files whose path, mtime, and size match a document of the previous
//!    generation reuse that document's term counts from its postings.
//! 3. New and modified files are read and analyzed.
//! 4. Documents no longer present are dropped.
//! 5. Everything is merged into a fresh index with the next generation
//!    number. The previous index is left untouched.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::analyzer::Analyzer;
use crate::config::Config;
use crate::error::{DocsError, Result};
use crate::index::{DocEntry, DocId, Index, Posting};
use crate::loader::{read_document, DocumentLoader};
use crate::models::{Document, SourceFile};
use crate::store;

/// A file left out of the index because it could not be read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

/// Summary of one build or update.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildReport {
    /// Documents in the resulting index.
    pub indexed: usize,
    /// Documents read and analyzed during this pass.
    pub analyzed: usize,
    /// Documents carried over unchanged from the previous generation.
    pub reused: usize,
    /// Documents of the previous generation no longer in the corpus.
    pub removed: usize,
    pub skipped: Vec<SkippedFile>,
    pub elapsed_ms: u64,
}

/// A freshly built index together with its build report.
#[derive(Debug, Clone)]
pub struct BuildOutcome {
    pub index: Index,
    pub report: BuildReport,
}

/// Builds [`Index`] generations from corpus documents.
#[derive(Debug, Clone)]
pub struct IndexBuilder {
    analyzer: Analyzer,
    concurrency: usize,
}

struct AnalyzedDoc {
    entry: DocEntry,
    terms: HashMap<String, u32>,
}

fn analyze_document(analyzer: &Analyzer, doc: Document) -> AnalyzedDoc {
    let terms = analyzer.term_frequencies(&doc.text);
    AnalyzedDoc {
        entry: DocEntry {
            id: doc.id,
            path: doc.path,
            relative: doc.relative,
            format: doc.format,
            title: doc.title,
            byte_len: doc.byte_len,
            modified: doc.modified,
            token_count: 0,
        },
        terms,
    }
}

enum Slot {
    Reuse(DocId),
    Analyze,
}

impl IndexBuilder {
    pub fn new(analyzer: Analyzer) -> Self {
        Self {
            analyzer,
            concurrency: 8,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(Analyzer::new(config.analyzer.clone())).with_concurrency(config.index.concurrency)
    }

    /// Maximum number of files read at once by the concurrent paths.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn analyzer(&self) -> &Analyzer {
        &self.analyzer
    }

    /// Full rebuild from already loaded documents.
    ///
    /// Document ids follow iteration order. Fails with
    /// [`DocsError::EmptyCorpus`] when `documents` is empty.
    pub fn build<I>(&self, root: &Path, documents: I) -> Result<BuildOutcome>
    where
        I: IntoIterator<Item = Document>,
    {
        let started = Instant::now();
        let mut acc = Accumulator::default();
        for doc in documents {
            let analyzed = analyze_document(&self.analyzer, doc);
            acc.push(analyzed.entry, analyzed.terms);
        }

        let report = BuildReport {
            analyzed: acc.docs.len(),
            ..Default::default()
        };
        self.finish(acc, root, 1, report, started)
    }

    /// Full rebuild streaming documents from `loader` one at a time.
    ///
    /// Unreadable files are recorded in the report and skipped.
    pub fn build_from_loader(&self, loader: &DocumentLoader) -> Result<BuildOutcome> {
        let started = Instant::now();
        let mut acc = Accumulator::default();
        let mut skipped = Vec::new();

        for result in loader.load()? {
            match result {
                Ok(doc) => {
                    let analyzed = analyze_document(&self.analyzer, doc);
                    acc.push(analyzed.entry, analyzed.terms);
                }
                Err(e) => skipped.push(skipped_file(e)),
            }
        }

        let report = BuildReport {
            analyzed: acc.docs.len(),
            skipped,
            ..Default::default()
        };
        self.finish(acc, loader.root(), 1, report, started)
    }

    /// Full rebuild reading `files` concurrently (bounded by the configured
    /// concurrency) and merging in discovery order.
    pub async fn build_concurrent(&self, root: &Path, files: Vec<SourceFile>) -> Result<BuildOutcome> {
        let started = Instant::now();
        let total = files.len();
        let mut results = self
            .analyze_files(files.into_iter().enumerate().collect(), total)
            .await?;

        let mut acc = Accumulator::default();
        let mut skipped = Vec::new();
        for slot in results.iter_mut() {
            match slot.take() {
                Some(Ok(analyzed)) => acc.push(analyzed.entry, analyzed.terms),
                Some(Err(e)) => skipped.push(skipped_file(e)),
                None => {}
            }
        }

        let report = BuildReport {
            analyzed: acc.docs.len(),
            skipped,
            ..Default::default()
        };
        self.finish(acc, root, 1, report, started)
    }

    /// Produce the next generation from `previous`, re-reading only files
    /// that are new or whose mtime or size changed.
    ///
    /// Falls back to a full rebuild when the root or analyzer settings
    /// differ from those `previous` was built with.
    pub async fn update(
        &self,
        previous: &Index,
        root: &Path,
        files: Vec<SourceFile>,
    ) -> Result<BuildOutcome> {
        if previous.root() != root || previous.analyzer_config() != self.analyzer.config() {
            info!(
                previous_root = %previous.root().display(),
                root = %root.display(),
                "index settings changed, rebuilding from scratch"
            );
            return self.build_concurrent(root, files).await;
        }

        let started = Instant::now();
        let by_path: HashMap<&str, DocId> = previous
            .docs()
            .iter()
            .enumerate()
            .map(|(i, d)| (d.relative.as_str(), i as DocId))
            .collect();

        let discovered: HashSet<&str> = files.iter().map(|f| f.relative.as_str()).collect();
        let removed = previous
            .docs()
            .iter()
            .filter(|d| !discovered.contains(d.relative.as_str()))
            .count();

        let mut plan = Vec::with_capacity(files.len());
        let mut to_analyze = Vec::new();
        for (pos, file) in files.iter().enumerate() {
            let unchanged = by_path.get(file.relative.as_str()).and_then(|&id| {
                let entry = previous.doc(id)?;
                (entry.modified == file.modified && entry.byte_len == file.byte_len).then_some(id)
            });
            match unchanged {
                Some(id) => plan.push(Slot::Reuse(id)),
                None => {
                    plan.push(Slot::Analyze);
                    to_analyze.push((pos, file.clone()));
                }
            }
        }

        let total = plan.len();
        let mut results = self.analyze_files(to_analyze, total).await?;
        let previous_terms = previous.terms_by_doc();

        let mut acc = Accumulator::default();
        let mut report = BuildReport {
            removed,
            ..Default::default()
        };
        for (pos, slot) in plan.into_iter().enumerate() {
            match slot {
                Slot::Reuse(id) => {
                    if let (Some(entry), Some(terms)) =
                        (previous.doc(id), previous_terms.get(id as usize))
                    {
                        acc.push(entry.clone(), terms.iter().copied());
                        report.reused += 1;
                    }
                }
                Slot::Analyze => match results[pos].take() {
                    Some(Ok(analyzed)) => {
                        acc.push(analyzed.entry, analyzed.terms);
                        report.analyzed += 1;
                    }
                    Some(Err(e)) => report.skipped.push(skipped_file(e)),
                    None => {}
                },
            }
        }

        self.finish(acc, root, previous.generation() + 1, report, started)
    }

    /// Read and analyze `files` on blocking worker tasks. The returned
    /// vector has `slots` entries; entry `pos` holds the outcome for the
    /// file submitted at `pos`.
    async fn analyze_files(
        &self,
        files: Vec<(usize, SourceFile)>,
        slots: usize,
    ) -> Result<Vec<Option<Result<AnalyzedDoc>>>> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut set = JoinSet::new();

        for (pos, file) in files {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| DocsError::Io(std::io::Error::other(e)))?;
            let analyzer = self.analyzer.clone();
            set.spawn_blocking(move || {
                let _permit = permit;
                let result = read_document(file).map(|doc| analyze_document(&analyzer, doc));
                (pos, result)
            });
        }

        let mut results: Vec<Option<Result<AnalyzedDoc>>> = (0..slots).map(|_| None).collect();
        while let Some(joined) = set.join_next().await {
            let (pos, result) = joined.map_err(|e| DocsError::Io(std::io::Error::other(e)))?;
            if let Some(slot) = results.get_mut(pos) {
                *slot = Some(result);
            }
        }
        Ok(results)
    }

    fn finish(
        &self,
        acc: Accumulator,
        root: &Path,
        generation: u64,
        mut report: BuildReport,
        started: Instant,
    ) -> Result<BuildOutcome> {
        for s in &report.skipped {
            warn!(path = %s.path.display(), reason = %s.reason, "file skipped");
        }

        if acc.docs.is_empty() {
            return Err(DocsError::EmptyCorpus {
                root: root.to_path_buf(),
            });
        }

        let fingerprint = store::fingerprint(
            root,
            acc.docs.iter().map(|d| (d.relative.as_str(), d.modified)),
        );

        let index = Index {
            root: root.to_path_buf(),
            analyzer: self.analyzer.config().clone(),
            fingerprint,
            generation,
            built_at: Utc::now(),
            docs: acc.docs,
            postings: acc.postings,
            total_tokens: acc.total_tokens,
        };
        debug_assert_eq!(index.verify(), Ok(()));

        report.indexed = index.doc_count();
        report.elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        info!(
            root = %root.display(),
            generation,
            documents = report.indexed,
            analyzed = report.analyzed,
            reused = report.reused,
            removed = report.removed,
            skipped = report.skipped.len(),
            terms = index.term_count(),
            elapsed_ms = report.elapsed_ms,
            "index built"
        );

        Ok(BuildOutcome { index, report })
    }
}

fn skipped_file(err: DocsError) -> SkippedFile {
    match err {
        DocsError::Read { path, reason } => SkippedFile { path, reason },
        DocsError::NotFound { path } => SkippedFile {
            path,
            reason: "file disappeared".to_string(),
        },
        other => SkippedFile {
            path: PathBuf::new(),
            reason: other.to_string(),
        },
    }
}

/// Serial merge target for per-document term counts.
#[derive(Default)]
struct Accumulator {
    docs: Vec<DocEntry>,
    postings: BTreeMap<String, Vec<Posting>>,
    total_tokens: u64,
}

impl Accumulator {
    fn push<K, I>(&mut self, mut entry: DocEntry, terms: I)
    where
        K: AsRef<str>,
        I: IntoIterator<Item = (K, u32)>,
    {
        let doc = self.docs.len() as DocId;
        let mut count = 0u64;
        for (term, tf) in terms {
            if tf == 0 {
                continue;
            }
            let posting = Posting { doc, tf };
            match self.postings.get_mut(term.as_ref()) {
                Some(list) => list.push(posting),
                None => {
                    self.postings.insert(term.as_ref().to_string(), vec![posting]);
                }
            }
            count += tf as u64;
        }

        debug!(path = %entry.path.display(), tokens = count, "document merged");
        entry.token_count = u32::try_from(count).unwrap_or(u32::MAX);
        self.total_tokens += count;
        self.docs.push(entry);
    }
}

//! Inverted index data structure.
//!
//! An [`Index`] maps each term to its posting list (documents containing
//! the term, with in-document frequency) and keeps per-document metadata
//! including total token counts for length-normalized scoring.
//!
//! Document ids are positions in discovery order, so posting lists are
//! sorted by id and ties in ranking resolve to discovery order.
//!
//! An index is derived data. It is produced by
//! [`IndexBuilder`](crate::builder::IndexBuilder) and never mutated in place:
//! every rebuild or incremental update yields a new generation.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analyzer::AnalyzerConfig;
use crate::models::DocFormat;

/// Position of a document in discovery order.
pub type DocId = u32;

/// A term's occurrence in one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub doc: DocId,
    /// Term frequency within the document.
    pub tf: u32,
}

/// Per-document metadata retained by the index.
///
/// The document text itself is not kept; excerpts are re-read from disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocEntry {
    pub id: String,
    pub path: PathBuf,
    pub relative: String,
    pub format: DocFormat,
    pub title: String,
    pub byte_len: u64,
    /// Modification time in nanoseconds since the Unix epoch.
    pub modified: i64,
    /// Number of analyzed terms in the document.
    pub token_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Index {
    pub(crate) root: PathBuf,
    pub(crate) analyzer: AnalyzerConfig,
    pub(crate) fingerprint: String,
    pub(crate) generation: u64,
    pub(crate) built_at: DateTime<Utc>,
    pub(crate) docs: Vec<DocEntry>,
    pub(crate) postings: BTreeMap<String, Vec<Posting>>,
    pub(crate) total_tokens: u64,
}

impl Index {
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Analyzer settings the index was built with; queries must use the same.
    pub fn analyzer_config(&self) -> &AnalyzerConfig {
        &self.analyzer
    }

    /// Digest over the corpus root and each document's path and mtime.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    pub fn docs(&self) -> &[DocEntry] {
        &self.docs
    }

    pub fn doc(&self, id: DocId) -> Option<&DocEntry> {
        self.docs.get(id as usize)
    }

    pub fn doc_count(&self) -> usize {
        self.docs.len()
    }

    pub fn term_count(&self) -> usize {
        self.postings.len()
    }

    pub fn total_tokens(&self) -> u64 {
        self.total_tokens
    }

    /// Average analyzed length of a document in the corpus.
    pub fn avg_doc_len(&self) -> f64 {
        if self.docs.is_empty() {
            0.0
        } else {
            self.total_tokens as f64 / self.docs.len() as f64
        }
    }

    /// Posting list for `term` (empty if the term is not indexed).
    pub fn postings(&self, term: &str) -> &[Posting] {
        self.postings.get(term).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of documents containing `term`.
    pub fn doc_freq(&self, term: &str) -> usize {
        self.postings(term).len()
    }

    pub fn find_by_path(&self, path: &Path) -> Option<(DocId, &DocEntry)> {
        self.docs
            .iter()
            .enumerate()
            .find(|(_, d)| d.path == path)
            .map(|(i, d)| (i as DocId, d))
    }

    pub fn contains_path(&self, path: &Path) -> bool {
        self.find_by_path(path).is_some()
    }

    /// Most frequent terms of a document, by frequency then term.
    pub fn top_terms(&self, doc: DocId, n: usize) -> Vec<(&str, u32)> {
        let mut terms: Vec<(&str, u32)> = self
            .postings
            .iter()
            .filter_map(|(term, list)| {
                list.binary_search_by_key(&doc, |p| p.doc)
                    .ok()
                    .map(|i| (term.as_str(), list[i].tf))
            })
            .collect();
        terms.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
        terms.truncate(n);
        terms
    }

    /// Regroup postings by document: `result[doc]` lists that document's
    /// terms with frequencies. Used to carry unchanged documents into the
    /// next generation without re-reading them.
    pub fn terms_by_doc(&self) -> Vec<Vec<(&str, u32)>> {
        let mut by_doc: Vec<Vec<(&str, u32)>> = vec![Vec::new(); self.docs.len()];
        for (term, list) in &self.postings {
            for p in list {
                if let Some(terms) = by_doc.get_mut(p.doc as usize) {
                    terms.push((term.as_str(), p.tf));
                }
            }
        }
        by_doc
    }

    /// Check structural invariants: posting lists are non-empty, sorted by
    /// document and in range, and each document's term frequencies sum to
    /// its token count.
    pub fn verify(&self) -> std::result::Result<(), String> {
        let mut sums: HashMap<DocId, u64> = HashMap::new();

        for (term, list) in &self.postings {
            if list.is_empty() {
                return Err(format!("empty posting list for term '{}'", term));
            }
            for pair in list.windows(2) {
                if pair[0].doc >= pair[1].doc {
                    return Err(format!("posting list for '{}' is not sorted", term));
                }
            }
            for p in list {
                if p.doc as usize >= self.docs.len() {
                    return Err(format!(
                        "posting for '{}' references unknown document {}",
                        term, p.doc
                    ));
                }
                if p.tf == 0 {
                    return Err(format!("zero frequency posting for '{}'", term));
                }
                *sums.entry(p.doc).or_insert(0) += p.tf as u64;
            }
        }

        let mut total = 0u64;
        for (i, doc) in self.docs.iter().enumerate() {
            let sum = sums.get(&(i as DocId)).copied().unwrap_or(0);
            if sum != doc.token_count as u64 {
                return Err(format!(
                    "document {} has token_count {} but postings sum to {}",
                    doc.relative, doc.token_count, sum
                ));
            }
            total += sum;
        }
        if total != self.total_tokens {
            return Err(format!(
                "total_tokens {} does not match postings sum {}",
                self.total_tokens, total
            ));
        }

        Ok(())
    }
}

//! Query engine: ranking and excerpt generation over a published [`Index`].
//!
//! # Scoring
//!
//! For each distinct query term `t` present in document `d`:
//!
//! ```text
//! weight(t, d) = tf(t, d) × ln(1 + N / df(t)) / ((1 - b) + b × len(d) / avg_len)
//! ```
//!
//! where `N` is the number of documents, `df(t)` the number of documents
//! containing `t`, and `b = 0.75`. A document's score is the sum of its
//! term weights. The candidate set is the union of the posting lists of
//! all query terms and every candidate is scored before ranking, so a
//! document is returned only if it contains at least one query term.
//!
//! Results are sorted by score (desc), then discovery order (asc), and
//! truncated to the requested limit.
//!
//! # States
//!
//! A [`QueryEngine`] starts `Unindexed` and answers every search with
//! [`DocsError::NotIndexed`]. [`QueryEngine::publish`] moves it to `Ready`.
//! Publishing a new generation swaps an `Arc` under a short write lock;
//! in-flight searches keep the generation they started with.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, warn};

use crate::analyzer::Analyzer;
use crate::config::RetrievalConfig;
use crate::error::{DocsError, Result};
use crate::extract;
use crate::index::{DocEntry, DocId, Index};
use crate::models::SearchResult;

/// Length normalization strength.
pub const LENGTH_NORM_B: f64 = 0.75;

/// Default excerpt window, in characters.
pub const DEFAULT_EXCERPT_CHARS: usize = 200;

/// Serving state of a [`QueryEngine`].
#[derive(Debug, Clone)]
pub enum EngineState {
    Unindexed,
    Ready(Arc<Index>),
}

/// Serves ranked queries against the currently published index.
#[derive(Debug)]
pub struct QueryEngine {
    state: RwLock<EngineState>,
    excerpt_chars: usize,
}

impl Default for QueryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryEngine {
    pub fn new() -> Self {
        Self::with_excerpt_chars(DEFAULT_EXCERPT_CHARS)
    }

    pub fn with_excerpt_chars(excerpt_chars: usize) -> Self {
        Self {
            state: RwLock::new(EngineState::Unindexed),
            excerpt_chars,
        }
    }

    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self::with_excerpt_chars(config.excerpt_chars)
    }

    /// Publish `index` as the serving generation, replacing any previous one.
    pub fn publish(&self, index: Index) -> Arc<Index> {
        let index = Arc::new(index);
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        *state = EngineState::Ready(index.clone());
        debug!(
            generation = index.generation(),
            documents = index.doc_count(),
            "index published"
        );
        index
    }

    pub fn state(&self) -> EngineState {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state(), EngineState::Ready(_))
    }

    /// The serving index, or [`DocsError::NotIndexed`].
    pub fn index(&self) -> Result<Arc<Index>> {
        match self.state() {
            EngineState::Ready(index) => Ok(index),
            EngineState::Unindexed => Err(DocsError::NotIndexed),
        }
    }

    /// Rank documents for `query` and return at most `limit` results with
    /// excerpts. An empty (or all stop-word) query yields no results.
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>> {
        let index = self.index()?;
        let analyzer = Analyzer::new(index.analyzer_config().clone());
        let terms = query_terms(&analyzer, query);
        if terms.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let ranked = rank(&index, &terms, limit);
        debug!(query, terms = terms.len(), hits = ranked.len(), "search");

        let term_set: HashSet<&str> = terms.iter().map(String::as_str).collect();
        let results = ranked
            .into_iter()
            .filter_map(|(id, score)| {
                let entry = index.doc(id)?;
                Some(SearchResult {
                    id: entry.id.clone(),
                    path: entry.path.clone(),
                    title: entry.title.clone(),
                    format: entry.format,
                    score,
                    excerpt: load_excerpt(&analyzer, entry, &term_set, self.excerpt_chars),
                })
            })
            .collect();

        Ok(results)
    }
}

/// Distinct analyzed query terms, in query order.
pub fn query_terms(analyzer: &Analyzer, query: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    analyzer
        .analyze(query)
        .into_iter()
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

/// Score every document sharing at least one term with `terms` and return
/// the top `limit` as `(doc, score)`, best first.
pub fn rank(index: &Index, terms: &[String], limit: usize) -> Vec<(DocId, f64)> {
    let n = index.doc_count() as f64;
    let avg_len = index.avg_doc_len().max(1.0);
    let mut scores: HashMap<DocId, f64> = HashMap::new();

    for term in terms {
        let postings = index.postings(term);
        if postings.is_empty() {
            continue;
        }
        let idf = (1.0 + n / postings.len() as f64).ln();
        for p in postings {
            let len = index
                .doc(p.doc)
                .map(|d| d.token_count as f64)
                .unwrap_or(avg_len);
            let norm = (1.0 - LENGTH_NORM_B) + LENGTH_NORM_B * len / avg_len;
            *scores.entry(p.doc).or_insert(0.0) += p.tf as f64 * idf / norm;
        }
    }

    let mut ranked: Vec<(DocId, f64)> = scores.into_iter().collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    ranked.truncate(limit);
    ranked
}

/// Re-read a document from disk and cut an excerpt around the first query
/// term. Falls back to the document's opening text when no term is found
/// (the file changed since indexing) and to an empty string when the file
/// can no longer be read.
fn load_excerpt(
    analyzer: &Analyzer,
    entry: &DocEntry,
    terms: &HashSet<&str>,
    max_chars: usize,
) -> String {
    let raw = match std::fs::read_to_string(&entry.path) {
        Ok(raw) => raw,
        Err(e) => {
            warn!(path = %entry.path.display(), error = %e, "excerpt source unreadable");
            return String::new();
        }
    };
    let text = extract::normalize(&raw, entry.format);
    excerpt(analyzer, &text, terms, max_chars)
}

/// Bounded window of `text` (about `max_chars` characters) around the first
/// token whose term is in `terms`. Cut edges are marked with `...`.
pub fn excerpt(analyzer: &Analyzer, text: &str, terms: &HashSet<&str>, max_chars: usize) -> String {
    let anchor = analyzer
        .analyze_with_offsets(text)
        .into_iter()
        .find(|t| terms.contains(t.term.as_str()))
        .map(|t| t.start)
        .unwrap_or(0);

    let char_starts: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    let total = char_starts.len();
    if total <= max_chars {
        return single_line(text);
    }

    let anchor_char = char_starts.partition_point(|&i| i < anchor);
    let mut start_char = anchor_char.saturating_sub(max_chars / 2);
    let end_char = (start_char + max_chars).min(total);
    if end_char == total {
        start_char = total - max_chars;
    }

    let mut start = char_starts[start_char];
    let mut end = char_starts.get(end_char).copied().unwrap_or(text.len());

    // Avoid cutting words at either edge when a space is close enough.
    if start > 0 {
        if let Some((ws, c)) = text[start..anchor.max(start)]
            .char_indices()
            .find(|(_, c)| c.is_whitespace())
        {
            start += ws + c.len_utf8();
        }
    }
    if end < text.len() {
        if let Some(ws) = text[anchor.min(end)..end].rfind(char::is_whitespace) {
            let candidate = anchor.min(end) + ws;
            if candidate > anchor {
                end = candidate;
            }
        }
    }

    let mut out = String::with_capacity(end - start + 6);
    if start > 0 {
        out.push_str("...");
    }
    out.push_str(text[start..end].trim());
    if end < text.len() {
        out.push_str("...");
    }
    single_line(&out)
}

/// Collapse every whitespace run (newlines included) to one space.
fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::IndexBuilder;
    use crate::models::{DocFormat, Document};
    use std::path::{Path, PathBuf};

    fn doc(relative: &str, text: &str) -> Document {
        Document {
            id: relative.to_string(),
            path: PathBuf::from("/nonexistent-corpus").join(relative),
            relative: relative.to_string(),
            format: DocFormat::Markdown,
            title: relative.to_string(),
            byte_len: text.len() as u64,
            modified: 1,
            text: text.to_string(),
        }
    }

    fn index_of(docs: Vec<Document>) -> Index {
        IndexBuilder::new(Analyzer::default())
            .build(Path::new("/nonexistent-corpus"), docs)
            .unwrap()
            .index
    }

    fn terms(q: &str) -> Vec<String> {
        query_terms(&Analyzer::default(), q)
    }

    #[test]
    fn test_unindexed_engine_rejects_search() {
        let engine = QueryEngine::new();
        assert!(!engine.is_ready());
        assert!(matches!(
            engine.search("anything", 5),
            Err(DocsError::NotIndexed)
        ));
    }

    #[test]
    fn test_publish_transitions_to_ready() {
        let engine = QueryEngine::new();
        engine.publish(index_of(vec![doc("a.md", "rust ownership")]));
        assert!(engine.is_ready());
        assert_eq!(engine.index().unwrap().doc_count(), 1);
    }

    #[test]
    fn test_empty_query_returns_empty() {
        let engine = QueryEngine::new();
        engine.publish(index_of(vec![doc("a.md", "rust ownership")]));
        assert!(engine.search("", 5).unwrap().is_empty());
        assert!(engine.search("the of and", 5).unwrap().is_empty());
        assert!(engine.search("rust", 0).unwrap().is_empty());
    }

    #[test]
    fn test_query_terms_deduplicated() {
        assert_eq!(terms("Lambda lambda LAMBDA scaling"), vec!["lambda", "scaling"]);
    }

    #[test]
    fn test_rank_excludes_non_matching_documents() {
        let index = index_of(vec![
            doc("a.md", "AWS Lambda functions scale automatically"),
            doc("b.md", "Python virtual environments isolate dependencies."),
        ]);
        let ranked = rank(&index, &terms("AWS scaling"), 5);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].0, 0);
        assert!(ranked[0].1 > 0.0);
    }

    #[test]
    fn test_rank_scores_every_candidate_before_ranking() {
        // The best match is discovered last.
        let index = index_of(vec![
            doc("a.md", "deployment notes and other deployment things"),
            doc("b.md", "kubernetes mentioned once among many unrelated words here"),
            doc("c.md", "kubernetes kubernetes kubernetes cluster"),
        ]);
        let ranked = rank(&index, &terms("kubernetes cluster"), 5);
        assert_eq!(ranked.iter().map(|r| r.0).collect::<Vec<_>>(), vec![2, 1]);
        assert!(ranked[0].1 > ranked[1].1);
    }

    #[test]
    fn test_rank_ties_break_by_discovery_order() {
        let index = index_of(vec![
            doc("a.md", "cache layer"),
            doc("b.md", "cache layer"),
            doc("c.md", "cache layer"),
        ]);
        let ranked = rank(&index, &terms("cache"), 5);
        assert_eq!(ranked.iter().map(|r| r.0).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(ranked[0].1, ranked[2].1);
    }

    #[test]
    fn test_rank_truncates_to_limit() {
        let index = index_of((0..10).map(|i| doc(&format!("d{}.md", i), "shared")).collect());
        assert_eq!(rank(&index, &terms("shared"), 3).len(), 3);
    }

    #[test]
    fn test_length_normalization_prefers_focused_document() {
        let long_text = format!("tokio {}", "filler ".repeat(200));
        let index = index_of(vec![doc("long.md", &long_text), doc("short.md", "tokio runtime")]);
        let ranked = rank(&index, &terms("tokio"), 5);
        assert_eq!(ranked[0].0, 1);
    }

    #[test]
    fn test_term_in_every_document_still_scores() {
        let index = index_of(vec![doc("only.md", "singleton corpus")]);
        let ranked = rank(&index, &terms("singleton"), 5);
        assert_eq!(ranked.len(), 1);
        assert!(ranked[0].1 > 0.0);
    }

    #[test]
    fn test_search_with_unreadable_source_has_empty_excerpt() {
        let engine = QueryEngine::new();
        engine.publish(index_of(vec![doc("a.md", "rust ownership")]));
        let results = engine.search("ownership", 5).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "a.md");
        assert_eq!(results[0].excerpt, "");
    }

    #[test]
    fn test_excerpt_short_text_returned_whole() {
        let analyzer = Analyzer::default();
        let set: HashSet<&str> = ["lambda"].into_iter().collect();
        assert_eq!(
            excerpt(&analyzer, "Intro\n\nAWS Lambda", &set, 200),
            "Intro AWS Lambda"
        );
    }

    #[test]
    fn test_excerpt_collapses_blank_lines_in_window() {
        let analyzer = Analyzer::default();
        let set: HashSet<&str> = ["lambda"].into_iter().collect();
        let text = format!("{}\n\n\tAWS Lambda\n\nscales {}", "intro ".repeat(30), "tail ".repeat(30));
        let ex = excerpt(&analyzer, &text, &set, 60);
        assert!(ex.contains("AWS Lambda scales"), "excerpt: {}", ex);
        assert!(!ex.contains("  "));
        assert!(!ex.contains('\n'));
    }

    #[test]
    fn test_excerpt_window_contains_first_match() {
        let analyzer = Analyzer::default();
        let text = format!(
            "{} The needle appears here. {}",
            "lorem ipsum ".repeat(40),
            "dolor sit ".repeat(40)
        );
        let set: HashSet<&str> = ["needle"].into_iter().collect();
        let ex = excerpt(&analyzer, &text, &set, 80);
        assert!(ex.contains("needle"), "excerpt was: {}", ex);
        assert!(ex.starts_with("..."));
        assert!(ex.ends_with("..."));
        assert!(ex.chars().count() <= 80 + 6);
    }

    #[test]
    fn test_excerpt_without_match_uses_opening_text() {
        let analyzer = Analyzer::default();
        let text = "word ".repeat(100);
        let set: HashSet<&str> = ["absent"].into_iter().collect();
        let ex = excerpt(&analyzer, &text, &set, 50);
        assert!(ex.starts_with("word"));
        assert!(ex.ends_with("..."));
    }

    #[test]
    fn test_excerpt_multibyte_boundaries() {
        let analyzer = Analyzer::default();
        let text = format!("{}café crème brûlée{}", "é".repeat(150), "ü".repeat(150));
        let set: HashSet<&str> = ["crème"].into_iter().collect();
        let ex = excerpt(&analyzer, &text, &set, 40);
        assert!(ex.contains("crème"));
    }
}

//! Text analyzer shared by indexing and querying.
//!
//! [`Analyzer::analyze`] turns normalized text into an ordered sequence of
//! index terms: lower-cased, split on non-alphanumeric boundaries, with
//! short tokens and stop words dropped. The same analyzer instance (or one
//! built from identical [`AnalyzerConfig`]) must be used for building an
//! index and for querying it; the persisted index records the settings so
//! a mismatch is detected on load.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Common English function words excluded from the index.
pub const STOP_WORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "am", "an", "and", "any", "are",
    "as", "at", "be", "because", "been", "before", "being", "below", "between", "both", "but",
    "by", "can", "could", "did", "do", "does", "doing", "down", "during", "each", "few", "for",
    "from", "further", "had", "has", "have", "having", "he", "her", "here", "hers", "herself",
    "him", "himself", "his", "how", "i", "if", "in", "into", "is", "it", "its", "itself", "just",
    "me", "more", "most", "my", "myself", "no", "nor", "not", "now", "of", "off", "on", "once",
    "only", "or", "other", "our", "ours", "ourselves", "out", "over", "own", "same", "she",
    "should", "so", "some", "such", "than", "that", "the", "their", "theirs", "them",
    "themselves", "then", "there", "these", "they", "this", "those", "through", "to", "too",
    "under", "until", "up", "very", "was", "we", "were", "what", "when", "where", "which",
    "while", "who", "whom", "why", "will", "with", "would", "you", "your", "yours", "yourself",
    "yourselves",
];

/// Analyzer settings. Persisted with the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// Tokens with fewer characters than this are dropped.
    #[serde(default = "default_min_token_length")]
    pub min_token_length: usize,
    /// Drop tokens found in [`STOP_WORDS`].
    #[serde(default = "default_stop_words")]
    pub stop_words: bool,
}

fn default_min_token_length() -> usize {
    2
}
fn default_stop_words() -> bool {
    true
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            min_token_length: default_min_token_length(),
            stop_words: default_stop_words(),
        }
    }
}

/// A term together with the byte span it came from in the source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub term: String,
    pub start: usize,
    pub end: usize,
}

/// Deterministic text-to-terms analyzer.
#[derive(Debug, Clone, Default)]
pub struct Analyzer {
    config: AnalyzerConfig,
}

impl Analyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Convert text into its ordered sequence of index terms.
    pub fn analyze(&self, text: &str) -> Vec<String> {
        self.analyze_with_offsets(text)
            .into_iter()
            .map(|t| t.term)
            .collect()
    }

    /// Like [`analyze`](Analyzer::analyze), keeping the byte offsets of each
    /// term in `text`. Used to locate excerpts.
    pub fn analyze_with_offsets(&self, text: &str) -> Vec<Token> {
        let mut tokens = Vec::new();
        let mut start: Option<usize> = None;

        for (i, c) in text.char_indices() {
            if c.is_alphanumeric() {
                if start.is_none() {
                    start = Some(i);
                }
            } else if let Some(s) = start.take() {
                self.push_token(&mut tokens, text, s, i);
            }
        }
        if let Some(s) = start {
            self.push_token(&mut tokens, text, s, text.len());
        }

        tokens
    }

    /// Count how often each term occurs in `text`.
    pub fn term_frequencies(&self, text: &str) -> HashMap<String, u32> {
        let mut freq = HashMap::new();
        for term in self.analyze(text) {
            *freq.entry(term).or_insert(0) += 1;
        }
        freq
    }

    fn push_token(&self, tokens: &mut Vec<Token>, text: &str, start: usize, end: usize) {
        let term = text[start..end].to_lowercase();
        if term.chars().count() < self.config.min_token_length {
            return;
        }
        if self.config.stop_words && is_stop_word(&term) {
            return;
        }
        tokens.push(Token { term, start, end });
    }
}

fn is_stop_word(term: &str) -> bool {
    STOP_WORDS.binary_search(&term).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_words_sorted_for_binary_search() {
        let mut sorted = STOP_WORDS.to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, STOP_WORDS);
    }

    #[test]
    fn test_analyze_basic() {
        let analyzer = Analyzer::default();
        assert_eq!(
            analyzer.analyze("AWS Lambda functions scale automatically"),
            vec!["aws", "lambda", "functions", "scale", "automatically"]
        );
    }

    #[test]
    fn test_analyze_drops_short_and_stop_words() {
        let analyzer = Analyzer::default();
        assert_eq!(
            analyzer.analyze("A guide to the S3 API, v2 (and x)."),
            vec!["guide", "s3", "api", "v2"]
        );
    }

    #[test]
    fn test_analyze_splits_on_punctuation() {
        let analyzer = Analyzer::default();
        assert_eq!(
            analyzer.analyze("virtual-environments/isolate_dependencies"),
            vec!["virtual", "environments", "isolate", "dependencies"]
        );
    }

    #[test]
    fn test_analyze_unicode() {
        let analyzer = Analyzer::default();
        assert_eq!(analyzer.analyze("Größe ÜBER café"), vec!["größe", "über", "café"]);
    }

    #[test]
    fn test_empty_and_punctuation_only() {
        let analyzer = Analyzer::default();
        assert!(analyzer.analyze("").is_empty());
        assert!(analyzer.analyze("  ?! -- ...").is_empty());
        assert!(analyzer.analyze("the and of").is_empty());
    }

    #[test]
    fn test_stop_words_can_be_disabled() {
        let analyzer = Analyzer::new(AnalyzerConfig {
            min_token_length: 1,
            stop_words: false,
        });
        assert_eq!(analyzer.analyze("the a x"), vec!["the", "a", "x"]);
    }

    #[test]
    fn test_offsets_point_into_source() {
        let analyzer = Analyzer::default();
        let text = "Deploy: Kubernetes, Docker";
        let tokens = analyzer.analyze_with_offsets(text);
        assert_eq!(tokens.len(), 3);
        for t in &tokens {
            assert_eq!(text[t.start..t.end].to_lowercase(), t.term);
        }
        assert_eq!(tokens[1].start, 8);
    }

    #[test]
    fn test_term_frequencies_sum_to_token_count() {
        let analyzer = Analyzer::default();
        let text = "cache cache eviction policy cache";
        let freq = analyzer.term_frequencies(text);
        assert_eq!(freq["cache"], 3);
        assert_eq!(
            freq.values().sum::<u32>() as usize,
            analyzer.analyze(text).len()
        );
    }

    #[test]
    fn test_deterministic() {
        let analyzer = Analyzer::default();
        let text = "Index builder merges per-file term counts";
        assert_eq!(analyzer.analyze(text), analyzer.analyze(text));
    }
}

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::analyzer::AnalyzerConfig;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub analyzer: AnalyzerConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorpusConfig {
    pub root: PathBuf,
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

fn default_extensions() -> Vec<String> {
    vec!["md".to_string(), "txt".to_string(), "html".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// Where the index snapshot is persisted. `None` keeps the index in memory only.
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: None,
            concurrency: default_concurrency(),
        }
    }
}

fn default_concurrency() -> usize {
    8
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,
    #[serde(default = "default_excerpt_chars")]
    pub excerpt_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            max_limit: default_max_limit(),
            excerpt_chars: default_excerpt_chars(),
        }
    }
}

fn default_limit() -> usize {
    5
}
fn default_max_limit() -> usize {
    50
}
fn default_excerpt_chars() -> usize {
    200
}

impl Config {
    /// Defaults for a corpus rooted at `root`, with no persisted index.
    pub fn for_root(root: impl Into<PathBuf>) -> Self {
        Self {
            corpus: CorpusConfig {
                root: root.into(),
                extensions: default_extensions(),
                exclude_globs: Vec::new(),
                follow_symlinks: false,
            },
            analyzer: AnalyzerConfig::default(),
            index: IndexConfig::default(),
            retrieval: RetrievalConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.corpus.extensions.is_empty() {
            anyhow::bail!("corpus.extensions must not be empty");
        }
        if self
            .corpus
            .extensions
            .iter()
            .any(|e| e.trim_start_matches('.').is_empty())
        {
            anyhow::bail!("corpus.extensions must not contain empty entries");
        }

        if self.analyzer.min_token_length == 0 {
            anyhow::bail!("analyzer.min_token_length must be >= 1");
        }

        if self.index.concurrency == 0 {
            anyhow::bail!("index.concurrency must be >= 1");
        }

        if self.retrieval.default_limit == 0 {
            anyhow::bail!("retrieval.default_limit must be >= 1");
        }
        if self.retrieval.default_limit > self.retrieval.max_limit {
            anyhow::bail!(
                "retrieval.default_limit ({}) must not exceed retrieval.max_limit ({})",
                self.retrieval.default_limit,
                self.retrieval.max_limit
            );
        }
        if self.retrieval.excerpt_chars < 20 {
            anyhow::bail!("retrieval.excerpt_chars must be >= 20");
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;

    Ok(config)
}

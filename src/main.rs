//! # Docs Harness CLI (`dh`)
//!
//! Thin command-line glue over the `docs_harness` library.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `dh index` | Index the corpus (incremental unless `--full`) and persist it |
//! | `dh search "<query>"` | Ranked search with excerpts |
//! | `dh read <path>` | Print a document under the corpus root |
//! | `dh status` | Show snapshot freshness and per-document top terms |
//!
//! Logs go to stderr (`RUST_LOG`, default `docs_harness=info`); stdout
//! carries only command output.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use docs_harness::config::{self, Config};
use docs_harness::ingest::{self, IndexMode};
use docs_harness::loader::DocumentLoader;
use docs_harness::models::{format_ts_iso, SearchResult};
use docs_harness::search::QueryEngine;
use docs_harness::store::{self, IndexStore};
use docs_harness::tool::DocsTool;
use docs_harness::DocsError;

/// Docs Harness: index a documentation directory and query it.
#[derive(Parser)]
#[command(name = "dh", version, about = "Docs Harness: local documentation indexing and retrieval")]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/dh.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build or update the index.
    ///
    /// Reuses unchanged documents from the persisted snapshot unless
    /// `--full` is given.
    Index {
        /// Rebuild every document from scratch.
        #[arg(long)]
        full: bool,
    },

    /// Search the corpus.
    ///
    /// Loads the persisted index when it is current and indexes the corpus
    /// first otherwise.
    Search {
        query: String,

        /// Maximum number of results (defaults to `retrieval.default_limit`).
        #[arg(long)]
        limit: Option<usize>,

        /// Print results as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print a document, by path relative to the corpus root or absolute.
    Read {
        path: String,

        /// Print the document as JSON (path, title, format, content).
        #[arg(long)]
        json: bool,
    },

    /// Show the persisted index and whether it matches the corpus.
    Status {
        /// Number of top terms to list per document.
        #[arg(long, default_value_t = 20)]
        top_terms: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new("docs_harness=info"))?,
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Index { full } => {
            let mode = if full {
                IndexMode::Full
            } else {
                IndexMode::Incremental
            };
            let outcome = ingest::run_index(&cfg, mode).await?;
            let report = &outcome.report;
            println!("index {}", cfg.corpus.root.display());
            println!("  documents: {}", report.indexed);
            println!("  analyzed: {}", report.analyzed);
            println!("  reused: {}", report.reused);
            println!("  removed: {}", report.removed);
            println!("  skipped: {}", report.skipped.len());
            for skipped in &report.skipped {
                println!("    {} ({})", skipped.path.display(), skipped.reason);
            }
            println!("  terms: {}", outcome.index.term_count());
            println!("  generation: {}", outcome.index.generation());
            match &cfg.index.path {
                Some(path) => println!("  saved: {}", path.display()),
                None => println!("  saved: no (index.path not set)"),
            }
            println!("ok");
        }
        Commands::Search { query, limit, json } => {
            let opened = ingest::open_engine(&cfg).await?;
            let tool = DocsTool::from_config(opened.engine, &cfg)?;
            match tool.search(&query, limit) {
                Ok(results) if json => {
                    println!("{}", serde_json::to_string_pretty(&serde_json::json!({ "results": results }))?);
                }
                Ok(results) => print_results(&results),
                Err(e) if json => {
                    println!("{}", serde_json::to_string_pretty(&e.to_value())?);
                    std::process::exit(1);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Commands::Read { path, json } => {
            let tool = DocsTool::from_config(Arc::new(QueryEngine::from_config(&cfg.retrieval)), &cfg)?;
            match tool.read(&path) {
                Ok(doc) if json => println!("{}", serde_json::to_string_pretty(&doc)?),
                Ok(doc) => {
                    println!("--- {} ---", doc.title);
                    println!("path:   {}", doc.path.display());
                    println!("format: {}", doc.format.as_str());
                    println!();
                    println!("{}", doc.content);
                }
                Err(e) if json => {
                    println!("{}", serde_json::to_string_pretty(&e.to_value())?);
                    std::process::exit(1);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Commands::Status { top_terms } => print_status(&cfg, top_terms)?,
    }

    Ok(())
}

fn print_results(results: &[SearchResult]) {
    if results.is_empty() {
        println!("No results.");
        return;
    }
    for (i, result) in results.iter().enumerate() {
        println!("{}. [{:.2}] {}", i + 1, result.score, result.title);
        println!("    path: {}", result.path.display());
        println!("    format: {}", result.format.as_str());
        println!("    excerpt: \"{}\"", result.excerpt.trim());
        println!("    id: {}", result.id);
        println!();
    }
}

fn print_status(cfg: &Config, top_terms: usize) -> Result<()> {
    let Some(path) = &cfg.index.path else {
        println!("index.path is not set; the index is rebuilt in memory on every search.");
        return Ok(());
    };

    let store = IndexStore::new(path);
    let index = match store.read() {
        Ok(index) => index,
        Err(DocsError::NotFound { .. }) => {
            println!("No index at {}. Run `dh index`.", path.display());
            return Ok(());
        }
        Err(e) => return Err(e).with_context(|| format!("Failed to read index {}", path.display())),
    };

    let loader = DocumentLoader::from_config(&cfg.corpus)?;
    let files = loader.discover()?;
    let current = store::fingerprint_files(loader.root(), &files);
    let fresh = current == index.fingerprint();

    println!("index {}", path.display());
    println!("  root: {}", index.root().display());
    println!("  generation: {}", index.generation());
    println!("  built: {}", index.built_at().format("%Y-%m-%d %H:%M:%S UTC"));
    println!("  documents: {}", index.doc_count());
    println!("  terms: {}", index.term_count());
    println!("  fingerprint: {}", index.fingerprint());
    println!("  status: {}", if fresh { "current" } else { "stale" });
    println!();

    for (id, doc) in index.docs().iter().enumerate() {
        let terms = index
            .top_terms(id as u32, top_terms)
            .into_iter()
            .map(|(term, tf)| format!("{}({})", term, tf))
            .collect::<Vec<_>>()
            .join(" ");
        println!(
            "{} [{}] {} tokens, modified {}",
            doc.relative,
            doc.title,
            doc.token_count,
            format_ts_iso(doc.modified)
        );
        println!("    {}", terms);
    }
    Ok(())
}

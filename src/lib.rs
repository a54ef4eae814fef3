//! # Docs Harness
//!
//! A local documentation indexing and retrieval engine for AI tools.
//!
//! Docs Harness walks a directory of Markdown, plain-text, and HTML files,
//! builds an in-memory inverted index over normalized terms, and answers
//! ranked keyword queries with excerpts. An orchestration layer such as an
//! agent talks to it through two operations only:
//! `search_docs` and `read_doc`.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌──────────┐   ┌───────────┐
//! │  Loader  │──▶│ Analyzer │──▶│ Builder  │──▶│   Index   │
//! └──────────┘   └──────────┘   └──────────┘   └─────┬─────┘
//!                                                    ▼
//!                               ┌──────────┐   ┌───────────┐
//!                               │ DocsTool │──▶│QueryEngine│
//!                               └──────────┘   └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! dh --config ./config/dh.toml index            # build and persist the index
//! dh --config ./config/dh.toml search "lambda scaling"
//! dh --config ./config/dh.toml read guide/setup.md
//! dh --config ./config/dh.toml status
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`extract`] | Markdown/HTML normalization and titles |
//! | [`loader`] | Corpus discovery and lazy document loading |
//! | [`analyzer`] | Tokenization and term normalization |
//! | [`index`] | Inverted index structure |
//! | [`builder`] | Full, concurrent, and incremental index builds |
//! | [`store`] | Fingerprints and on-disk snapshots |
//! | [`search`] | Ranking and excerpts |
//! | [`tool`] | `search_docs` / `read_doc` adapter |
//! | [`ingest`] | Load-or-build lifecycle |
//! | [`error`] | Error types |

pub mod analyzer;
pub mod builder;
pub mod config;
pub mod error;
pub mod extract;
pub mod index;
pub mod ingest;
pub mod loader;
pub mod models;
pub mod search;
pub mod store;
pub mod tool;

pub use error::{DocsError, ErrorKind};

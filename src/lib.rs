//! # FactGap
//!
//! Retrieval-augmented answers over a repository's code, its pull-request
//! diffs, repository documentation and Notion pages.
//!
//! The pipeline logic (chunking, enrichment, intent routing, scoped
//! retrieval, reranking, answer composition) lives in `factgap-core`. This
//! crate supplies everything that touches the outside world: configuration,
//! file discovery, the SQLite vector store, and the hosted embedding,
//! rerank and chat providers.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────────┐   ┌──────────┐
//! │  Discovery  │──▶│  Chunk + Enrich  │──▶│  SQLite   │
//! │ repo / diff │   │  + Embed (skip)  │   │ rag_chunks│
//! └─────────────┘   └──────────────────┘   └────┬─────┘
//!                                               │
//!                 ┌─────────────────────────────┤
//!                 ▼                             ▼
//!          ┌─────────────┐              ┌──────────────┐
//!          │ Scoped      │─────────────▶│ Rerank +     │──▶ cited answer
//!          │ retrieval   │              │ diversity    │
//!          └─────────────┘              └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! factgap init
//! factgap index repo --root . --repo acme/api
//! factgap index diff pr.diff --pr 42 --sha 9f1c2e7 --root .
//! factgap ask "Where is the retry policy configured?"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`discovery`] | Repository file discovery |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |
//! | [`sqlite_store`] | SQLite-backed vector store |
//! | [`http`] | JSON-over-HTTP with retry |
//! | [`embedding`] | OpenAI and Ollama embedders |
//! | [`rerank`] | Cohere cross-encoder |
//! | [`generation`] | OpenAI chat generator |
//! | [`ingest`] | `index repo`, `index diff`, `index page` |
//! | [`ask`] | `ask`, `analyze`, `eval`, `classify`, `purge`, `discover` |

pub mod ask;
pub mod config;
pub mod db;
pub mod discovery;
pub mod embedding;
pub mod generation;
pub mod http;
pub mod ingest;
pub mod migrate;
pub mod rerank;
pub mod sqlite_store;

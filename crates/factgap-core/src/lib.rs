//! # FactGap Core
//!
//! Shared retrieval-augmented-generation logic for FactGap: typed chunk
//! records, content hashing, deterministic enrichment, chunking with
//! line-span mapping, intent routing, scoped retrieval, batch embedding
//! with hash-based skip, reranking with diversity constraints, and the
//! indexing pipeline that ties them together.
//!
//! This crate contains no filesystem I/O, HTTP clients, or SQL. Every
//! external capability (embedding model, vector store, rerank service,
//! text generator) is reached through a trait so the application crate
//! can plug in real backends and tests can plug in fakes.
//!
//! ## Pipelines
//!
//! ```text
//! index:  chunk ─▶ symbol ─▶ enrich ─▶ hash ─▶ embed (skip known) ─▶ upsert
//! query:  classify ─▶ search scopes ─▶ normalize ─▶ weight ─▶ merge ─▶ rerank ─▶ diversity
//! ```

pub mod answer;
pub mod chunk;
pub mod embedding;
pub mod enrich;
pub mod error;
pub mod hash;
pub mod index;
pub mod intent;
pub mod models;
pub mod rerank;
pub mod report;
pub mod retrieval;
pub mod store;
pub mod symbol;

pub use error::PipelineError;
pub use hash::compute_content_hash;
pub use intent::{classify_intent, IntentClassifier, IntentResult, QueryIntent};
pub use models::{Chunk, ChunkScope, ScoredChunk, SourceType};

//! Storage abstraction for FactGap.
//!
//! The [`VectorStore`] trait is the only way the core pipelines touch
//! persisted chunks: similarity search with exact-match filters, upsert
//! with identity-based deduplication, bulk delete by owning scope, and the
//! content-hash existence check used to skip re-embedding.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use std::collections::HashSet;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::models::{Chunk, ChunkScope, ScopeFilters, SourceType};

/// A vector similarity query against one retrieval scope.
#[derive(Debug, Clone)]
pub struct VectorQuery<'a> {
    pub embedding: &'a [f32],
    /// Maximum number of hits.
    pub k: usize,
    /// Hits scoring below this similarity are dropped.
    pub min_score: f64,
    /// Only chunks of these types are considered. Empty means all types.
    pub source_types: &'a [SourceType],
    pub filters: &'a ScopeFilters,
}

impl VectorQuery<'_> {
    pub fn accepts(&self, chunk: &Chunk) -> bool {
        (self.source_types.is_empty() || self.source_types.contains(&chunk.source_type))
            && self.filters.matches(chunk)
    }
}

/// One row returned by [`VectorStore::search`], ordered by descending score.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub id: String,
    pub chunk: Chunk,
    /// Cosine similarity between the query and the stored embedding.
    pub score: f64,
}

/// Result of [`VectorStore::upsert`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// A new row was written under this id.
    Inserted(String),
    /// A chunk with the same identity key already exists; nothing written.
    Duplicate,
}

/// Bulk-delete selector. `user_id` is mandatory; every other field narrows.
#[derive(Debug, Clone, Default)]
pub struct DeleteScope {
    pub user_id: String,
    pub repo: Option<String>,
    pub source_type: Option<SourceType>,
    pub source_id: Option<String>,
}

impl DeleteScope {
    pub fn matches(&self, chunk: &Chunk) -> bool {
        chunk.user_id == self.user_id
            && self.repo.as_ref().map_or(true, |r| &chunk.repo == r)
            && self.source_type.map_or(true, |st| chunk.source_type == st)
            && self
                .source_id
                .as_ref()
                .map_or(true, |id| chunk.source_id.as_ref() == Some(id))
    }
}

/// Abstract vector store backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`search`](VectorStore::search) | Top-k cosine search within filters |
/// | [`upsert`](VectorStore::upsert) | Insert unless the identity key exists |
/// | [`delete`](VectorStore::delete) | Bulk delete by owning scope |
/// | [`existing_hashes`](VectorStore::existing_hashes) | Which content hashes already exist in a scope |
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn search(&self, query: &VectorQuery<'_>) -> Result<Vec<SearchHit>>;

    async fn upsert(&self, chunk: &Chunk) -> Result<UpsertOutcome>;

    /// Returns the number of rows removed.
    async fn delete(&self, scope: &DeleteScope) -> Result<usize>;

    /// Subset of `hashes` already stored at exactly `scope`'s coordinates.
    async fn existing_hashes(
        &self,
        scope: &ChunkScope,
        hashes: &[String],
    ) -> Result<HashSet<String>>;
}

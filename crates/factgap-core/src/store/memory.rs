//! In-memory [`VectorStore`] implementation for tests and embedded use.
//!
//! Rows live in a `Vec` behind `std::sync::RwLock`; identity keys in a
//! `HashSet`. Search is brute-force cosine similarity over every row that
//! passes the query filters.

use std::collections::HashSet;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::models::{Chunk, ChunkScope};

use super::{DeleteScope, SearchHit, UpsertOutcome, VectorQuery, VectorStore};

struct StoredChunk {
    id: String,
    identity: String,
    chunk: Chunk,
}

pub struct InMemoryStore {
    rows: RwLock<Vec<StoredChunk>>,
    identities: RwLock<HashSet<String>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(Vec::new()),
            identities: RwLock::new(HashSet::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every stored chunk, in insertion order.
    pub fn chunks(&self) -> Vec<Chunk> {
        self.rows
            .read()
            .unwrap()
            .iter()
            .map(|r| r.chunk.clone())
            .collect()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn search(&self, query: &VectorQuery<'_>) -> Result<Vec<SearchHit>> {
        let rows = self.rows.read().unwrap();
        let mut hits: Vec<SearchHit> = rows
            .iter()
            .filter(|r| query.accepts(&r.chunk))
            .filter_map(|r| {
                let score = cosine_similarity(query.embedding, &r.chunk.embedding) as f64;
                (score >= query.min_score).then(|| SearchHit {
                    id: r.id.clone(),
                    chunk: r.chunk.clone(),
                    score,
                })
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(query.k);
        Ok(hits)
    }

    async fn upsert(&self, chunk: &Chunk) -> Result<UpsertOutcome> {
        let identity = chunk.identity();
        let mut identities = self.identities.write().unwrap();
        if !identities.insert(identity.clone()) {
            return Ok(UpsertOutcome::Duplicate);
        }
        let id = uuid::Uuid::new_v4().to_string();
        self.rows.write().unwrap().push(StoredChunk {
            id: id.clone(),
            identity,
            chunk: chunk.clone(),
        });
        Ok(UpsertOutcome::Inserted(id))
    }

    async fn delete(&self, scope: &DeleteScope) -> Result<usize> {
        let mut identities = self.identities.write().unwrap();
        let mut rows = self.rows.write().unwrap();
        let before = rows.len();
        rows.retain(|r| {
            if scope.matches(&r.chunk) {
                identities.remove(&r.identity);
                false
            } else {
                true
            }
        });
        Ok(before - rows.len())
    }

    async fn existing_hashes(
        &self,
        scope: &ChunkScope,
        hashes: &[String],
    ) -> Result<HashSet<String>> {
        let identities = self.identities.read().unwrap();
        Ok(hashes
            .iter()
            .filter(|h| identities.contains(&scope.identity(h)))
            .cloned()
            .collect())
    }
}

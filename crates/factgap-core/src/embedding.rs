//! Embedding provider trait, batched embedding with hash-based skip, and
//! vector utilities.
//!
//! Concrete providers (OpenAI, Ollama) live in the `factgap` app crate.
//! This module only knows about the [`Embedder`] trait, so the batching and
//! skip logic can be tested with an in-process fake.
//!
//! # Skip flow
//!
//! ```text
//! texts + hashes ─▶ ExistingHashes::existing ─▶ embed only new ─▶ Vec<Option<Vec<f32>>>
//! ```
//!
//! Positions whose hash already exists come back as `None`; every other
//! position holds its vector, regardless of the order the provider
//! answered in.

use std::collections::HashSet;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::error::PipelineError;
use crate::hash::compute_content_hash;
use crate::models::ChunkScope;
use crate::store::VectorStore;

/// Texts sent to the provider per request unless configured otherwise.
pub const DEFAULT_BATCH_SIZE: usize = 32;

/// One vector returned by a provider, tagged with its position in the
/// request it answers.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedEmbedding {
    pub index: usize,
    pub vector: Vec<f32>,
}

/// Trait for embedding backends.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality, or `0` if unknown.
    fn dims(&self) -> usize;
    /// Embed one request's worth of texts. Pairs may come back in any order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<IndexedEmbedding>>;
}

/// Answers "which of these content hashes are already stored?".
#[async_trait]
pub trait ExistingHashes: Send + Sync {
    async fn existing(&self, hashes: &[String]) -> Result<HashSet<String>>;
}

/// Existence check backed by a [`VectorStore`], restricted to one scope.
pub struct StoreHashes<'a, S: VectorStore + ?Sized> {
    store: &'a S,
    scope: ChunkScope,
}

impl<'a, S: VectorStore + ?Sized> StoreHashes<'a, S> {
    pub fn new(store: &'a S, scope: ChunkScope) -> Self {
        Self { store, scope }
    }
}

#[async_trait]
impl<S: VectorStore + ?Sized> ExistingHashes for StoreHashes<'_, S> {
    async fn existing(&self, hashes: &[String]) -> Result<HashSet<String>> {
        self.store.existing_hashes(&self.scope, hashes).await
    }
}

/// Existence check that reports nothing as stored.
pub struct NoExisting;

#[async_trait]
impl ExistingHashes for NoExisting {
    async fn existing(&self, _hashes: &[String]) -> Result<HashSet<String>> {
        Ok(HashSet::new())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EmbedStats {
    pub total: usize,
    pub skipped: usize,
    pub embedded: usize,
    pub batch_count: usize,
}

/// Result of [`BatchEmbedder::embed_with_skip`].
#[derive(Debug, Clone, Default)]
pub struct EmbedOutcome {
    /// One slot per input text; `None` where the hash already existed.
    pub embeddings: Vec<Option<Vec<f32>>>,
    pub skipped_indices: Vec<usize>,
    pub new_indices: Vec<usize>,
    pub stats: EmbedStats,
}

/// Splits texts into provider-sized batches and reassembles the results.
pub struct BatchEmbedder<'a> {
    embedder: &'a dyn Embedder,
    batch_size: usize,
}

impl<'a> BatchEmbedder<'a> {
    pub fn new(embedder: &'a dyn Embedder) -> Self {
        Self::with_batch_size(embedder, DEFAULT_BATCH_SIZE)
    }

    pub fn with_batch_size(embedder: &'a dyn Embedder, batch_size: usize) -> Self {
        Self {
            embedder,
            batch_size: batch_size.max(1),
        }
    }

    pub fn model_name(&self) -> &str {
        self.embedder.model_name()
    }

    /// Embed a single query string.
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let (mut vectors, _) = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| PipelineError::malformed("embedding", "no vector for query").into())
    }

    /// Embed every text, one provider call per `batch_size` slice.
    ///
    /// Returns the vectors in input order plus the number of provider calls.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<(Vec<Vec<f32>>, usize)> {
        let mut slots: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        let mut calls = 0;

        for (batch_no, batch) in texts.chunks(self.batch_size).enumerate() {
            let offset = batch_no * self.batch_size;
            let pairs = self.embedder.embed(batch).await?;
            calls += 1;

            for pair in pairs {
                if pair.index >= batch.len() {
                    return Err(PipelineError::malformed(
                        "embedding",
                        format!(
                            "index {} out of range for batch of {}",
                            pair.index,
                            batch.len()
                        ),
                    )
                    .into());
                }
                let dims = self.embedder.dims();
                if dims > 0 && pair.vector.len() != dims {
                    return Err(PipelineError::DimensionMismatch {
                        expected: dims,
                        actual: pair.vector.len(),
                    }
                    .into());
                }
                slots[offset + pair.index] = Some(pair.vector);
            }
        }

        let mut vectors = Vec::with_capacity(slots.len());
        for (i, slot) in slots.into_iter().enumerate() {
            match slot {
                Some(v) => vectors.push(v),
                None => {
                    return Err(PipelineError::malformed(
                        "embedding",
                        format!("missing vector for input {i}"),
                    )
                    .into())
                }
            }
        }
        Ok((vectors, calls))
    }

    /// Embed only the texts whose content hash is not already stored.
    ///
    /// `hashes` should be the hashes of the *original* content when `texts`
    /// are enriched; when absent they are computed from `texts`. A failing
    /// existence check is logged and treated as "nothing exists".
    /// Supplying a different number of hashes than texts is an error.
    pub async fn embed_with_skip(
        &self,
        texts: &[String],
        hashes: Option<&[String]>,
        existing: &dyn ExistingHashes,
    ) -> Result<EmbedOutcome> {
        if texts.is_empty() {
            return Ok(EmbedOutcome::default());
        }

        let computed;
        let hashes: &[String] = match hashes {
            Some(h) if h.len() == texts.len() => h,
            Some(h) => {
                return Err(PipelineError::InvalidInput(format!(
                    "{} hashes supplied for {} texts",
                    h.len(),
                    texts.len()
                ))
                .into())
            }
            None => {
                computed = texts
                    .iter()
                    .map(|t| compute_content_hash(t))
                    .collect::<Vec<_>>();
                &computed
            }
        };

        let known = match existing.existing(hashes).await {
            Ok(set) => set,
            Err(e) => {
                tracing::warn!("Existence check failed, embedding all {} texts: {e:#}", texts.len());
                HashSet::new()
            }
        };

        let (skipped_indices, new_indices): (Vec<usize>, Vec<usize>) =
            (0..texts.len()).partition(|&i| known.contains(&hashes[i]));

        let mut embeddings: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        let mut batch_count = 0;
        if !new_indices.is_empty() {
            let to_embed: Vec<String> = new_indices.iter().map(|&i| texts[i].clone()).collect();
            let (vectors, calls) = self.embed_batch(&to_embed).await?;
            batch_count = calls;
            for (&i, v) in new_indices.iter().zip(vectors) {
                embeddings[i] = Some(v);
            }
        }

        tracing::debug!(
            total = texts.len(),
            skipped = skipped_indices.len(),
            embedded = new_indices.len(),
            batch_count,
            "embed_with_skip"
        );

        Ok(EmbedOutcome {
            embeddings,
            stats: EmbedStats {
                total: texts.len(),
                skipped: skipped_indices.len(),
                embedded: new_indices.len(),
                batch_count,
            },
            skipped_indices,
            new_indices,
        })
    }
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// ```rust
/// use factgap_core::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12);
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    vec.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Decode a BLOB written by [`vec_to_blob`].
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`; `0.0` for empty, mismatched, or
/// zero-norm vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let (dot, na, nb) = a
        .iter()
        .zip(b)
        .fold((0.0f32, 0.0f32, 0.0f32), |(d, x2, y2), (x, y)| {
            (d + x * y, x2 + x * x, y2 + y * y)
        });
    let denom = na.sqrt() * nb.sqrt();
    if denom < f32::EPSILON {
        0.0
    } else {
        dot / denom
    }
}

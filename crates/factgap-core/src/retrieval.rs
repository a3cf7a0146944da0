//! Multi-scope retrieval with intent routing and score normalization.
//!
//! # Algorithm
//!
//! 1. Classify the query (or use uniform weights if routing is disabled).
//! 2. Embed the query once.
//! 3. Build scopes from the request context:
//!    - `pr_overlay` (code + diff) when a PR number is given,
//!    - `repo_docs` (code + repo_doc) when a repository is given,
//!    - `notion` always.
//! 4. Search each scope; a failing scope contributes nothing.
//! 5. Min-max normalize raw scores *within* each scope.
//! 6. `weighted = normalized × weight[source_type]`.
//! 7. Concatenate, dedupe by chunk id (first occurrence wins), stable sort
//!    by weighted score (desc), truncate to `top_k`.
//!
//! Normalizing per scope keeps a scope whose similarities cluster high from
//! drowning out the others before intent weights are applied.

use std::collections::HashSet;

use anyhow::Result;
use serde::Serialize;

use crate::embedding::{BatchEmbedder, Embedder};
use crate::intent::{IntentClassifier, IntentResult, QueryIntent, ScopeWeights};
use crate::models::{ScopeFilters, ScopeType, ScoredChunk, SourceType};
use crate::store::{SearchHit, VectorQuery, VectorStore};

/// Retrieval tuning parameters, decoupled from application config.
#[derive(Debug, Clone)]
pub struct RetrievalSettings {
    pub intent_routing: bool,
    /// Candidates kept after merging.
    pub top_k: usize,
    /// Hits requested per scope.
    pub scope_k: usize,
    pub min_score: f64,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            intent_routing: true,
            top_k: 40,
            scope_k: 30,
            min_score: 0.5,
        }
    }
}

/// Who is asking and about what.
#[derive(Debug, Clone, Default)]
pub struct RetrievalContext {
    pub user_id: String,
    pub repo: Option<String>,
    pub pr_number: Option<u64>,
    pub head_sha: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RetrievalScope {
    pub scope_type: ScopeType,
    pub source_types: Vec<SourceType>,
    pub filters: ScopeFilters,
    pub k: usize,
    pub min_score: f64,
}

/// Scopes to search for `ctx`, in priority order.
pub fn build_scopes(ctx: &RetrievalContext, k: usize, min_score: f64) -> Vec<RetrievalScope> {
    let mut scopes = Vec::with_capacity(3);

    if let Some(pr) = ctx.pr_number {
        scopes.push(RetrievalScope {
            scope_type: ScopeType::PrOverlay,
            source_types: vec![SourceType::Code, SourceType::Diff],
            filters: ScopeFilters {
                user_id: ctx.user_id.clone(),
                repo: ctx.repo.clone(),
                pr_number: Some(pr),
                head_sha: ctx.head_sha.clone(),
            },
            k,
            min_score,
        });
    }

    if let Some(repo) = &ctx.repo {
        scopes.push(RetrievalScope {
            scope_type: ScopeType::RepoDocs,
            source_types: vec![SourceType::Code, SourceType::RepoDoc],
            filters: ScopeFilters {
                user_id: ctx.user_id.clone(),
                repo: Some(repo.clone()),
                ..Default::default()
            },
            k,
            min_score,
        });
    }

    scopes.push(RetrievalScope {
        scope_type: ScopeType::Notion,
        source_types: vec![SourceType::Notion],
        filters: ScopeFilters {
            user_id: ctx.user_id.clone(),
            ..Default::default()
        },
        k,
        min_score,
    });

    scopes
}

/// Min-max normalize one scope's hits to `[0, 1]`.
///
/// If every hit has the same score (including a single hit), all are
/// normalized to `1.0`. Weighted scores start equal to normalized scores.
pub fn normalize_scores(hits: Vec<SearchHit>, scope_type: ScopeType) -> Vec<ScoredChunk> {
    if hits.is_empty() {
        return Vec::new();
    }

    let s_min = hits.iter().map(|h| h.score).fold(f64::INFINITY, f64::min);
    let s_max = hits.iter().map(|h| h.score).fold(f64::NEG_INFINITY, f64::max);

    hits.into_iter()
        .map(|h| {
            let norm = if (s_max - s_min).abs() < f64::EPSILON {
                1.0
            } else {
                (h.score - s_min) / (s_max - s_min)
            };
            ScoredChunk {
                id: h.id,
                chunk: h.chunk,
                raw_score: h.score,
                normalized_score: norm,
                weighted_score: norm,
                scope_type,
            }
        })
        .collect()
}

pub fn apply_intent_weights(chunks: &mut [ScoredChunk], weights: &ScopeWeights) {
    for sc in chunks {
        sc.weighted_score = sc.normalized_score * weights.weight_for(sc.source_type());
    }
}

/// Dedupe by id (first wins), stable sort by weighted score, keep `top_k`.
pub fn merge_and_sort(all: Vec<ScoredChunk>, top_k: usize) -> Vec<ScoredChunk> {
    let mut seen = HashSet::new();
    let mut unique: Vec<ScoredChunk> = all
        .into_iter()
        .filter(|sc| seen.insert(sc.id.clone()))
        .collect();
    unique.sort_by(|a, b| {
        b.weighted_score
            .partial_cmp(&a.weighted_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    unique.truncate(top_k);
    unique
}

#[derive(Debug, Clone, Serialize)]
pub struct ScopeStats {
    pub scope_type: ScopeType,
    pub source_types: Vec<SourceType>,
    pub count: usize,
    pub score_min: Option<f64>,
    pub score_mean: Option<f64>,
    pub score_max: Option<f64>,
    /// The scope search errored and contributed no results.
    pub failed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RetrievalStats {
    pub query_length: usize,
    pub intent: QueryIntent,
    pub intent_confidence: f64,
    pub scopes: Vec<ScopeStats>,
    /// Candidates across all scopes before dedupe.
    pub total_candidates: usize,
    /// Candidates after dedupe and truncation.
    pub merged_candidates: usize,
    pub failed_scopes: usize,
}

#[derive(Debug, Clone)]
pub struct RetrievalOutcome {
    pub candidates: Vec<ScoredChunk>,
    pub intent: IntentResult,
    pub stats: RetrievalStats,
}

/// Searches every applicable scope and merges the results.
pub struct ScopedRetriever<'a, S: VectorStore + ?Sized> {
    store: &'a S,
    embedder: BatchEmbedder<'a>,
    classifier: IntentClassifier,
    settings: RetrievalSettings,
}

impl<'a, S: VectorStore + ?Sized> ScopedRetriever<'a, S> {
    pub fn new(store: &'a S, embedder: &'a dyn Embedder, settings: RetrievalSettings) -> Self {
        Self {
            store,
            embedder: BatchEmbedder::new(embedder),
            classifier: IntentClassifier::new(),
            settings,
        }
    }

    pub fn settings(&self) -> &RetrievalSettings {
        &self.settings
    }

    pub async fn retrieve(&self, query: &str, ctx: &RetrievalContext) -> Result<RetrievalOutcome> {
        let intent = if self.settings.intent_routing {
            self.classifier.classify(query)
        } else {
            IntentResult::general()
        };

        let query_vec = self.embedder.embed_query(query).await?;
        let scopes = build_scopes(ctx, self.settings.scope_k, self.settings.min_score);

        let mut all = Vec::new();
        let mut scope_stats = Vec::with_capacity(scopes.len());
        let mut failed_scopes = 0;

        for scope in &scopes {
            let vq = VectorQuery {
                embedding: &query_vec,
                k: scope.k,
                min_score: scope.min_score,
                source_types: &scope.source_types,
                filters: &scope.filters,
            };
            let (hits, failed) = match self.store.search(&vq).await {
                Ok(hits) => (hits, false),
                Err(e) => {
                    tracing::warn!("Search failed for scope {}: {e:#}", scope.scope_type);
                    failed_scopes += 1;
                    (Vec::new(), true)
                }
            };

            scope_stats.push(summarize_scope(scope, &hits, failed));

            let mut scored = normalize_scores(hits, scope.scope_type);
            apply_intent_weights(&mut scored, &intent.scope_weights);
            all.extend(scored);
        }

        let total_candidates = all.len();
        let candidates = merge_and_sort(all, self.settings.top_k);

        let stats = RetrievalStats {
            query_length: query.chars().count(),
            intent: intent.intent,
            intent_confidence: intent.confidence,
            scopes: scope_stats,
            total_candidates,
            merged_candidates: candidates.len(),
            failed_scopes,
        };

        tracing::debug!(
            intent = %stats.intent,
            total = stats.total_candidates,
            merged = stats.merged_candidates,
            failed_scopes,
            "Retrieved candidates"
        );

        Ok(RetrievalOutcome {
            candidates,
            intent,
            stats,
        })
    }
}

fn summarize_scope(scope: &RetrievalScope, hits: &[SearchHit], failed: bool) -> ScopeStats {
    let scores: Vec<f64> = hits.iter().map(|h| h.score).collect();
    let (min, mean, max) = if scores.is_empty() {
        (None, None, None)
    } else {
        (
            Some(scores.iter().copied().fold(f64::INFINITY, f64::min)),
            Some(scores.iter().sum::<f64>() / scores.len() as f64),
            Some(scores.iter().copied().fold(f64::NEG_INFINITY, f64::max)),
        )
    };
    ScopeStats {
        scope_type: scope.scope_type,
        source_types: scope.source_types.clone(),
        count: hits.len(),
        score_min: min,
        score_mean: mean,
        score_max: max,
        failed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test_support::{chunk, scored};

    fn hit(id: &str, source_type: SourceType, score: f64) -> SearchHit {
        SearchHit {
            id: id.to_string(),
            chunk: chunk(source_type, id, id),
            score,
        }
    }

    #[test]
    fn test_build_scopes_full_context() {
        let ctx = RetrievalContext {
            user_id: "u1".into(),
            repo: Some("acme/api".into()),
            pr_number: Some(42),
            head_sha: Some("deadbeef".into()),
        };
        let scopes = build_scopes(&ctx, 30, 0.5);
        let kinds: Vec<_> = scopes.iter().map(|s| s.scope_type).collect();
        assert_eq!(
            kinds,
            vec![ScopeType::PrOverlay, ScopeType::RepoDocs, ScopeType::Notion]
        );
        assert_eq!(scopes[0].filters.pr_number, Some(42));
        assert_eq!(scopes[0].source_types, vec![SourceType::Code, SourceType::Diff]);
        assert_eq!(scopes[1].filters.pr_number, None);
        assert_eq!(scopes[2].filters.repo, None);
    }

    #[test]
    fn test_build_scopes_user_only() {
        let ctx = RetrievalContext {
            user_id: "u1".into(),
            ..Default::default()
        };
        let scopes = build_scopes(&ctx, 30, 0.5);
        assert_eq!(scopes.len(), 1);
        assert_eq!(scopes[0].scope_type, ScopeType::Notion);
    }

    #[test]
    fn test_normalize_min_max() {
        let hits = vec![
            hit("a", SourceType::Code, 0.6),
            hit("b", SourceType::Code, 0.8),
            hit("c", SourceType::Code, 1.0),
        ];
        let norm: Vec<f64> = normalize_scores(hits, ScopeType::RepoDocs)
            .iter()
            .map(|s| s.normalized_score)
            .collect();
        assert!((norm[0] - 0.0).abs() < 1e-9);
        assert!((norm[1] - 0.5).abs() < 1e-9);
        assert!((norm[2] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_normalize_spread_and_flat_scopes() {
        let spread = vec![
            hit("a", SourceType::Code, 0.9),
            hit("b", SourceType::Code, 0.5),
            hit("c", SourceType::Code, 0.1),
        ];
        let norm: Vec<f64> = normalize_scores(spread, ScopeType::RepoDocs)
            .iter()
            .map(|s| s.normalized_score)
            .collect();
        for (got, want) in norm.iter().zip([1.0, 0.5, 0.0]) {
            assert!((got - want).abs() < 1e-9, "{got} != {want}");
        }

        let flat = vec![
            hit("a", SourceType::Code, 0.7),
            hit("b", SourceType::Code, 0.7),
            hit("c", SourceType::Code, 0.7),
        ];
        let norm: Vec<f64> = normalize_scores(flat, ScopeType::RepoDocs)
            .iter()
            .map(|s| s.normalized_score)
            .collect();
        assert_eq!(norm, vec![1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_normalize_equal_scores_are_one() {
        let hits = vec![
            hit("a", SourceType::Notion, 0.7),
            hit("b", SourceType::Notion, 0.7),
        ];
        assert!(normalize_scores(hits, ScopeType::Notion)
            .iter()
            .all(|s| s.normalized_score == 1.0));
        assert!(normalize_scores(Vec::new(), ScopeType::Notion).is_empty());
    }

    #[test]
    fn test_weights_change_ranking() {
        let mut chunks = vec![
            scored("code", chunk(SourceType::Code, "a.py", "x"), 1.0),
            scored("page", chunk(SourceType::Notion, "p1", "y"), 1.0),
        ];
        chunks[0].normalized_score = 0.9;
        chunks[1].normalized_score = 0.8;
        apply_intent_weights(&mut chunks, &QueryIntent::StandardsPolicy.scope_weights());
        let merged = merge_and_sort(chunks, 40);
        assert_eq!(merged[0].id, "page");
        assert!((merged[0].weighted_score - 1.2).abs() < 1e-9);
        assert!((merged[1].weighted_score - 0.63).abs() < 1e-9);
    }

    #[test]
    fn test_merge_dedupes_first_wins_and_truncates() {
        let a1 = scored("a", chunk(SourceType::Code, "a.py", "x"), 0.4);
        let a2 = scored("a", chunk(SourceType::Code, "a.py", "x"), 0.9);
        let b = scored("b", chunk(SourceType::Code, "b.py", "y"), 0.5);
        let c = scored("c", chunk(SourceType::Code, "c.py", "z"), 0.5);
        let merged = merge_and_sort(vec![a1, a2, b, c], 2);
        let ids: Vec<_> = merged.iter().map(|s| s.id.as_str()).collect();
        // stable: b before c at equal score; the surviving "a" is the 0.4 one
        assert_eq!(ids, vec!["b", "c"]);
    }
}

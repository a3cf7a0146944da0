//! Reranking cascade and diversity-constrained selection.
//!
//! ```text
//! cross-encoder (RerankProvider) ──fail──▶ LLM (TextGenerator) ──fail──▶ passthrough
//!                                               │
//!                                     unparseable output ──▶ llm_fallback
//! ```
//!
//! Each tier produces an ordered list of `2 × top_k` (at most) candidates
//! with a score and a reason. The diversity filter then walks that list,
//! allowing at most [`MAX_CHUNKS_PER_DOC`] chunks per document, until
//! `top_k` are chosen. Rerank scores and reasons survive the filter.

use std::collections::{BTreeMap, HashMap};

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::answer::{citation, truncate_chars};
use crate::error::PipelineError;
use crate::models::{ScoredChunk, SourceType};

pub const MAX_CHUNKS_PER_DOC: usize = 2;
pub const MIN_DISTINCT_SOURCES: usize = 2;

/// Characters of each candidate sent to a cross-encoder.
const PROVIDER_DOC_CHARS: usize = 1000;
/// Candidates shown to the LLM reranker.
const LLM_MAX_CANDIDATES: usize = 20;
const LLM_DOC_CHARS: usize = 400;
const LLM_MAX_SELECTED: usize = 10;

const LLM_SYSTEM: &str = "You are a precise assistant that outputs only valid JSON.";

/// One result from a cross-encoder rerank service.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RerankHit {
    /// Position in the submitted document list.
    pub index: usize,
    pub relevance_score: f64,
}

/// A hosted cross-encoder rerank service (e.g. Cohere).
#[async_trait]
pub trait RerankProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn rerank(&self, query: &str, documents: &[String], top_n: usize) -> Result<Vec<RerankHit>>;
}

/// A chat-completion model used for LLM reranking and answer generation.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    fn model_name(&self) -> &str;
    async fn complete(&self, system: &str, prompt: &str) -> Result<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RerankMethod {
    CrossEncoder,
    Llm,
    LlmFallback,
    Passthrough,
}

impl RerankMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            RerankMethod::CrossEncoder => "cross_encoder",
            RerankMethod::Llm => "llm",
            RerankMethod::LlmFallback => "llm_fallback",
            RerankMethod::Passthrough => "passthrough",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RerankSettings {
    pub enabled: bool,
    pub diversity: bool,
}

impl Default for RerankSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            diversity: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RerankStats {
    pub diversity_applied: bool,
    pub distinct_sources: usize,
    pub source_distribution: BTreeMap<SourceType, usize>,
    pub docs_represented: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diversity_warning: Option<String>,
    /// Hits returned by the cross-encoder, when it ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_results: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_selected: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parse_error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RerankOutcome {
    pub chunks: Vec<ScoredChunk>,
    pub scores: Vec<f64>,
    pub reasons: Vec<String>,
    pub method: RerankMethod,
    pub stats: RerankStats,
}

/// Ordered candidates from one tier, before diversity.
struct Ranked {
    items: Vec<(ScoredChunk, f64, String)>,
    method: RerankMethod,
    stats: RerankStats,
}

/// Runs the rerank cascade with whichever capabilities were supplied.
pub struct Reranker<'a> {
    provider: Option<&'a dyn RerankProvider>,
    generator: Option<&'a dyn TextGenerator>,
    settings: RerankSettings,
}

impl<'a> Reranker<'a> {
    pub fn new(
        provider: Option<&'a dyn RerankProvider>,
        generator: Option<&'a dyn TextGenerator>,
        settings: RerankSettings,
    ) -> Self {
        Self {
            provider,
            generator,
            settings,
        }
    }

    /// Rerank `candidates` and select at most `top_k`.
    pub async fn rerank(&self, query: &str, candidates: Vec<ScoredChunk>, top_k: usize) -> RerankOutcome {
        let top_n = top_k * 2;

        let ranked = if !self.settings.enabled || candidates.is_empty() {
            passthrough(candidates, top_n)
        } else {
            self.cascade(query, candidates, top_n).await
        };

        tracing::debug!(
            method = ranked.method.as_str(),
            ranked = ranked.items.len(),
            "Rerank tier finished"
        );

        if self.settings.diversity {
            apply_diversity(ranked, top_k)
        } else {
            without_diversity(ranked, top_k)
        }
    }

    async fn cascade(&self, query: &str, candidates: Vec<ScoredChunk>, top_n: usize) -> Ranked {
        if let Some(provider) = self.provider {
            match rerank_with_provider(provider, query, &candidates, top_n).await {
                Ok(order) => return take_order(&candidates, order, RerankMethod::CrossEncoder),
                Err(e) => tracing::warn!(
                    "{} rerank failed, falling back to LLM: {e:#}",
                    provider.name()
                ),
            }
        }

        if let Some(generator) = self.generator {
            match rerank_with_llm(generator, query, &candidates, top_n).await {
                Ok(LlmSelection::Selected(order)) => {
                    return take_order(&candidates, order, RerankMethod::Llm)
                }
                Ok(LlmSelection::Unusable(detail)) => {
                    tracing::warn!("LLM rerank output unusable, keeping original order: {detail}");
                    let mut ranked = passthrough(candidates, top_n);
                    for item in &mut ranked.items {
                        item.1 = 1.0;
                        item.2 = "llm_parse_error".to_string();
                    }
                    ranked.method = RerankMethod::LlmFallback;
                    ranked.stats.parse_error = Some(detail);
                    return ranked;
                }
                Err(e) => tracing::warn!("LLM rerank failed, using passthrough: {e:#}"),
            }
        }

        passthrough(candidates, top_n)
    }
}

/// An ordered selection of candidate indices with scores and reasons.
type Order = Vec<(usize, f64, String)>;

fn take_order(candidates: &[ScoredChunk], order: Order, method: RerankMethod) -> Ranked {
    let mut stats = RerankStats::default();
    match method {
        RerankMethod::CrossEncoder => stats.provider_results = Some(order.len()),
        RerankMethod::Llm => stats.llm_selected = Some(order.len()),
        _ => {}
    }
    Ranked {
        items: order
            .into_iter()
            .map(|(i, score, reason)| (candidates[i].clone(), score, reason))
            .collect(),
        method,
        stats,
    }
}

fn passthrough(candidates: Vec<ScoredChunk>, top_n: usize) -> Ranked {
    Ranked {
        items: candidates
            .into_iter()
            .take(top_n)
            .map(|sc| {
                let score = sc.weighted_score;
                (sc, score, "passthrough".to_string())
            })
            .collect(),
        method: RerankMethod::Passthrough,
        stats: RerankStats::default(),
    }
}

async fn rerank_with_provider(
    provider: &dyn RerankProvider,
    query: &str,
    candidates: &[ScoredChunk],
    top_n: usize,
) -> Result<Order> {
    let documents: Vec<String> = candidates
        .iter()
        .map(|sc| truncate_chars(&sc.chunk.content, PROVIDER_DOC_CHARS).to_string())
        .collect();
    let top_n = top_n.min(documents.len());

    let hits = provider.rerank(query, &documents, top_n).await?;
    let mut order: Order = Vec::with_capacity(hits.len());
    for h in hits {
        if h.index >= candidates.len() || order.iter().any(|(i, _, _)| *i == h.index) {
            continue;
        }
        let reason = format!("{}_score={:.3}", provider.name(), h.relevance_score);
        order.push((h.index, h.relevance_score, reason));
    }

    if order.is_empty() {
        return Err(PipelineError::malformed("rerank", "no usable results").into());
    }
    Ok(order)
}

enum LlmSelection {
    Selected(Order),
    /// The model answered but nothing usable could be parsed from it.
    Unusable(String),
}

#[derive(Deserialize)]
struct LlmResponse {
    #[serde(default)]
    selected: Vec<LlmPick>,
}

#[derive(Deserialize)]
struct LlmPick {
    index: i64,
    #[serde(default)]
    reason: Option<String>,
}

fn llm_prompt(query: &str, candidates: &[ScoredChunk], select: usize) -> String {
    let listing = candidates
        .iter()
        .take(LLM_MAX_CANDIDATES)
        .enumerate()
        .map(|(i, sc)| {
            format!(
                "[{i}] ({}) {}\n{}",
                sc.source_type(),
                citation(&sc.chunk, None),
                truncate_chars(&sc.chunk.content, LLM_DOC_CHARS)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "You are a code review assistant. Given a query and candidate evidence snippets, \
select the most relevant ones.\n\n\
Query: {query}\n\n\
Candidates:\n{listing}\n\n\
Instructions:\n\
1. Select the top {select} most relevant candidates for answering the query\n\
2. Prefer candidates that directly address the query topic\n\
3. Include a mix of code/diff and documentation when relevant\n\
4. Output ONLY valid JSON in this exact format:\n\n\
{{\"selected\": [{{\"index\": 0, \"reason\": \"brief reason\"}}, ...]}}\n\n\
Output:"
    )
}

/// Strip a surrounding Markdown code fence (with optional `json` tag).
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = rest.split("```").next().unwrap_or(rest);
    body.strip_prefix("json").unwrap_or(body).trim()
}

async fn rerank_with_llm(
    generator: &dyn TextGenerator,
    query: &str,
    candidates: &[ScoredChunk],
    top_n: usize,
) -> Result<LlmSelection> {
    let select = top_n.min(LLM_MAX_SELECTED);
    let raw = generator
        .complete(LLM_SYSTEM, &llm_prompt(query, candidates, select))
        .await?;

    let parsed: LlmResponse = match serde_json::from_str(strip_code_fence(&raw)) {
        Ok(p) => p,
        Err(e) => return Ok(LlmSelection::Unusable(e.to_string())),
    };

    let shown = candidates.len().min(LLM_MAX_CANDIDATES);
    let mut order: Order = Vec::new();
    for pick in parsed.selected {
        let Ok(idx) = usize::try_from(pick.index) else {
            continue;
        };
        if idx >= shown || order.iter().any(|(i, _, _)| *i == idx) {
            continue;
        }
        let score = 1.0 - (order.len() + 1) as f64 * 0.05;
        order.push((idx, score, pick.reason.unwrap_or_else(|| "selected".to_string())));
    }

    if order.is_empty() {
        return Ok(LlmSelection::Unusable("no valid selections".to_string()));
    }
    Ok(LlmSelection::Selected(order))
}

fn without_diversity(ranked: Ranked, top_k: usize) -> RerankOutcome {
    let (mut chunks, mut scores) = (Vec::new(), Vec::new());
    for (sc, score, _) in ranked.items.into_iter().take(top_k) {
        chunks.push(sc);
        scores.push(score);
    }
    RerankOutcome {
        reasons: vec!["no_diversity".to_string(); chunks.len()],
        chunks,
        scores,
        method: ranked.method,
        stats: RerankStats {
            diversity_applied: false,
            ..ranked.stats
        },
    }
}

/// Greedy selection with at most [`MAX_CHUNKS_PER_DOC`] chunks per
/// `doc_key`, stopping at `top_k`.
fn apply_diversity(ranked: Ranked, top_k: usize) -> RerankOutcome {
    let input_len = ranked.items.len();
    let mut doc_counts: HashMap<String, usize> = HashMap::new();
    let mut source_distribution: BTreeMap<SourceType, usize> = BTreeMap::new();
    let (mut chunks, mut scores, mut reasons) = (Vec::new(), Vec::new(), Vec::new());

    for (sc, score, reason) in ranked.items {
        if chunks.len() >= top_k {
            break;
        }
        let count = doc_counts.entry(sc.doc_key().to_string()).or_insert(0);
        if *count >= MAX_CHUNKS_PER_DOC {
            continue;
        }
        *count += 1;
        *source_distribution.entry(sc.source_type()).or_insert(0) += 1;
        chunks.push(sc);
        scores.push(score);
        reasons.push(reason);
    }

    let distinct_sources = source_distribution.len();
    let diversity_warning = (distinct_sources < MIN_DISTINCT_SOURCES && input_len > chunks.len())
        .then(|| {
            format!("Only {distinct_sources} distinct sources (min: {MIN_DISTINCT_SOURCES})")
        });

    tracing::debug!(
        selected = chunks.len(),
        docs = doc_counts.len(),
        distinct_sources,
        "Diversity applied"
    );

    RerankOutcome {
        chunks,
        scores,
        reasons,
        method: ranked.method,
        stats: RerankStats {
            diversity_applied: true,
            distinct_sources,
            source_distribution,
            docs_represented: doc_counts.len(),
            diversity_warning,
            ..ranked.stats
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test_support::{chunk, scored};
    use std::sync::Mutex;

    fn cand(id: &str, st: SourceType, path: &str, w: f64) -> ScoredChunk {
        scored(id, chunk(st, path, &format!("content of {id}")), w)
    }

    fn pool() -> Vec<ScoredChunk> {
        vec![
            cand("a1", SourceType::Code, "a.py", 0.9),
            cand("a2", SourceType::Code, "a.py", 0.8),
            cand("a3", SourceType::Code, "a.py", 0.7),
            cand("b1", SourceType::RepoDoc, "README.md", 0.6),
            cand("n1", SourceType::Notion, "page-1", 0.5),
        ]
    }

    fn ids(out: &RerankOutcome) -> Vec<&str> {
        out.chunks.iter().map(|c| c.id.as_str()).collect()
    }

    struct Reverse;

    #[async_trait]
    impl RerankProvider for Reverse {
        fn name(&self) -> &str {
            "reverse"
        }
        async fn rerank(&self, _q: &str, docs: &[String], top_n: usize) -> Result<Vec<RerankHit>> {
            Ok((0..docs.len())
                .rev()
                .take(top_n)
                .enumerate()
                .map(|(rank, index)| RerankHit {
                    index,
                    relevance_score: 1.0 - rank as f64 * 0.1,
                })
                .collect())
        }
    }

    /// Returns the first candidate twice, then the README chunk.
    struct Repeating;

    #[async_trait]
    impl RerankProvider for Repeating {
        fn name(&self) -> &str {
            "repeating"
        }
        async fn rerank(&self, _q: &str, _d: &[String], _n: usize) -> Result<Vec<RerankHit>> {
            Ok([(0, 1.0), (0, 0.9), (3, 0.8)]
                .into_iter()
                .map(|(index, relevance_score)| RerankHit { index, relevance_score })
                .collect())
        }
    }

    struct Failing;

    #[async_trait]
    impl RerankProvider for Failing {
        fn name(&self) -> &str {
            "failing"
        }
        async fn rerank(&self, _q: &str, _d: &[String], _n: usize) -> Result<Vec<RerankHit>> {
            anyhow::bail!("connection refused")
        }
    }

    struct Scripted {
        reply: String,
        prompts: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl TextGenerator for Scripted {
        fn model_name(&self) -> &str {
            "scripted"
        }
        async fn complete(&self, _system: &str, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(self.reply.clone())
        }
    }

    #[tokio::test]
    async fn test_diversity_caps_chunks_per_doc() {
        let r = Reranker::new(None, None, RerankSettings::default());
        let out = r.rerank("q", pool(), 4).await;
        assert_eq!(out.method, RerankMethod::Passthrough);
        assert_eq!(ids(&out), vec!["a1", "a2", "b1", "n1"]);
        assert_eq!(out.stats.distinct_sources, 3);
        assert_eq!(out.stats.docs_represented, 3);
        assert!(out.stats.diversity_warning.is_none());
        assert_eq!(out.scores, vec![0.9, 0.8, 0.6, 0.5]);
    }

    #[tokio::test]
    async fn test_diversity_warning_when_single_source() {
        let candidates = vec![
            cand("a1", SourceType::Code, "a.py", 0.9),
            cand("a2", SourceType::Code, "a.py", 0.8),
            cand("a3", SourceType::Code, "a.py", 0.7),
        ];
        let r = Reranker::new(None, None, RerankSettings::default());
        let out = r.rerank("q", candidates, 2).await;
        assert_eq!(out.chunks.len(), 2);
        assert_eq!(out.stats.distinct_sources, 1);
        assert!(out.stats.diversity_warning.is_some());
    }

    #[tokio::test]
    async fn test_cross_encoder_order_and_scores_kept() {
        let r = Reranker::new(Some(&Reverse), None, RerankSettings::default());
        let out = r.rerank("q", pool(), 2).await;
        assert_eq!(out.method, RerankMethod::CrossEncoder);
        // top_n = 4 of 5 reversed: n1, b1, a3, a2
        assert_eq!(ids(&out), vec!["n1", "b1"]);
        assert_eq!(out.scores, vec![1.0, 0.9]);
        assert!(out.reasons[0].starts_with("reverse_score="));
    }

    #[tokio::test]
    async fn test_repeated_provider_indices_dropped() {
        let r = Reranker::new(Some(&Repeating), None, RerankSettings::default());
        let out = r.rerank("q", pool(), 2).await;
        assert_eq!(out.method, RerankMethod::CrossEncoder);
        assert_eq!(ids(&out), vec!["a1", "b1"]);
        assert_eq!(out.scores, vec![1.0, 0.8]);
    }

    #[tokio::test]
    async fn test_provider_failure_falls_back_to_llm() {
        let llm = Scripted::new(
            "```json\n{\"selected\": [{\"index\": 3, \"reason\": \"docs\"}, {\"index\": 0}]}\n```",
        );
        let r = Reranker::new(Some(&Failing), Some(&llm), RerankSettings::default());
        let out = r.rerank("q", pool(), 4).await;
        assert_eq!(out.method, RerankMethod::Llm);
        assert_eq!(ids(&out), vec!["b1", "a1"]);
        assert_eq!(out.reasons, vec!["docs", "selected"]);
        assert!((out.scores[0] - 0.95).abs() < 1e-9);
        let prompt = &llm.prompts.lock().unwrap()[0];
        assert!(prompt.contains("Select the top 8 most relevant"));
        assert!(prompt.contains("[4] (notion) page-1"));
    }

    #[tokio::test]
    async fn test_unparseable_llm_output_is_llm_fallback() {
        let llm = Scripted::new("I think candidate 2 is best.");
        let r = Reranker::new(None, Some(&llm), RerankSettings::default());
        let out = r.rerank("q", pool(), 2).await;
        assert_eq!(out.method, RerankMethod::LlmFallback);
        assert_eq!(ids(&out), vec!["a1", "a2"]);
        assert!(out.reasons.iter().all(|r| r == "llm_parse_error"));
        assert!(out.stats.parse_error.is_some());
    }

    #[tokio::test]
    async fn test_disabled_is_passthrough_without_diversity() {
        let settings = RerankSettings {
            enabled: false,
            diversity: false,
        };
        let r = Reranker::new(Some(&Reverse), None, settings);
        let out = r.rerank("q", pool(), 3).await;
        assert_eq!(out.method, RerankMethod::Passthrough);
        assert_eq!(ids(&out), vec!["a1", "a2", "a3"]);
        assert!(out.reasons.iter().all(|r| r == "no_diversity"));
        assert!(!out.stats.diversity_applied);
    }

    #[tokio::test]
    async fn test_empty_candidates() {
        let r = Reranker::new(Some(&Reverse), None, RerankSettings::default());
        let out = r.rerank("q", Vec::new(), 5).await;
        assert_eq!(out.method, RerankMethod::Passthrough);
        assert!(out.chunks.is_empty());
        assert!(out.stats.diversity_warning.is_none());
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```\n[]\n```"), "[]");
        assert_eq!(strip_code_fence("  {}  "), "{}");
    }
}

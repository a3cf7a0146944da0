//! Structured retrieval reports.
//!
//! After a query runs, [`build_report`] condenses the retrieval stats and
//! the rerank outcome into a [`RetrievalLogEntry`] plus one
//! [`ChunkLogEntry`] per selected chunk. [`log_report`] emits them through
//! `tracing` (summary at info, full JSON and per-chunk lines at debug) and
//! [`format_eval`] renders them for the `eval` command.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::answer::truncate_chars;
use crate::models::SourceType;
use crate::rerank::{RerankMethod, RerankOutcome};
use crate::retrieval::{RetrievalStats, ScopeStats};

#[derive(Debug, Clone, Serialize)]
pub struct RetrievalLogEntry {
    pub timestamp: DateTime<Utc>,
    /// Query text, truncated to 200 characters.
    pub query: String,
    pub query_length: usize,
    pub intent: String,
    pub intent_confidence: f64,
    pub scope_stats: Vec<ScopeStats>,
    pub total_candidates: usize,
    pub merged_candidates: usize,
    pub rerank_method: RerankMethod,
    pub final_count: usize,
    pub source_distribution: BTreeMap<SourceType, usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChunkLogEntry {
    pub rank: usize,
    pub source_type: SourceType,
    pub doc_key: String,
    pub raw_score: f64,
    pub normalized_score: f64,
    pub weighted_score: f64,
    pub rerank_score: Option<f64>,
    pub rerank_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RetrievalReport {
    pub retrieval: RetrievalLogEntry,
    pub chunks: Vec<ChunkLogEntry>,
}

pub fn build_report(
    query: &str,
    stats: &RetrievalStats,
    rerank: &RerankOutcome,
    latency_ms: Option<f64>,
) -> RetrievalReport {
    let mut source_distribution = BTreeMap::new();
    for sc in &rerank.chunks {
        *source_distribution.entry(sc.source_type()).or_insert(0) += 1;
    }

    let retrieval = RetrievalLogEntry {
        timestamp: Utc::now(),
        query: truncate_chars(query, 200).to_string(),
        query_length: stats.query_length,
        intent: stats.intent.as_str().to_string(),
        intent_confidence: stats.intent_confidence,
        scope_stats: stats.scopes.clone(),
        total_candidates: stats.total_candidates,
        merged_candidates: stats.merged_candidates,
        rerank_method: rerank.method,
        final_count: rerank.chunks.len(),
        source_distribution,
        latency_ms,
    };

    let chunks = rerank
        .chunks
        .iter()
        .enumerate()
        .map(|(i, sc)| ChunkLogEntry {
            rank: i + 1,
            source_type: sc.source_type(),
            doc_key: truncate_chars(sc.doc_key(), 50).to_string(),
            raw_score: sc.raw_score,
            normalized_score: sc.normalized_score,
            weighted_score: sc.weighted_score,
            rerank_score: rerank.scores.get(i).copied(),
            rerank_reason: rerank.reasons.get(i).cloned(),
        })
        .collect();

    RetrievalReport { retrieval, chunks }
}

fn distribution_text(dist: &BTreeMap<SourceType, usize>) -> String {
    let inner = dist
        .iter()
        .map(|(st, n)| format!("{st}: {n}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!("{{{inner}}}")
}

pub fn log_report(report: &RetrievalReport) {
    let entry = &report.retrieval;
    tracing::info!(
        intent = %entry.intent,
        candidates = entry.total_candidates,
        final_count = entry.final_count,
        method = entry.rerank_method.as_str(),
        sources = %distribution_text(&entry.source_distribution),
        "RAG retrieval"
    );

    if tracing::enabled!(tracing::Level::DEBUG) {
        if let Ok(json) = serde_json::to_string_pretty(entry) {
            tracing::debug!("RAG retrieval detail: {json}");
        }
        for c in &report.chunks {
            tracing::debug!(
                "  [{}] {} | {} | raw={:.3} norm={:.3} weighted={:.3}",
                c.rank,
                c.source_type,
                c.doc_key,
                c.raw_score,
                c.normalized_score,
                c.weighted_score
            );
        }
    }
}

/// Human-readable summary used by the `eval` command.
pub fn format_eval(report: &RetrievalReport) -> String {
    let e = &report.retrieval;
    let rule = "=".repeat(60);
    let mut lines = vec![
        rule.clone(),
        format!("Query: {}", e.query),
        format!(
            "Intent: {} (confidence: {:.2})",
            e.intent, e.intent_confidence
        ),
        format!(
            "Candidates: {} → {} → {}",
            e.total_candidates, e.merged_candidates, e.final_count
        ),
        format!("Method: {}", e.rerank_method.as_str()),
        format!("Sources: {}", distribution_text(&e.source_distribution)),
        "-".repeat(60),
        "Top chunks:".to_string(),
    ];

    for c in report.chunks.iter().take(10) {
        lines.push(format!(
            "  [{}] {:10} | {:40} | score={:.3}",
            c.rank,
            c.source_type.as_str(),
            truncate_chars(&c.doc_key, 40),
            c.weighted_score
        ));
    }

    lines.push(rule);
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::QueryIntent;
    use crate::models::test_support::{chunk, scored};
    use crate::rerank::RerankStats;

    fn sample() -> RetrievalReport {
        let stats = RetrievalStats {
            query_length: 21,
            intent: QueryIntent::ImplementationDebug,
            intent_confidence: 0.5,
            scopes: Vec::new(),
            total_candidates: 12,
            merged_candidates: 10,
            failed_scopes: 0,
        };
        let rerank = RerankOutcome {
            chunks: vec![
                scored("1", chunk(SourceType::Code, "src/auth.py", "a"), 0.9),
                scored("2", chunk(SourceType::Notion, "page-7", "b"), 0.4),
            ],
            scores: vec![0.95, 0.9],
            reasons: vec!["cohere_score=0.950".into()],
            method: RerankMethod::CrossEncoder,
            stats: RerankStats::default(),
        };
        build_report("why does login fail?", &stats, &rerank, Some(12.5))
    }

    #[test]
    fn test_build_report_counts_sources() {
        let r = sample();
        assert_eq!(r.retrieval.final_count, 2);
        assert_eq!(r.retrieval.source_distribution[&SourceType::Code], 1);
        assert_eq!(r.retrieval.intent, "implementation_debug");
        assert_eq!(r.chunks[0].rank, 1);
        assert_eq!(r.chunks[1].doc_key, "page-7");
        assert_eq!(r.chunks[1].rerank_reason, None);
        assert_eq!(r.chunks[1].rerank_score, Some(0.9));
    }

    #[test]
    fn test_format_eval() {
        let text = format_eval(&sample());
        assert!(text.contains("Intent: implementation_debug (confidence: 0.50)"));
        assert!(text.contains("Candidates: 12 → 10 → 2"));
        assert!(text.contains("Method: cross_encoder"));
        assert!(text.contains("Sources: {code: 1, notion: 1}"));
        assert!(text.contains("[1] code       | src/auth.py"));
    }

    #[test]
    fn test_report_serializes() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["retrieval"]["rerank_method"], "cross_encoder");
        assert_eq!(json["retrieval"]["source_distribution"]["notion"], 1);
    }
}

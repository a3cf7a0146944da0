//! Rules-based query intent classification.
//!
//! A query is routed to one of four intents by counting distinct keyword
//! matches (case-insensitive, whole words). Each intent carries a table of
//! per-[`SourceType`] weights that the retriever multiplies into candidate
//! scores.
//!
//! | intent | notion | repo_doc | code | diff |
//! |--------|--------|----------|------|------|
//! | standards_policy | 1.5 | 1.3 | 0.7 | 0.5 |
//! | implementation_debug | 0.6 | 1.0 | 1.5 | 1.4 |
//! | process | 1.5 | 1.4 | 0.5 | 0.4 |
//! | general | 1.0 | 1.0 | 1.0 | 1.0 |
//!
//! Ties between intents with the same non-zero match count go to the one
//! declared first in [`QueryIntent::ROUTED`].

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::models::SourceType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryIntent {
    StandardsPolicy,
    ImplementationDebug,
    Process,
    General,
}

impl QueryIntent {
    /// Intents that have keyword sets, in tie-break order.
    pub const ROUTED: [QueryIntent; 3] = [
        QueryIntent::StandardsPolicy,
        QueryIntent::ImplementationDebug,
        QueryIntent::Process,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueryIntent::StandardsPolicy => "standards_policy",
            QueryIntent::ImplementationDebug => "implementation_debug",
            QueryIntent::Process => "process",
            QueryIntent::General => "general",
        }
    }

    pub fn keywords(&self) -> &'static [&'static str] {
        match self {
            QueryIntent::StandardsPolicy => &[
                "standard", "standards", "policy", "policies", "guideline", "guidelines",
                "convention", "conventions", "how do we", "how we", "best practice",
                "best practices", "naming", "lint", "linting", "style", "style guide",
                "code style", "formatting", "rule", "rules", "should we", "must we",
                "requirement", "requirements", "compliance", "compliant",
            ],
            QueryIntent::ImplementationDebug => &[
                "error", "errors", "bug", "bugs", "failing", "fail", "failed",
                "stack trace", "stacktrace", "traceback", "exception", "fix", "fixing",
                "why", "implement", "implementing", "implementation", "function", "class",
                "method", "how does", "how do i", "how to", "what does", "where is",
                "debug", "debugging", "issue", "problem", "broken", "crash", "crashing",
                "undefined", "null", "none", "typeerror", "valueerror", "keyerror",
                "attributeerror",
            ],
            QueryIntent::Process => &[
                "deploy", "deployment", "deploying", "incident", "incidents", "runbook",
                "runbooks", "pr process", "pull request process", "approval", "approvals",
                "approve", "merge", "merging", "release", "releasing", "rollback",
                "rollout", "pipeline", "ci", "cd", "ci/cd", "workflow", "workflows",
                "review process", "code review", "on-call", "oncall", "pager", "alert",
                "alerts",
            ],
            QueryIntent::General => &[],
        }
    }

    pub fn scope_weights(&self) -> ScopeWeights {
        let (notion, repo_doc, code, diff) = match self {
            QueryIntent::StandardsPolicy => (1.5, 1.3, 0.7, 0.5),
            QueryIntent::ImplementationDebug => (0.6, 1.0, 1.5, 1.4),
            QueryIntent::Process => (1.5, 1.4, 0.5, 0.4),
            QueryIntent::General => (1.0, 1.0, 1.0, 1.0),
        };
        ScopeWeights(BTreeMap::from([
            (SourceType::Notion, notion),
            (SourceType::RepoDoc, repo_doc),
            (SourceType::Code, code),
            (SourceType::Diff, diff),
        ]))
    }
}

impl fmt::Display for QueryIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Score multipliers per source type. Missing entries weigh `1.0`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScopeWeights(pub BTreeMap<SourceType, f64>);

impl ScopeWeights {
    pub fn uniform() -> Self {
        QueryIntent::General.scope_weights()
    }

    pub fn weight_for(&self, source_type: SourceType) -> f64 {
        self.0.get(&source_type).copied().unwrap_or(1.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntentResult {
    pub intent: QueryIntent,
    /// `0.0` with no matches, else `min(1, matches / max(1, words / 3))`.
    pub confidence: f64,
    /// Lower-cased distinct keywords that matched for the winning intent.
    pub matched_keywords: BTreeSet<String>,
    pub scope_weights: ScopeWeights,
}

impl IntentResult {
    /// The result used when routing is turned off.
    pub fn general() -> Self {
        Self {
            intent: QueryIntent::General,
            confidence: 0.0,
            matched_keywords: BTreeSet::new(),
            scope_weights: ScopeWeights::uniform(),
        }
    }
}

/// Keyword matcher with one compiled pattern per routed intent.
pub struct IntentClassifier {
    patterns: Vec<(QueryIntent, Regex)>,
}

impl IntentClassifier {
    pub fn new() -> Self {
        let patterns = QueryIntent::ROUTED
            .iter()
            .map(|&intent| {
                let mut keywords: Vec<&str> = intent.keywords().to_vec();
                // Longest first so multi-word phrases win over their prefixes.
                keywords.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
                let alternation = keywords
                    .iter()
                    .map(|k| regex::escape(k))
                    .collect::<Vec<_>>()
                    .join("|");
                let re = Regex::new(&format!(r"(?i)\b(?:{alternation})\b"))
                    .expect("keyword pattern from escaped literals");
                (intent, re)
            })
            .collect();
        Self { patterns }
    }

    pub fn classify(&self, query: &str) -> IntentResult {
        let mut best: Option<(QueryIntent, BTreeSet<String>)> = None;

        for (intent, re) in &self.patterns {
            let matches: BTreeSet<String> = re
                .find_iter(query)
                .map(|m| m.as_str().to_lowercase())
                .collect();
            let best_count = best.as_ref().map_or(0, |(_, m)| m.len());
            if matches.len() > best_count {
                best = Some((*intent, matches));
            }
        }

        let result = match best {
            None => IntentResult::general(),
            Some((intent, matched_keywords)) => {
                let words = query.split_whitespace().count() as f64;
                let n = matched_keywords.len() as f64;
                IntentResult {
                    intent,
                    confidence: (n / (words / 3.0).max(1.0)).min(1.0),
                    matched_keywords,
                    scope_weights: intent.scope_weights(),
                }
            }
        };

        tracing::debug!(
            intent = %result.intent,
            confidence = result.confidence,
            matches = ?result.matched_keywords,
            "Classified query"
        );
        result
    }
}

impl Default for IntentClassifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Classify `query` with a freshly built classifier.
///
/// ```rust
/// use factgap_core::{classify_intent, QueryIntent};
///
/// let r = classify_intent("What's our naming convention for API endpoints?");
/// assert_eq!(r.intent, QueryIntent::StandardsPolicy);
/// ```
pub fn classify_intent(query: &str) -> IntentResult {
    IntentClassifier::new().classify(query)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standards_query() {
        let r = classify_intent("What's our naming convention for API endpoints?");
        assert_eq!(r.intent, QueryIntent::StandardsPolicy);
        assert!(r.matched_keywords.contains("naming"));
        assert!(r.matched_keywords.contains("convention"));
        assert!(r.confidence > 0.0 && r.confidence <= 1.0);
        assert_eq!(r.scope_weights.weight_for(SourceType::Notion), 1.5);
    }

    #[test]
    fn test_debug_query() {
        let r = classify_intent("Why is this function throwing a TypeError?");
        assert_eq!(r.intent, QueryIntent::ImplementationDebug);
        assert!(r.matched_keywords.contains("typeerror"));
        assert_eq!(r.scope_weights.weight_for(SourceType::Code), 1.5);
    }

    #[test]
    fn test_process_query() {
        let r = classify_intent("How do we deploy to production? Walk me through the release.");
        assert_eq!(r.intent, QueryIntent::Process);
    }

    #[test]
    fn test_no_match_is_general() {
        let r = classify_intent("Tell me about the weather");
        assert_eq!(r, IntentResult::general());
        assert_eq!(r.confidence, 0.0);
    }

    #[test]
    fn test_reference_queries() {
        let r = classify_intent("What are our naming conventions?");
        assert_eq!(r.intent, QueryIntent::StandardsPolicy);
        assert!(r.confidence > 0.0);
        assert!(r.matched_keywords.contains("conventions"));
        assert!(
            r.scope_weights.weight_for(SourceType::Notion)
                > r.scope_weights.weight_for(SourceType::Code)
        );

        assert_eq!(
            classify_intent("How does the authentication function work?").intent,
            QueryIntent::ImplementationDebug
        );
        assert_eq!(
            classify_intent("What is the deployment process?").intent,
            QueryIntent::Process
        );

        let r = classify_intent("Hello world");
        assert_eq!(r.intent, QueryIntent::General);
        assert_eq!(r.confidence, 0.0);
        assert!(r.matched_keywords.is_empty());
    }

    #[test]
    fn test_word_boundaries() {
        // "styles" and "bugsy" are not whole-word keyword hits.
        let r = classify_intent("bugsy stylesheet");
        assert_eq!(r.intent, QueryIntent::General);
    }

    #[test]
    fn test_tie_goes_to_first_declared() {
        // one standards hit ("policy"), one process hit ("deploy")
        let r = classify_intent("policy deploy");
        assert_eq!(r.intent, QueryIntent::StandardsPolicy);
    }

    #[test]
    fn test_confidence_formula() {
        // two matches in a three-word query: min(1, 2 / max(1, 1)) = 1
        assert_eq!(classify_intent("fix bug now").confidence, 1.0);
        // one match in twelve words: 1 / 4
        let r = classify_intent("please could you explain where the rollback steps live for us today");
        assert_eq!(r.intent, QueryIntent::Process);
        assert!((r.confidence - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_case_insensitive() {
        let r = classify_intent("STACK TRACE from the Worker");
        assert!(r.matched_keywords.contains("stack trace"));
    }
}

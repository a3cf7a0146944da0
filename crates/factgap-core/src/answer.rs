//! Evidence formatting and answer composition.
//!
//! Answers are generated from reranked evidence by a [`TextGenerator`]
//! under strict citation rules. When no evidence survives retrieval the
//! composer returns [`NO_EVIDENCE_MESSAGE`] without calling the model; when
//! generation fails it falls back to a deterministic template that quotes
//! the evidence directly.

use serde::Serialize;

use crate::models::{Chunk, ScoredChunk, SourceType};
use crate::rerank::TextGenerator;

pub const NO_EVIDENCE_MESSAGE: &str = "I couldn't find relevant evidence to answer your question. \
Please try rephrasing or check if the relevant code/docs are indexed.";

const MAX_EVIDENCE_ITEMS: usize = 8;
const EVIDENCE_CHARS: usize = 500;

const ANSWER_SYSTEM: &str = "You are an expert code reviewer. Cite your sources.";
const ANALYSIS_SYSTEM: &str = "You are an expert code reviewer who follows the Fact Gap philosophy: \
hard claims must be backed by citations.";

/// First `max` characters of `s`.
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Short commit reference: the first 8 characters of a SHA.
pub fn short_sha(sha: &str) -> &str {
    truncate_chars(sha, 8)
}

/// Citation for a chunk.
///
/// File-scoped chunks cite `path:start-end @ sha8` (`unknown` for a missing
/// line range or SHA); Notion chunks cite their URL, else their page id.
/// `head_sha` overrides the chunk's own SHA when given.
pub fn citation(chunk: &Chunk, head_sha: Option<&str>) -> String {
    match chunk.source_type {
        SourceType::Code | SourceType::Diff | SourceType::RepoDoc => {
            let path = chunk.path.as_deref().unwrap_or("unknown");
            let lines = match (chunk.start_line, chunk.end_line) {
                (Some(s), Some(e)) => format!("{s}-{e}"),
                _ => "unknown".to_string(),
            };
            let sha = head_sha
                .or(chunk.head_sha.as_deref())
                .map(short_sha)
                .unwrap_or("unknown");
            format!("{path}:{lines} @ {sha}")
        }
        SourceType::Notion => chunk
            .url
            .as_deref()
            .filter(|u| !u.is_empty())
            .or(chunk.source_id.as_deref())
            .unwrap_or("unknown")
            .to_string(),
    }
}

/// Render up to eight evidence items as Markdown for a prompt.
pub fn format_evidence(evidence: &[ScoredChunk], head_sha: Option<&str>) -> String {
    if evidence.is_empty() {
        return "No evidence found.".to_string();
    }
    evidence
        .iter()
        .take(MAX_EVIDENCE_ITEMS)
        .enumerate()
        .map(|(i, sc)| {
            format!(
                "### Evidence {} ({}, score: {:.2})\n**Citation:** `{}`\n```\n{}\n```\n",
                i + 1,
                sc.source_type(),
                sc.weighted_score,
                citation(&sc.chunk, head_sha),
                truncate_chars(&sc.chunk.content, EVIDENCE_CHARS),
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Deterministic answer quoting the top three evidence items.
pub fn fallback_answer(question: &str, evidence: &[ScoredChunk]) -> String {
    if evidence.is_empty() {
        return NO_EVIDENCE_MESSAGE.to_string();
    }
    let mut parts = vec![format!(
        "Based on the available evidence for your question: *{question}*\n"
    )];
    for (i, sc) in evidence.iter().take(3).enumerate() {
        parts.push(format!(
            "**{}. From {}** (`{}`):",
            i + 1,
            sc.source_type(),
            citation(&sc.chunk, None)
        ));
        parts.push(format!("```\n{}\n```\n", truncate_chars(&sc.chunk.content, 400)));
    }
    parts.push("If you need more specific information, please clarify your question.".to_string());
    parts.join("\n")
}

/// Deterministic PR summary listing the top five evidence items.
pub fn fallback_analysis(pr_title: &str, head_sha: &str, evidence: &[ScoredChunk]) -> String {
    let mut parts = vec![
        "## PR Analysis Summary".to_string(),
        format!("- **PR:** {pr_title}"),
        format!("- **SHA:** {}", short_sha(head_sha)),
        String::new(),
        "## Retrieved Evidence".to_string(),
    ];
    if evidence.is_empty() {
        parts.push("No relevant evidence found.".to_string());
    }
    for (i, sc) in evidence.iter().take(5).enumerate() {
        parts.push(format!(
            "\n### {}. {} (`{}`)",
            i + 1,
            sc.source_type(),
            citation(&sc.chunk, Some(head_sha))
        ));
        parts.push(format!("```\n{}\n```", truncate_chars(&sc.chunk.content, 300)));
    }
    parts.join("\n")
}

fn answer_prompt(question: &str, evidence_text: &str) -> String {
    format!(
        "Answer this question. Use only the provided evidence.\n\n\
**IMPORTANT - Fact Gap Rules:**\n\
- Every claim MUST be backed by a citation from the evidence\n\
- Repo citations: `path:line-line @ sha`\n\
- Notion citations: `url`\n\
- If you cannot answer from the evidence, say so\n\n\
## Question\n{question}\n\n\
## Evidence\n{evidence_text}\n\n\
Provide a concise, well-cited answer."
    )
}

fn analysis_prompt(pr_title: &str, pr_body: &str, head_sha: &str, evidence_text: &str) -> String {
    let body = if pr_body.trim().is_empty() {
        "No description provided"
    } else {
        pr_body
    };
    format!(
        "You are an expert code reviewer. Analyze this PR and provide a review.\n\n\
**IMPORTANT - Fact Gap Rules:**\n\
- Every hard claim (using words like \"must\", \"violates\", \"policy\") MUST include a citation\n\
- Repo citations format: `path:line-line @ sha`\n\
- Notion citations format: `url (edited: timestamp)`\n\
- If you cannot find evidence, say \"no evidence found\" instead of making claims\n\n\
## PR Information\n**Title:** {pr_title}\n**Description:** {body}\n**Head SHA:** {}\n\n\
## Retrieved Evidence\n{evidence_text}\n\n\
## Your Task\n\
1. Summarize the changes\n\
2. Identify any security, performance, or breaking change risks (with citations)\n\
3. Check alignment with team standards (cite Notion docs if applicable)\n\
4. Provide actionable feedback\n\n\
Format your response in Markdown.",
        short_sha(head_sha)
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerMethod {
    /// Produced by the text generator.
    Generated,
    /// Deterministic template (no generator, or generation failed).
    Template,
    /// Nothing was retrieved; the fixed no-evidence message.
    NoEvidence,
}

#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub text: String,
    pub method: AnswerMethod,
}

/// Turns evidence into a cited answer or PR analysis.
pub struct AnswerComposer<'a> {
    generator: Option<&'a dyn TextGenerator>,
}

impl<'a> AnswerComposer<'a> {
    pub fn new(generator: Option<&'a dyn TextGenerator>) -> Self {
        Self { generator }
    }

    pub async fn answer(
        &self,
        question: &str,
        head_sha: Option<&str>,
        evidence: &[ScoredChunk],
    ) -> Answer {
        if evidence.is_empty() {
            return Answer {
                text: NO_EVIDENCE_MESSAGE.to_string(),
                method: AnswerMethod::NoEvidence,
            };
        }

        if let Some(generator) = self.generator {
            let prompt = answer_prompt(question, &format_evidence(evidence, head_sha));
            match generator.complete(ANSWER_SYSTEM, &prompt).await {
                Ok(text) if !text.trim().is_empty() => {
                    return Answer {
                        text,
                        method: AnswerMethod::Generated,
                    }
                }
                Ok(_) => tracing::warn!("Generator returned an empty answer, using template"),
                Err(e) => tracing::warn!("Answer generation failed, using template: {e:#}"),
            }
        }

        Answer {
            text: fallback_answer(question, evidence),
            method: AnswerMethod::Template,
        }
    }

    pub async fn analyze(
        &self,
        pr_title: &str,
        pr_body: &str,
        head_sha: &str,
        evidence: &[ScoredChunk],
    ) -> Answer {
        if let Some(generator) = self.generator {
            let prompt = analysis_prompt(
                pr_title,
                pr_body,
                head_sha,
                &format_evidence(evidence, Some(head_sha)),
            );
            match generator.complete(ANALYSIS_SYSTEM, &prompt).await {
                Ok(text) if !text.trim().is_empty() => {
                    return Answer {
                        text,
                        method: AnswerMethod::Generated,
                    }
                }
                Ok(_) => tracing::warn!("Generator returned an empty analysis, using template"),
                Err(e) => tracing::warn!("Analysis generation failed, using template: {e:#}"),
            }
        }

        Answer {
            text: fallback_analysis(pr_title, head_sha, evidence),
            method: AnswerMethod::Template,
        }
    }
}

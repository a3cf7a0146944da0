//! Typed failures raised inside the core pipelines.
//!
//! Most functions return `anyhow::Result`; these variants exist for the
//! cases callers need to tell apart, chiefly malformed provider output,
//! which triggers the next fallback tier instead of aborting a request.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// A provider answered, but the payload could not be used.
    #[error("Malformed {provider} response: {detail}")]
    MalformedResponse {
        /// Which capability produced the payload (e.g. `"embedding"`).
        provider: &'static str,
        detail: String,
    },

    /// The embedding provider returned vectors of an unexpected size.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Arguments to a core operation disagree with each other.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unknown source type: {0}")]
    UnknownSourceType(String),
}

impl PipelineError {
    pub fn malformed(provider: &'static str, detail: impl Into<String>) -> Self {
        Self::MalformedResponse {
            provider,
            detail: detail.into(),
        }
    }
}

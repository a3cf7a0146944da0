//! Hosted cross-encoder rerank provider.
//!
//! [`CohereReranker`] calls `POST /v1/rerank` and hands the hits back to
//! [`factgap_core::rerank::Reranker`], which owns the cascade (provider,
//! then LLM, then passthrough) and the diversity pass.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Deserialize;

use factgap_core::rerank::{RerankHit, RerankProvider};
use factgap_core::PipelineError;

use crate::config::RerankConfig;
use crate::http::{self, JsonEndpoint};

const COHERE_URL: &str = "https://api.cohere.ai/v1/rerank";

pub struct CohereReranker {
    model: String,
    api_key: String,
    timeout_secs: u64,
    max_retries: u32,
}

impl CohereReranker {
    /// Requires `COHERE_API_KEY`.
    pub fn new(config: &RerankConfig) -> Result<Self> {
        Ok(Self {
            model: config.model.clone(),
            api_key: http::api_key("COHERE_API_KEY")?,
            timeout_secs: config.timeout_secs,
            max_retries: config.max_retries,
        })
    }
}

#[derive(Deserialize)]
struct CohereResponse {
    results: Vec<RerankHit>,
}

/// Parse a Cohere rerank body. Hits pointing outside the submitted
/// document list are dropped.
pub fn parse_cohere_response(json: serde_json::Value, documents: usize) -> Result<Vec<RerankHit>> {
    let parsed: CohereResponse = serde_json::from_value(json)
        .map_err(|e| PipelineError::malformed("cohere", e.to_string()))?;
    Ok(parsed
        .results
        .into_iter()
        .filter(|hit| hit.index < documents)
        .collect())
}

#[async_trait]
impl RerankProvider for CohereReranker {
    fn name(&self) -> &str {
        "cohere"
    }

    async fn rerank(&self, query: &str, documents: &[String], top_n: usize) -> Result<Vec<RerankHit>> {
        let endpoint = JsonEndpoint {
            label: "Cohere",
            url: COHERE_URL.to_string(),
            bearer: Some(&self.api_key),
            timeout_secs: self.timeout_secs,
            max_retries: self.max_retries,
        };
        let body = serde_json::json!({
            "model": self.model,
            "query": query,
            "documents": documents,
            "top_n": top_n.min(documents.len()),
        });
        let json = http::post_json(&endpoint, &body).await?;
        parse_cohere_response(json, documents.len())
    }
}

/// Build the configured cross-encoder, if any.
///
/// A missing API key is not fatal: the reranker falls through to the
/// next tier, so the provider is simply left out with a warning.
pub fn create_rerank_provider(config: &RerankConfig) -> Result<Option<Box<dyn RerankProvider>>> {
    if !config.enable_rerank {
        return Ok(None);
    }
    match config.provider.as_str() {
        "disabled" => Ok(None),
        "cohere" => match CohereReranker::new(config) {
            Ok(provider) => Ok(Some(Box::new(provider))),
            Err(e) => {
                tracing::warn!("Cohere reranker unavailable: {e}");
                Ok(None)
            }
        },
        other => bail!("Unknown rerank provider: {}", other),
    }
}

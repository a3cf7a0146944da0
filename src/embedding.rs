//! Hosted embedding providers.
//!
//! Implements the core [`Embedder`] trait for:
//! - **[`DisabledEmbedder`]**: returns errors; used when embeddings are not configured.
//! - **[`OpenAiEmbedder`]**: `POST /v1/embeddings`, vectors placed by the
//!   response's `index` field.
//! - **[`OllamaEmbedder`]**: a local Ollama instance's `/api/embed` endpoint.
//!
//! Batching and hash-based skipping happen in
//! [`factgap_core::embedding::BatchEmbedder`]; a provider here answers a
//! single request.

use anyhow::{bail, Result};
use async_trait::async_trait;

use factgap_core::embedding::{Embedder, IndexedEmbedding};
use factgap_core::PipelineError;

use crate::config::EmbeddingConfig;
use crate::http::{self, JsonEndpoint};

const OPENAI_URL: &str = "https://api.openai.com/v1";
const OLLAMA_URL: &str = "http://localhost:11434";

/// Provider used when `embedding.provider = "disabled"`.
pub struct DisabledEmbedder;

#[async_trait]
impl Embedder for DisabledEmbedder {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed(&self, _texts: &[String]) -> Result<Vec<IndexedEmbedding>> {
        bail!("Embedding provider is disabled; set [embedding] provider in the config")
    }
}

pub struct OpenAiEmbedder {
    model: String,
    dims: usize,
    base_url: String,
    api_key: String,
    timeout_secs: u64,
    max_retries: u32,
}

impl OpenAiEmbedder {
    /// Requires `embedding.model` and `OPENAI_API_KEY`.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for OpenAI provider"))?;
        Ok(Self {
            model,
            dims: config.dims.unwrap_or(0),
            base_url: config.url.clone().unwrap_or_else(|| OPENAI_URL.to_string()),
            api_key: http::api_key("OPENAI_API_KEY")?,
            timeout_secs: config.timeout_secs,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<IndexedEmbedding>> {
        let endpoint = JsonEndpoint {
            label: "OpenAI",
            url: format!("{}/embeddings", self.base_url.trim_end_matches('/')),
            bearer: Some(&self.api_key),
            timeout_secs: self.timeout_secs,
            max_retries: self.max_retries,
        };
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let json = http::post_json(&endpoint, &body).await?;
        parse_openai_response(&json)
    }
}

fn parse_vector(value: &serde_json::Value, provider: &'static str) -> Result<Vec<f32>> {
    let items = value
        .as_array()
        .ok_or_else(|| PipelineError::malformed(provider, "embedding is not an array"))?;
    items
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| {
                    anyhow::Error::from(PipelineError::malformed(provider, "non-numeric embedding value"))
                })
        })
        .collect()
}

/// Extract `data[] {index, embedding}` pairs. Items without an `index`
/// take their array position.
pub fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<IndexedEmbedding>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| PipelineError::malformed("openai", "missing data array"))?;

    data.iter()
        .enumerate()
        .map(|(pos, item)| -> Result<IndexedEmbedding> {
            let index = item
                .get("index")
                .and_then(|i| i.as_u64())
                .map_or(pos, |i| i as usize);
            let embedding = item
                .get("embedding")
                .ok_or_else(|| PipelineError::malformed("openai", "missing embedding"))?;
            Ok(IndexedEmbedding {
                index,
                vector: parse_vector(embedding, "openai")?,
            })
        })
        .collect()
}

pub struct OllamaEmbedder {
    model: String,
    dims: usize,
    url: String,
    timeout_secs: u64,
    max_retries: u32,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for Ollama provider"))?;
        Ok(Self {
            model,
            dims: config.dims.unwrap_or(0),
            url: config.url.clone().unwrap_or_else(|| OLLAMA_URL.to_string()),
            timeout_secs: config.timeout_secs,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<IndexedEmbedding>> {
        let endpoint = JsonEndpoint {
            label: "Ollama",
            url: format!("{}/api/embed", self.url.trim_end_matches('/')),
            bearer: None,
            timeout_secs: self.timeout_secs,
            max_retries: self.max_retries,
        };
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let json = http::post_json(&endpoint, &body).await?;
        parse_ollama_response(&json)
    }
}

/// Ollama answers in input order; positions become indices.
pub fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<IndexedEmbedding>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| PipelineError::malformed("ollama", "missing embeddings array"))?;

    embeddings
        .iter()
        .enumerate()
        .map(|(index, e)| -> Result<IndexedEmbedding> {
            Ok(IndexedEmbedding {
                index,
                vector: parse_vector(e, "ollama")?,
            })
        })
        .collect()
}

/// Create the configured [`Embedder`].
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledEmbedder`] |
/// | `"openai"` | [`OpenAiEmbedder`] |
/// | `"ollama"` | [`OllamaEmbedder`] |
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Box<dyn Embedder>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledEmbedder)),
        "openai" => Ok(Box::new(OpenAiEmbedder::new(config)?)),
        "ollama" => Ok(Box::new(OllamaEmbedder::new(config)?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_openai_response_keeps_indices() {
        let json = json!({
            "data": [
                {"index": 1, "embedding": [0.5, 0.25]},
                {"index": 0, "embedding": [1.0, 0.0]}
            ]
        });
        let parsed = parse_openai_response(&json).unwrap();
        assert_eq!(parsed[0].index, 1);
        assert_eq!(parsed[0].vector, vec![0.5, 0.25]);
        assert_eq!(parsed[1].index, 0);
    }

    #[test]
    fn test_openai_response_missing_data() {
        let err = parse_openai_response(&json!({"error": "nope"})).unwrap_err();
        assert!(err.to_string().contains("missing data array"));
    }

    #[test]
    fn test_ollama_response_positions() {
        let json = json!({"embeddings": [[1.0, 2.0], [3.0, 4.0]]});
        let parsed = parse_ollama_response(&json).unwrap();
        assert_eq!(parsed[1].index, 1);
        assert_eq!(parsed[1].vector, vec![3.0, 4.0]);
    }

    #[test]
    fn test_non_numeric_value_is_malformed() {
        let json = json!({"embeddings": [[1.0, "x"]]});
        assert!(parse_ollama_response(&json).is_err());
    }

    #[tokio::test]
    async fn test_disabled_embedder_errors() {
        let err = DisabledEmbedder.embed(&["a".to_string()]).await.unwrap_err();
        assert!(err.to_string().contains("disabled"));
    }
}

//! Chat-completion text generator.
//!
//! One [`OpenAiGenerator`] serves answer composition, PR analysis and the
//! LLM rerank tier. Any OpenAI-compatible `/chat/completions` endpoint
//! works via `generation.url`.

use anyhow::{bail, Result};
use async_trait::async_trait;

use factgap_core::rerank::TextGenerator;
use factgap_core::PipelineError;

use crate::config::GenerationConfig;
use crate::http::{self, JsonEndpoint};

const OPENAI_URL: &str = "https://api.openai.com/v1";

pub struct OpenAiGenerator {
    model: String,
    base_url: String,
    api_key: String,
    temperature: f64,
    timeout_secs: u64,
    max_retries: u32,
}

impl OpenAiGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        Ok(Self {
            model: config.model.clone(),
            base_url: config.url.clone().unwrap_or_else(|| OPENAI_URL.to_string()),
            api_key: http::api_key("OPENAI_API_KEY")?,
            temperature: config.temperature,
            timeout_secs: config.timeout_secs,
            max_retries: config.max_retries,
        })
    }
}

/// Pull `choices[0].message.content` out of a chat completion.
pub fn parse_chat_response(json: &serde_json::Value) -> Result<String> {
    let content = json
        .pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .ok_or_else(|| PipelineError::malformed("openai", "missing choices[0].message.content"))?;
    Ok(content.trim().to_string())
}

#[async_trait]
impl TextGenerator for OpenAiGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, system: &str, prompt: &str) -> Result<String> {
        let endpoint = JsonEndpoint {
            label: "OpenAI",
            url: format!("{}/chat/completions", self.base_url.trim_end_matches('/')),
            bearer: Some(&self.api_key),
            timeout_secs: self.timeout_secs,
            max_retries: self.max_retries,
        };
        let body = serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": prompt},
            ],
        });
        let json = http::post_json(&endpoint, &body).await?;
        parse_chat_response(&json)
    }
}

/// Build the configured generator, if any. Without an API key the
/// pipeline runs on templates, so a missing key only warns.
pub fn create_generator(config: &GenerationConfig) -> Result<Option<Box<dyn TextGenerator>>> {
    match config.provider.as_str() {
        "disabled" => Ok(None),
        "openai" => match OpenAiGenerator::new(config) {
            Ok(generator) => Ok(Some(Box::new(generator))),
            Err(e) => {
                tracing::warn!("Text generation unavailable: {e}");
                Ok(None)
            }
        },
        other => bail!("Unknown generation provider: {}", other),
    }
}

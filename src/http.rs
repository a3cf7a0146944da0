//! JSON-over-HTTP with retry, shared by every hosted provider.
//!
//! Retry strategy:
//! - HTTP 429 or 5xx → retry with exponential backoff
//! - HTTP 4xx (not 429) → fail immediately
//! - Network error → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{bail, Result};
use std::time::Duration;

/// One provider endpoint: where to POST and how to authenticate.
pub struct JsonEndpoint<'a> {
    /// Provider name used in error messages (e.g. `"OpenAI"`).
    pub label: &'a str,
    pub url: String,
    pub bearer: Option<&'a str>,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

pub fn client(timeout_secs: u64) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

/// POST `body` and return the parsed JSON response.
pub async fn post_json(
    endpoint: &JsonEndpoint<'_>,
    body: &serde_json::Value,
) -> Result<serde_json::Value> {
    let client = client(endpoint.timeout_secs)?;
    let mut last_err = None;

    for attempt in 0..=endpoint.max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tracing::debug!(
                "{} request retry {}/{} in {:?}",
                endpoint.label,
                attempt,
                endpoint.max_retries,
                delay
            );
            tokio::time::sleep(delay).await;
        }

        let mut request = client
            .post(&endpoint.url)
            .header("Content-Type", "application/json")
            .json(body);
        if let Some(token) = endpoint.bearer {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return Ok(response.json().await?);
                }

                let body_text = response.text().await.unwrap_or_default();
                if status.as_u16() == 429 || status.is_server_error() {
                    last_err = Some(anyhow::anyhow!(
                        "{} API error {}: {}",
                        endpoint.label,
                        status,
                        body_text
                    ));
                    continue;
                }

                bail!("{} API error {}: {}", endpoint.label, status, body_text);
            }
            Err(e) => {
                last_err = Some(anyhow::anyhow!(
                    "{} connection error ({}): {}",
                    endpoint.label,
                    endpoint.url,
                    e
                ));
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| {
        anyhow::anyhow!("{} request failed after retries", endpoint.label)
    }))
}

/// Read a required API key from the environment.
pub fn api_key(var: &str) -> Result<String> {
    match std::env::var(var) {
        Ok(key) if !key.trim().is_empty() => Ok(key),
        _ => bail!("{} environment variable not set", var),
    }
}

//! JSON-over-HTTP calls with exponential backoff, shared by the embedding
//! and language-model providers.
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{anyhow, bail, Result};
use std::time::Duration;

pub(crate) struct JsonEndpoint<'a> {
    pub client: &'a reqwest::Client,
    pub url: &'a str,
    pub bearer: Option<&'a str>,
    /// Service label used in error messages (e.g. `"OpenAI"`).
    pub service: &'a str,
    pub max_retries: u32,
}

impl JsonEndpoint<'_> {
    pub async fn post(&self, body: &serde_json::Value) -> Result<serde_json::Value> {
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = backoff_delay(attempt);
                tracing::debug!(
                    service = self.service,
                    attempt,
                    delay_secs = delay.as_secs(),
                    "retrying request"
                );
                tokio::time::sleep(delay).await;
            }

            let mut request = self
                .client
                .post(self.url)
                .header("Content-Type", "application/json")
                .json(body);
            if let Some(key) = self.bearer {
                request = request.bearer_auth(key);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return Ok(response.json().await?);
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(anyhow!("{} API error {}: {}", self.service, status, body_text));
                        continue;
                    }

                    bail!("{} API error {}: {}", self.service, status, body_text);
                }
                Err(e) => {
                    last_err = Some(anyhow!(
                        "{} connection error ({}): {}",
                        self.service,
                        self.url,
                        e
                    ));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow!("{} request failed after retries", self.service)))
    }
}

pub(crate) fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(1 << (attempt.saturating_sub(1)).min(5))
}

pub(crate) fn build_client(timeout_secs: u64) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

/// Strip a trailing slash so paths can be appended.
pub(crate) fn normalize_base_url(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

//! JSON-over-HTTP POST with exponential backoff.
//!
//! Shared by the chat-completion client and the embedding providers.
//!
//! - HTTP 429 and 5xx: retry
//! - other non-success statuses: fail immediately
//! - network errors and client timeouts: retry
//! - backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use std::time::Duration;

use anyhow::Result;
use webscout_core::error::BackendError;

/// Delay before retry number `attempt` (1-based).
pub fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(1 << attempt.saturating_sub(1).min(5))
}

/// A JSON API endpoint called with retry.
#[derive(Clone)]
pub struct JsonEndpoint {
    client: reqwest::Client,
    /// Names the collaborator in errors and logs.
    label: String,
    url: String,
    bearer: Option<String>,
    timeout_secs: u64,
    max_retries: u32,
}

impl JsonEndpoint {
    pub fn new(
        label: impl Into<String>,
        url: impl Into<String>,
        timeout_secs: u64,
        max_retries: u32,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            client,
            label: label.into(),
            url: url.into(),
            bearer: None,
            timeout_secs,
            max_retries,
        })
    }

    pub fn bearer(mut self, token: Option<String>) -> Self {
        self.bearer = token;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// POST `body` and decode the JSON response.
    pub async fn post(&self, body: &serde_json::Value) -> Result<serde_json::Value, BackendError> {
        let label = self.label.as_str();
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = backoff_delay(attempt);
                tracing::debug!(label, attempt, delay_secs = delay.as_secs(), "retrying request");
                tokio::time::sleep(delay).await;
            }

            let mut request = self
                .client
                .post(&self.url)
                .header("Content-Type", "application/json")
                .json(body);
            if let Some(token) = &self.bearer {
                request = request.header("Authorization", format!("Bearer {}", token));
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response
                            .json::<serde_json::Value>()
                            .await
                            .map_err(|e| BackendError::parse(label, e));
                    }

                    let err = BackendError::Http {
                        backend: self.label.clone(),
                        status: status.as_u16(),
                    };
                    let body_text = response.text().await.unwrap_or_default();
                    tracing::warn!(
                        label,
                        status = status.as_u16(),
                        body = %body_text.chars().take(200).collect::<String>(),
                        "request failed"
                    );
                    if !err.is_retryable() {
                        return Err(err);
                    }
                    last_err = Some(err);
                }
                Err(e) => {
                    let err = if e.is_timeout() {
                        BackendError::timeout(label, self.timeout_secs)
                    } else {
                        BackendError::transport(label, &e)
                    };
                    tracing::warn!(label, error = %err, "request failed");
                    last_err = Some(err);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| BackendError::unavailable(label, "no attempts made")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_schedule() {
        let secs: Vec<u64> = (1..=8).map(|a| backoff_delay(a).as_secs()).collect();
        assert_eq!(secs, vec![1, 2, 4, 8, 16, 32, 32, 32]);
    }

    #[tokio::test]
    async fn test_unreachable_host_is_retryable_failure() {
        let endpoint = JsonEndpoint::new("llm", "http://127.0.0.1:9/v1/chat/completions", 2, 0)
            .unwrap();
        let err = endpoint.post(&serde_json::json!({})).await.unwrap_err();
        assert!(err.is_retryable());
    }
}

//! OpenAI-compatible chat-completion client.
//!
//! Talks to `POST {base_url}/chat/completions` (OpenRouter by default) and
//! implements [`CompletionService`] so the core pipeline can use it for
//! query expansion, escalation tie-breaks and answers.

use anyhow::Result;
use async_trait::async_trait;

use webscout_core::completion::{CompletionRequest, CompletionService};
use webscout_core::error::BackendError;

use crate::config::LlmConfig;
use crate::retry::JsonEndpoint;

const LABEL: &str = "llm";

pub struct ChatClient {
    endpoint: JsonEndpoint,
    model: String,
    has_key: bool,
}

impl ChatClient {
    /// Build a client from config. A missing API key is not an error here:
    /// every call then fails with [`BackendError::Disabled`] so callers take
    /// their fallback path.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty());
        if key.is_none() {
            tracing::warn!(
                env = %config.api_key_env,
                "LLM API key not set; expansion, tie-breaks and answers will use fallbacks"
            );
        }
        let url = format!("{}/chat/completions", config.base_url.trim_end_matches('/'));
        let endpoint = JsonEndpoint::new(LABEL, url, config.timeout_secs, config.max_retries)?;
        Ok(Self {
            has_key: key.is_some(),
            endpoint: endpoint.bearer(key),
            model: config.model.clone(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request_body(&self, request: &CompletionRequest) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "messages": request.messages(),
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
        })
    }
}

#[async_trait]
impl CompletionService for ChatClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, BackendError> {
        if !self.has_key {
            return Err(BackendError::Disabled {
                backend: LABEL.to_string(),
            });
        }
        let json = self.endpoint.post(&self.request_body(request)).await?;
        parse_completion(&json)
    }
}

/// Extract `choices[0].message.content`.
fn parse_completion(json: &serde_json::Value) -> Result<String, BackendError> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|s| s.trim().to_string())
        .ok_or_else(|| BackendError::parse(LABEL, "missing choices[0].message.content"))
}

//! Chat-completion collaborator.
//!
//! The pipeline only ever needs "prompt in, text out". Concrete clients
//! (OpenAI-compatible HTTP APIs) live in the `webscout` app crate; tests
//! supply scripted implementations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::BackendError;

/// A single prior conversation message sent along with a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// `"system"`, `"user"` or `"assistant"`.
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Inputs for one completion call.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub prompt: String,
    /// System instructions (persona, output format).
    pub system: Option<String>,
    /// Extra context (e.g. gathered web results) appended to the system prompt.
    pub context: Option<String>,
    pub history: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system: None,
            context: None,
            history: Vec::new(),
            temperature: 0.7,
            max_tokens: 500,
        }
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn history(mut self, history: Vec<ChatMessage>) -> Self {
        self.history = history;
        self
    }

    /// Flatten into chat messages: system (with any context appended),
    /// then history, then the prompt as the final user turn.
    pub fn messages(&self) -> Vec<ChatMessage> {
        let mut out = Vec::with_capacity(self.history.len() + 2);
        let system = match (&self.system, &self.context) {
            (Some(s), Some(c)) => Some(format!("{}\n\nContext from web search:\n{}", s, c)),
            (None, Some(c)) => Some(format!("Context from web search:\n{}", c)),
            (Some(s), None) => Some(s.clone()),
            (None, None) => None,
        };
        if let Some(content) = system {
            out.push(ChatMessage::system(content));
        }
        out.extend(self.history.iter().cloned());
        out.push(ChatMessage::user(self.prompt.clone()));
        out
    }
}

/// A hosted chat-completion endpoint.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, BackendError>;
}

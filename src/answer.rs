//! Answer generation and the assistant turn flow.
//!
//! [`answer`] turns a [`ResearchOutcome`] into a reply with one completion
//! call. [`Assistant::respond`] routes an utterance either straight to web
//! research (when it contains a search trigger) or to the LLM first, falling
//! back to research when the model signals it lacks the facts.
//!
//! Every failure on these paths ends in a fixed reply string.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use webscout_core::completion::{ChatMessage, CompletionRequest, CompletionService};
use webscout_core::models::{DocumentKind, ResearchContext, WebDocument};
use webscout_core::store::DocumentStore;

use crate::config::{AnswerConfig, AssistantConfig};
use crate::pipeline::{ResearchOptions, ResearchOutcome, ResearchPipeline};

pub const NO_CONTEXT_REPLY: &str = "I could not gather enough information to answer that.";
pub const LLM_ERROR_REPLY: &str = "I encountered an error while processing the search results.";
pub const EMPTY_QUERY_REPLY: &str = "Could not extract search query from your request.";
pub const DIRECT_ERROR_REPLY: &str = "I encountered an error processing your request.";

/// Marker the persona prompt asks the model to emit when it needs fresh facts.
pub const NEEDS_WEB_SEARCH: &str = "[NEEDS_WEB_SEARCH]";

/// Format context sections as numbered source blocks, each capped at
/// `per_source_chars` characters.
pub fn render_context(context: &ResearchContext, per_source_chars: usize) -> String {
    context
        .sections
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let text: String = s.text.chars().take(per_source_chars).collect();
            format!("[Source {}: {}]\n{}", i + 1, s.url, text)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Answer `query` from the research outcome.
pub async fn answer(
    llm: &dyn CompletionService,
    config: &AnswerConfig,
    query: &str,
    outcome: &ResearchOutcome,
) -> String {
    if outcome.context.is_empty() {
        return NO_CONTEXT_REPLY.to_string();
    }
    let request = CompletionRequest::new(format!(
        "Using the web search results, answer this question: {}\n\n\
         Prefer consensus across sources; be concise and practical. If unsure, say so briefly.",
        query
    ))
    .context(render_context(&outcome.context, config.per_source_chars))
    .temperature(config.temperature)
    .max_tokens(config.max_tokens);

    match llm.complete(&request).await {
        Ok(reply) if !reply.trim().is_empty() => reply,
        Ok(_) => {
            tracing::warn!("empty answer from LLM");
            LLM_ERROR_REPLY.to_string()
        }
        Err(e) => {
            tracing::warn!(error = %e, "answer generation failed");
            LLM_ERROR_REPLY.to_string()
        }
    }
}

/// How a turn was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    /// Answered from web research.
    WebSearch,
    /// A search was wanted but no query could be extracted.
    WebSearchFailed,
    /// Answered by the LLM directly.
    General,
}

impl Route {
    pub fn as_str(&self) -> &'static str {
        match self {
            Route::WebSearch => "web_search",
            Route::WebSearchFailed => "web_search_failed",
            Route::General => "general",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AssistantReply {
    pub answer: String,
    pub route: Route,
    /// URLs the answer drew on, in context order.
    pub sources: Vec<String>,
}

pub struct Assistant {
    pipeline: Arc<ResearchPipeline>,
    llm: Arc<dyn CompletionService>,
    memory: Option<Arc<dyn DocumentStore>>,
    config: AssistantConfig,
    answer_config: AnswerConfig,
}

impl Assistant {
    pub fn new(
        pipeline: Arc<ResearchPipeline>,
        llm: Arc<dyn CompletionService>,
        config: AssistantConfig,
        answer_config: AnswerConfig,
    ) -> Self {
        Self {
            pipeline,
            llm,
            memory: None,
            config,
            answer_config,
        }
    }

    /// Record turns in `store` and replay recent ones as history.
    pub fn with_memory(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.memory = Some(store);
        self
    }

    pub async fn respond(&self, utterance: &str) -> AssistantReply {
        let utterance = utterance.trim();
        let reply = if self.wants_search(utterance) {
            let core = extract_search_query(utterance, &self.config.remove_words);
            if core.is_empty() {
                AssistantReply {
                    answer: EMPTY_QUERY_REPLY.to_string(),
                    route: Route::WebSearchFailed,
                    sources: Vec::new(),
                }
            } else {
                tracing::info!(query = %core, "search trigger matched");
                self.research_and_answer(&core).await
            }
        } else {
            self.direct(utterance).await
        };
        self.remember(utterance, &reply).await;
        reply
    }

    fn wants_search(&self, utterance: &str) -> bool {
        let lowered = utterance.to_lowercase();
        self.config
            .search_triggers
            .iter()
            .any(|t| !t.is_empty() && lowered.contains(&t.to_lowercase()))
    }

    async fn research_and_answer(&self, query: &str) -> AssistantReply {
        match self.pipeline.research(query, ResearchOptions::default()).await {
            Ok(outcome) => AssistantReply {
                answer: answer(self.llm.as_ref(), &self.answer_config, query, &outcome).await,
                route: Route::WebSearch,
                sources: outcome.context.urls(),
            },
            Err(e) => {
                tracing::warn!(error = %e, "research failed");
                AssistantReply {
                    answer: NO_CONTEXT_REPLY.to_string(),
                    route: Route::WebSearch,
                    sources: Vec::new(),
                }
            }
        }
    }

    async fn direct(&self, utterance: &str) -> AssistantReply {
        let request = CompletionRequest::new(utterance)
            .system(persona_prompt(&self.config.name))
            .history(self.history().await)
            .temperature(self.config.temperature)
            .max_tokens(self.config.max_tokens);

        match self.llm.complete(&request).await {
            Ok(reply) if reply.contains(NEEDS_WEB_SEARCH) => {
                tracing::info!("model asked for web search");
                self.research_and_answer(utterance).await
            }
            Ok(reply) => AssistantReply {
                answer: reply,
                route: Route::General,
                sources: Vec::new(),
            },
            Err(e) => {
                tracing::warn!(error = %e, "direct completion failed");
                AssistantReply {
                    answer: DIRECT_ERROR_REPLY.to_string(),
                    route: Route::General,
                    sources: Vec::new(),
                }
            }
        }
    }

    /// Recent turns, oldest first, as alternating user/assistant messages.
    async fn history(&self) -> Vec<ChatMessage> {
        let Some(store) = &self.memory else {
            return Vec::new();
        };
        let turns = match store
            .recent(DocumentKind::Conversation, self.config.history_turns)
            .await
        {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(error = %e, "could not load conversation history");
                return Vec::new();
            }
        };
        turns
            .iter()
            .rev()
            .flat_map(|doc| {
                let assistant = doc
                    .content
                    .split_once("\nAssistant: ")
                    .map(|(_, a)| a)
                    .unwrap_or_default();
                [
                    ChatMessage::user(doc.query.clone()),
                    ChatMessage::assistant(assistant.to_string()),
                ]
            })
            .collect()
    }

    async fn remember(&self, utterance: &str, reply: &AssistantReply) {
        let Some(store) = &self.memory else {
            return;
        };
        let doc = WebDocument::conversation(utterance, &reply.answer, reply.route.as_str(), Utc::now());
        if let Err(e) = store.upsert(&doc).await {
            tracing::warn!(error = %e, "failed to record conversation turn");
        }
    }
}

fn persona_prompt(name: &str) -> String {
    format!(
        "You are {name}, a warm, friendly and concise assistant. Keep answers clear and accurate; \
         add brief helpful context when useful, but avoid long tangents.\n\n\
         IMPORTANT: If you don't have reliable information about a topic, or the request is about \
         current events, recent news, real-time data, specific product details, or facts you are \
         unsure of, respond with just: {NEEDS_WEB_SEARCH}\n\n\
         The system will then search the web and give you current information to answer with."
    )
}

/// Strip filler phrases (whole words only, case-insensitive) and trailing
/// punctuation from an utterance to get a search query.
pub fn extract_search_query(utterance: &str, remove_words: &[String]) -> String {
    let words: Vec<String> = utterance
        .split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric() && c != '\'' && c != '-')
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .collect();

    let mut phrases: Vec<Vec<String>> = remove_words
        .iter()
        .map(|p| p.split_whitespace().map(|w| w.to_lowercase()).collect::<Vec<_>>())
        .filter(|p| !p.is_empty())
        .collect();
    // Longest phrase first so "search for" wins over "search".
    phrases.sort_by(|a, b| b.len().cmp(&a.len()));

    let mut kept = Vec::new();
    let mut i = 0;
    while i < words.len() {
        match phrases.iter().find(|p| words[i..].starts_with(p)) {
            Some(p) => i += p.len(),
            None => {
                kept.push(words[i].as_str());
                i += 1;
            }
        }
    }
    kept.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use webscout_core::models::{ContentSource, ContextSection};

    fn defaults() -> Vec<String> {
        AssistantConfig::default().remove_words
    }

    #[test]
    fn test_extract_search_query_strips_filler() {
        assert_eq!(
            extract_search_query("Can you please search for Rust async runtimes?", &defaults()),
            "rust async runtimes"
        );
        assert_eq!(
            extract_search_query("look up the weather in Paris", &defaults()),
            "the weather in paris"
        );
    }

    #[test]
    fn test_extract_search_query_whole_words_only() {
        assert_eq!(
            extract_search_query("google findings on pleased users", &defaults()),
            "findings on pleased users"
        );
        assert!(extract_search_query("search for", &defaults()).is_empty());
    }

    #[test]
    fn test_render_context_numbers_and_caps_sources() {
        let context = ResearchContext {
            sections: vec![
                ContextSection {
                    url: "https://a.example/".into(),
                    text: "a".repeat(1500),
                    source: ContentSource::Scraped,
                },
                ContextSection {
                    url: "https://b.example/".into(),
                    text: "short".into(),
                    source: ContentSource::Snippet,
                },
            ],
            total_chars: 1505,
            truncated: false,
        };
        let rendered = render_context(&context, 1000);
        assert!(rendered.starts_with("[Source 1: https://a.example/]\n"));
        assert!(rendered.ends_with("[Source 2: https://b.example/]\nshort"));
        let block = format!("]\n{}\n\n", "a".repeat(1000));
        assert!(rendered.contains(&block));
        assert!(!rendered.contains(&"a".repeat(1001)));
    }

    #[test]
    fn test_route_names() {
        assert_eq!(Route::WebSearch.as_str(), "web_search");
        assert_eq!(
            serde_json::to_value(Route::WebSearchFailed).unwrap(),
            "web_search_failed"
        );
    }
}

//! Decides whether snippet search is enough or pages must be rendered.
//!
//! Checks run in a fixed order and the first one that fires wins:
//!
//! 1. the query contains a keyword from the configured lexicon;
//! 2. there are no hits at all;
//! 3. the hits carry fewer snippet characters than the floor;
//! 4. an LLM tie-break answers `YES`.
//!
//! Hits carrying at least the rich ceiling of snippet characters settle on
//! "no" before the tie-break. Only the tie-break makes a network call and
//! its failure counts as "no".

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::completion::{CompletionRequest, CompletionService};
use crate::models::SearchHit;

/// Lexicon of phrases that call for a rendered page.
pub const DEFAULT_KEYWORDS: &[&str] = &[
    "screenshot",
    "image",
    "visual",
    "show me",
    "what does it look like",
    "interface",
    "design",
    "layout",
    "appearance",
    "navigate",
    "click",
    "interactive",
    "demo",
    "tutorial",
    "step by step",
    "how to use",
    "login",
    "sign up",
    "dashboard",
    "real-time",
    "live data",
    "scrape",
    "extract data",
    "table",
    "download",
];

/// Snippet-character floor below which results count as thin.
pub const DEFAULT_MIN_SNIPPET_CHARS: usize = 500;

/// Snippet-character ceiling at or above which results are sufficient.
pub const DEFAULT_RICH_SNIPPET_CHARS: usize = 2000;

/// Why rendering was or was not chosen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum EscalationDecision {
    /// The caller asked for rendering regardless of results.
    Forced,
    Keyword { keyword: String },
    Starvation,
    Thin { chars: usize },
    /// Enough snippet text that the tie-break is skipped.
    Rich { chars: usize },
    LlmYes,
    LlmNo,
    /// The tie-break call failed; treated as "no".
    LlmUnavailable,
    /// Tie-break disabled in configuration; treated as "no".
    LlmDisabled,
    /// Every variant was answered from the cache; the policy was not consulted.
    ServedFromCache,
}

impl EscalationDecision {
    pub fn needs_rendering(&self) -> bool {
        matches!(
            self,
            EscalationDecision::Forced
                | EscalationDecision::Keyword { .. }
                | EscalationDecision::Starvation
                | EscalationDecision::Thin { .. }
                | EscalationDecision::LlmYes
        )
    }
}

impl std::fmt::Display for EscalationDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EscalationDecision::Forced => write!(f, "rendering forced by caller"),
            EscalationDecision::Keyword { keyword } => {
                write!(f, "query mentions \"{}\"", keyword)
            }
            EscalationDecision::Starvation => write!(f, "no search results"),
            EscalationDecision::Thin { chars } => {
                write!(f, "only {} chars of snippet content", chars)
            }
            EscalationDecision::Rich { chars } => {
                write!(f, "{} chars of snippet content", chars)
            }
            EscalationDecision::LlmYes => write!(f, "LLM judged rendering necessary"),
            EscalationDecision::LlmNo => write!(f, "LLM judged snippets sufficient"),
            EscalationDecision::LlmUnavailable => write!(f, "LLM tie-break failed"),
            EscalationDecision::LlmDisabled => write!(f, "LLM tie-break disabled"),
            EscalationDecision::ServedFromCache => write!(f, "answered from cache"),
        }
    }
}

/// Ordered heuristics plus an optional LLM tie-break.
pub struct EscalationPolicy {
    keywords: Vec<String>,
    min_snippet_chars: usize,
    rich_snippet_chars: usize,
    llm: Option<Arc<dyn CompletionService>>,
}

impl EscalationPolicy {
    /// Policy with the default lexicon and floor, using `llm` for tie-breaks.
    pub fn new(llm: Option<Arc<dyn CompletionService>>) -> Self {
        Self {
            keywords: DEFAULT_KEYWORDS.iter().map(|k| k.to_string()).collect(),
            min_snippet_chars: DEFAULT_MIN_SNIPPET_CHARS,
            rich_snippet_chars: DEFAULT_RICH_SNIPPET_CHARS,
            llm,
        }
    }

    pub fn with_keywords(mut self, keywords: Vec<String>) -> Self {
        self.keywords = keywords
            .into_iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        self
    }

    pub fn with_min_snippet_chars(mut self, chars: usize) -> Self {
        self.min_snippet_chars = chars;
        self
    }

    pub fn with_rich_snippet_chars(mut self, chars: usize) -> Self {
        self.rich_snippet_chars = chars;
        self
    }

    pub async fn needs_rendering(&self, query: &str, hits: &[SearchHit]) -> EscalationDecision {
        let decision = self.decide(query, hits).await;
        tracing::info!(
            render = decision.needs_rendering(),
            reason = %decision,
            "escalation decision"
        );
        decision
    }

    async fn decide(&self, query: &str, hits: &[SearchHit]) -> EscalationDecision {
        let lowered = query.to_lowercase();
        if let Some(k) = self.keywords.iter().find(|k| lowered.contains(k.as_str())) {
            return EscalationDecision::Keyword { keyword: k.clone() };
        }

        if hits.is_empty() {
            return EscalationDecision::Starvation;
        }

        let chars: usize = hits.iter().map(|h| h.snippet.chars().count()).sum();
        if chars < self.min_snippet_chars {
            return EscalationDecision::Thin { chars };
        }
        if chars >= self.rich_snippet_chars {
            return EscalationDecision::Rich { chars };
        }

        let Some(llm) = &self.llm else {
            return EscalationDecision::LlmDisabled;
        };

        let request = CompletionRequest::new(tie_break_prompt(query, hits.len(), chars))
            .temperature(0.3)
            .max_tokens(10);
        match llm.complete(&request).await {
            Ok(reply) if reply.to_uppercase().contains("YES") => EscalationDecision::LlmYes,
            Ok(_) => EscalationDecision::LlmNo,
            Err(e) => {
                tracing::warn!(error = %e, "escalation tie-break failed, defaulting to no");
                EscalationDecision::LlmUnavailable
            }
        }
    }
}

fn tie_break_prompt(query: &str, hit_count: usize, chars: usize) -> String {
    format!(
        "Analyze if browser automation is needed for this query: \"{}\"\n\n\
         Current search results quality: {} results with {} chars of content.\n\n\
         Reply with ONLY \"YES\" if browser automation is needed (for interactive content, visual data, tables, real-time info).\n\
         Reply with ONLY \"NO\" if simple search results are sufficient (for informational queries, definitions, explanations).\n\n\
         Your answer:",
        query, hit_count, chars
    )
}

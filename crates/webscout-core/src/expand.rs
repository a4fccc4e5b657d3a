//! LLM-driven query expansion.
//!
//! Turns one user utterance into up to `max_variants` search-friendly
//! queries. The original query is always the first element, and any
//! failure (transport, HTTP, or an unparseable response) degrades to the
//! original query alone so the pipeline can still proceed.

use std::sync::Arc;

use crate::completion::{CompletionRequest, CompletionService};
use crate::models::SearchQuery;

/// Expands a user query into complementary search queries.
pub struct QueryExpander {
    llm: Arc<dyn CompletionService>,
    temperature: f32,
    max_tokens: u32,
}

impl QueryExpander {
    pub fn new(llm: Arc<dyn CompletionService>) -> Self {
        Self {
            llm,
            temperature: 0.7,
            max_tokens: 200,
        }
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    /// Expand `user_query` into at most `max_variants` queries.
    ///
    /// The first element is always the original query. Returns an empty
    /// list only for a blank query.
    pub async fn expand(&self, user_query: &str, max_variants: usize) -> Vec<SearchQuery> {
        let user_query = user_query.trim();
        if user_query.is_empty() {
            return Vec::new();
        }
        let max_variants = max_variants.max(1);
        let original = SearchQuery::original(user_query);
        if max_variants == 1 {
            return vec![original];
        }

        let request = CompletionRequest::new(expansion_prompt(user_query, max_variants))
            .temperature(self.temperature)
            .max_tokens(self.max_tokens);

        let response = match self.llm.complete(&request).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "query expansion failed, using original query only");
                return vec![original];
            }
        };

        let variants = match parse_variants(&response) {
            Some(v) => v,
            None => {
                tracing::warn!(
                    response = %truncate_for_log(&response),
                    "query expansion response was not a JSON array, using original query only"
                );
                return vec![original];
            }
        };

        let mut queries = vec![original];
        for text in variants {
            if queries.len() >= max_variants {
                break;
            }
            if queries.iter().any(|q| q.text == text) {
                continue;
            }
            queries.push(SearchQuery::variant(text, user_query));
        }

        tracing::info!(count = queries.len(), "generated query variants");
        for (i, q) in queries.iter().enumerate() {
            tracing::debug!(index = i + 1, query = %q.text, "query variant");
        }
        queries
    }
}

fn expansion_prompt(user_query: &str, max_variants: usize) -> String {
    format!(
        "Given this user query: \"{}\"\n\n\
         Generate {} different search query variations that would help find comprehensive information.\n\
         Make them specific, diverse, and complementary to each other.\n\n\
         Return ONLY a JSON array of strings, nothing else. Example format:\n\
         [\"query 1\", \"query 2\", \"query 3\"]\n",
        user_query, max_variants
    )
}

/// Parse an LLM response into a list of query strings.
///
/// Accepts a bare JSON array, an array wrapped in a (optionally `json`
/// tagged) code fence, or an array embedded in surrounding prose.
/// Non-string items and blank strings are dropped. Returns `None` when no
/// JSON array can be found.
pub fn parse_variants(response: &str) -> Option<Vec<String>> {
    let body = strip_code_fence(response.trim());

    let value: serde_json::Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(_) => {
            let start = body.find('[')?;
            let end = body.rfind(']')?;
            if end <= start {
                return None;
            }
            serde_json::from_str(&body[start..=end]).ok()?
        }
    };

    let items = value.as_array()?;
    Some(
        items
            .iter()
            .filter_map(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
    )
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let inner = match rest.find("```") {
        Some(end) => &rest[..end],
        None => rest,
    };
    let inner = inner.trim_start();
    let inner = inner
        .strip_prefix("json")
        .or_else(|| inner.strip_prefix("JSON"))
        .unwrap_or(inner);
    inner.trim()
}

fn truncate_for_log(text: &str) -> String {
    text.chars().take(120).collect()
}

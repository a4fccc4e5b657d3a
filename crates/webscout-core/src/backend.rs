//! Search backend collaborator.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::BackendError;
use crate::models::{SearchHit, SearchQuery};

/// One organic result as returned by a backend, before de-duplication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawHit {
    pub url: String,
    pub title: String,
    pub snippet: String,
}

impl RawHit {
    pub fn new(url: impl Into<String>, title: impl Into<String>, snippet: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            snippet: snippet.into(),
        }
    }

    pub fn into_hit(self, query: &SearchQuery, backend: &str) -> SearchHit {
        SearchHit {
            url: self.url,
            title: self.title,
            snippet: self.snippet,
            query: query.clone(),
            backend: backend.to_string(),
            persisted: false,
        }
    }
}

/// A text search provider (a search engine's API or results page).
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Stable name used in config, logs, and [`SearchHit::backend`].
    fn name(&self) -> &str;

    /// Return up to `max_results` organic results for `query`.
    async fn text_search(&self, query: &str, max_results: usize)
        -> Result<Vec<RawHit>, BackendError>;
}

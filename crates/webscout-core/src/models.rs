//! Core data models that flow through the research pipeline.
//!
//! [`SearchQuery`] and [`SearchHit`] live for a single pipeline run.
//! [`CachedEntry`] is the projection of a persisted [`WebDocument`] and is
//! the only entity that outlives a run. [`ResearchContext`] is the bounded
//! output handed to answer generation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a [`SearchQuery`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryOrigin {
    /// The user's own query text.
    Original,
    /// An LLM-generated alternate phrasing.
    Variant,
}

/// One query issued against the cache and the search backends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub text: String,
    pub origin: QueryOrigin,
    /// The user query this was derived from (equal to `text` for the original).
    pub parent_query: String,
}

impl SearchQuery {
    pub fn original(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            parent_query: text.clone(),
            text,
            origin: QueryOrigin::Original,
        }
    }

    pub fn variant(text: impl Into<String>, parent: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            origin: QueryOrigin::Variant,
            parent_query: parent.into(),
        }
    }
}

/// A URL + snippet pair returned by a search backend.
///
/// Unique by normalized URL within one run; the first-seen hit wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub url: String,
    pub title: String,
    pub snippet: String,
    pub query: SearchQuery,
    /// Name of the backend that produced the hit.
    pub backend: String,
    /// Set once the snippet has been written to the result cache.
    #[serde(default)]
    pub persisted: bool,
}

/// A cache entry read back from the document store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedEntry {
    pub query: String,
    pub url: String,
    pub content: String,
    pub fetched_at: DateTime<Utc>,
}

/// A cache entry paired with the variant whose lookup produced it.
#[derive(Debug, Clone, Serialize)]
pub struct CacheHit {
    pub query: SearchQuery,
    pub entry: CachedEntry,
}

/// Result of rendering and cleaning one page.
///
/// `scraped == false` means the attempt failed and the caller keeps the
/// snippet-only version of the URL.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScrapeResult {
    pub url: String,
    pub text: String,
    pub images: Vec<String>,
    pub screenshot: Option<String>,
    pub scraped: bool,
}

impl ScrapeResult {
    pub fn failed(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }
}

/// Which kind of evidence a [`ContextSection`] carries.
///
/// Ordered by richness: a scraped page beats a cached entry, which beats a
/// bare snippet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentSource {
    Snippet,
    Cached,
    Scraped,
}

/// One URL's worth of text in a [`ResearchContext`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSection {
    pub url: String,
    pub text: String,
    pub source: ContentSource,
}

/// The aggregated, size-bounded research output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResearchContext {
    pub sections: Vec<ContextSection>,
    /// Sum of section text lengths, in characters.
    pub total_chars: usize,
    pub truncated: bool,
}

impl ResearchContext {
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn urls(&self) -> Vec<String> {
        self.sections.iter().map(|s| s.url.clone()).collect()
    }
}

/// Kind of row stored in the document store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    /// Fetched web content (search snippets and scraped pages).
    WebContext,
    /// A recorded assistant conversation turn.
    Conversation,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::WebContext => "web_context",
            DocumentKind::Conversation => "conversation",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "web_context" => Some(DocumentKind::WebContext),
            "conversation" => Some(DocumentKind::Conversation),
            _ => None,
        }
    }
}

/// A persisted row in the document store.
///
/// Rows are only ever added; an identical `(query, url, content)` written
/// twice produces two rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebDocument {
    pub id: String,
    pub kind: DocumentKind,
    pub query: String,
    pub url: String,
    pub content: String,
    pub fetched_at: DateTime<Utc>,
}

impl WebDocument {
    pub fn web_context(
        query: impl Into<String>,
        url: impl Into<String>,
        content: impl Into<String>,
        fetched_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind: DocumentKind::WebContext,
            query: query.into(),
            url: url.into(),
            content: content.into(),
            fetched_at,
        }
    }

    pub fn conversation(
        user: &str,
        assistant: &str,
        route: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind: DocumentKind::Conversation,
            query: user.to_string(),
            url: route.into(),
            content: format!("User: {}\nAssistant: {}", user, assistant),
            fetched_at: at,
        }
    }

    /// SHA-256 of the content, used to skip re-embedding identical text.
    pub fn content_hash(&self) -> String {
        use sha2::{Digest, Sha256};
        let digest = Sha256::digest(self.content.as_bytes());
        digest.iter().map(|b| format!("{:02x}", b)).collect()
    }

    pub fn into_cached_entry(self) -> CachedEntry {
        CachedEntry {
            query: self.query,
            url: self.url,
            content: self.content,
            fetched_at: self.fetched_at,
        }
    }
}

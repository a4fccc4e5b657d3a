//! Document store abstraction.
//!
//! The [`DocumentStore`] trait is the persistent collaborator behind the
//! result cache and the assistant's conversation memory: an append-only
//! collection of [`WebDocument`]s with nearest-neighbour retrieval over
//! free text.
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`upsert`](DocumentStore::upsert) | Add a document (rows are never rewritten in place) |
//! | [`query`](DocumentStore::query) | Rank documents of a kind by similarity to free text |
//! | [`recent`](DocumentStore::recent) | Most recent documents of a kind, newest first |
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{DocumentKind, WebDocument};

/// A document returned from [`DocumentStore::query`] with its similarity score.
///
/// Scores are only comparable within one result set; higher is closer.
#[derive(Debug, Clone)]
pub struct ScoredDocument {
    pub document: WebDocument,
    pub score: f64,
}

/// Abstract persistent store for fetched web content and conversation turns.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Add a document. Writing the same id twice is a no-op.
    async fn upsert(&self, doc: &WebDocument) -> Result<()>;

    /// Return up to `top_k` documents of `kind` ranked by similarity to `text`.
    async fn query(&self, text: &str, kind: DocumentKind, top_k: usize)
        -> Result<Vec<ScoredDocument>>;

    /// Return up to `limit` documents of `kind`, newest first.
    async fn recent(&self, kind: DocumentKind, limit: usize) -> Result<Vec<WebDocument>>;
}

/// Lower-cased alphanumeric terms used for text similarity.
pub fn query_terms(text: &str) -> Vec<String> {
    let mut terms: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect();
    terms.sort();
    terms.dedup();
    terms
}

/// Function words that say nothing about what a query is about.
pub const STOP_WORDS: &[&str] = &[
    "a", "about", "an", "and", "are", "as", "at", "be", "by", "can", "do", "does", "for",
    "from", "how", "i", "in", "is", "it", "me", "my", "of", "on", "or", "s", "should", "the",
    "this", "to", "was", "what", "when", "where", "which", "who", "why", "with", "you",
];

/// [`query_terms`] without stop-words, or all terms when nothing else is left.
pub fn significant_terms(text: &str) -> Vec<String> {
    let terms = query_terms(text);
    let significant: Vec<String> = terms
        .iter()
        .filter(|t| !STOP_WORDS.contains(&t.as_str()))
        .cloned()
        .collect();
    if significant.is_empty() {
        terms
    } else {
        significant
    }
}

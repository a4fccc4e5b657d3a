//! Time-boxed result cache over a [`DocumentStore`].
//!
//! The cache is purely an optimization: a store that is unreachable, slow
//! to answer, or empty all look the same to callers (an empty lookup), and
//! a failed write is logged and forgotten.
//!
//! Expiry is lazy. An entry older than the validity window stays in the
//! store and is simply filtered out on every lookup.
//!
//! Stores rank by similarity but always return their nearest documents,
//! however far. An entry only counts as a hit when its query and content
//! together cover at least `min_coverage` of the lookup's significant terms.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::models::{CachedEntry, DocumentKind, WebDocument};
use crate::store::{query_terms, significant_terms, DocumentStore};

/// Default validity window, in hours.
pub const DEFAULT_VALIDITY_HOURS: i64 = 24;

/// Default number of nearest documents fetched per lookup.
pub const DEFAULT_LOOKUP_TOP_K: usize = 5;

/// Default share of significant query terms a cached entry must contain.
pub const DEFAULT_MIN_COVERAGE: f64 = 0.6;

/// Result cache keyed by free-text query.
#[derive(Clone)]
pub struct ResultCache {
    store: Arc<dyn DocumentStore>,
    validity: Duration,
    top_k: usize,
    min_coverage: f64,
}

impl ResultCache {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            validity: Duration::hours(DEFAULT_VALIDITY_HOURS),
            top_k: DEFAULT_LOOKUP_TOP_K,
            min_coverage: DEFAULT_MIN_COVERAGE,
        }
    }

    pub fn with_validity(mut self, validity: Duration) -> Self {
        self.validity = validity;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    /// Clamped to `0.0..=1.0`; zero accepts whatever the store returns.
    pub fn with_min_coverage(mut self, min_coverage: f64) -> Self {
        self.min_coverage = min_coverage.clamp(0.0, 1.0);
        self
    }

    pub fn validity(&self) -> Duration {
        self.validity
    }

    /// Valid entries similar to `query`, nearest first.
    pub async fn lookup(&self, query: &str) -> Vec<CachedEntry> {
        self.lookup_at(query, Utc::now()).await
    }

    /// Like [`lookup`](Self::lookup) with an explicit "now".
    pub async fn lookup_at(&self, query: &str, now: DateTime<Utc>) -> Vec<CachedEntry> {
        if query.trim().is_empty() {
            return Vec::new();
        }
        let scored = match self
            .store
            .query(query, DocumentKind::WebContext, self.top_k)
            .await
        {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "cache lookup failed, treating as miss");
                return Vec::new();
            }
        };

        let wanted = significant_terms(query);
        let entries: Vec<CachedEntry> = scored
            .into_iter()
            .map(|s| s.document)
            .filter(|d| self.is_valid_at(d.fetched_at, now))
            .filter(|d| term_coverage(&wanted, d) >= self.min_coverage)
            .map(WebDocument::into_cached_entry)
            .collect();

        if !entries.is_empty() {
            tracing::debug!(query, count = entries.len(), "cache hit");
        }
        entries
    }

    /// Whether an entry fetched at `fetched_at` is still valid at `now`.
    pub fn is_valid_at(&self, fetched_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now - fetched_at < self.validity
    }

    /// Record fetched content for `query`. Never fails the caller.
    pub async fn store(&self, query: &str, url: &str, content: &str) {
        self.store_at(query, url, content, Utc::now()).await
    }

    pub async fn store_at(&self, query: &str, url: &str, content: &str, at: DateTime<Utc>) {
        if content.trim().is_empty() {
            return;
        }
        let doc = WebDocument::web_context(query, url, content, at);
        if let Err(e) = self.store.upsert(&doc).await {
            tracing::warn!(error = %e, url, "failed to store result in cache");
        }
    }
}

/// Share of `wanted` terms found in the document's query or content.
fn term_coverage(wanted: &[String], doc: &WebDocument) -> f64 {
    if wanted.is_empty() {
        return 0.0;
    }
    let haystack = query_terms(&format!("{} {}", doc.query, doc.content));
    let found = wanted
        .iter()
        .filter(|t| haystack.binary_search(t).is_ok())
        .count();
    found as f64 / wanted.len() as f64
}

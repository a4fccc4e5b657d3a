//! In-memory [`DocumentStore`] implementation for tests and ephemeral runs.
//!
//! Documents live in a `Vec` behind `std::sync::RwLock`. Similarity is the
//! fraction of query terms found in a document's query and content text.

use std::collections::HashSet;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{DocumentKind, WebDocument};

use super::{query_terms, DocumentStore, ScoredDocument};

/// In-memory document store.
pub struct InMemoryStore {
    docs: RwLock<Vec<WebDocument>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            docs: RwLock::new(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.docs.read().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every stored document, in insertion order.
    pub fn documents(&self) -> Vec<WebDocument> {
        self.docs.read().map(|d| d.clone()).unwrap_or_default()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn upsert(&self, doc: &WebDocument) -> Result<()> {
        let mut docs = self
            .docs
            .write()
            .map_err(|_| anyhow::anyhow!("in-memory store lock poisoned"))?;
        if !docs.iter().any(|d| d.id == doc.id) {
            docs.push(doc.clone());
        }
        Ok(())
    }

    async fn query(
        &self,
        text: &str,
        kind: DocumentKind,
        top_k: usize,
    ) -> Result<Vec<ScoredDocument>> {
        let terms = query_terms(text);
        if terms.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }
        let docs = self
            .docs
            .read()
            .map_err(|_| anyhow::anyhow!("in-memory store lock poisoned"))?;

        let mut scored: Vec<ScoredDocument> = docs
            .iter()
            .filter(|d| d.kind == kind)
            .filter_map(|d| {
                let haystack: HashSet<String> =
                    query_terms(&format!("{} {}", d.query, d.content))
                        .into_iter()
                        .collect();
                let matches = terms.iter().filter(|t| haystack.contains(*t)).count();
                if matches == 0 {
                    return None;
                }
                Some(ScoredDocument {
                    document: d.clone(),
                    score: matches as f64 / terms.len() as f64,
                })
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.document.fetched_at.cmp(&a.document.fetched_at))
        });
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn recent(&self, kind: DocumentKind, limit: usize) -> Result<Vec<WebDocument>> {
        let docs = self
            .docs
            .read()
            .map_err(|_| anyhow::anyhow!("in-memory store lock poisoned"))?;
        let mut matching: Vec<WebDocument> =
            docs.iter().filter(|d| d.kind == kind).cloned().collect();
        matching.sort_by(|a, b| b.fetched_at.cmp(&a.fetched_at));
        matching.truncate(limit);
        Ok(matching)
    }
}

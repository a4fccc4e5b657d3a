//! Folds cache hits, snippet hits and scrape results into one bounded
//! [`ResearchContext`].
//!
//! # Merge rules
//!
//! - Sections are keyed by normalized URL. A richer source replaces a poorer
//!   one in place (scraped > cached > snippet); on equal richness the first
//!   one seen is kept.
//! - Slots are ordered by the rank of the variant that first produced the
//!   URL, then by discovery order within the variant, with cache hits ahead
//!   of snippet hits. Scrape results take over their URL's slot; a scrape of
//!   a URL no hit mentioned goes last.
//!
//! # Budget
//!
//! The sum of section text lengths (in characters) never exceeds the
//! budget. Sections that do not fit are dropped from the end; the last
//! section that partly fits is cut, at a sentence boundary when one is
//! close enough. The result is always a prefix of the untruncated order.

use std::collections::HashMap;

use crate::cache::ResultCache;
use crate::models::{
    CacheHit, ContentSource, ContextSection, ResearchContext, ScrapeResult, SearchHit,
    SearchQuery,
};
use crate::urls::normalize_url;

/// Default context budget, in characters.
pub const DEFAULT_CONTEXT_CHAR_BUDGET: usize = 8000;

pub struct ResultAggregator {
    cache: Option<ResultCache>,
    budget: usize,
}

impl ResultAggregator {
    pub fn new(cache: Option<ResultCache>, budget: usize) -> Self {
        Self { cache, budget }
    }

    /// Merge, budget, and persist fresh evidence to the cache.
    pub async fn aggregate(
        &self,
        variants: &[SearchQuery],
        cache_hits: &[CacheHit],
        snippet_hits: &[SearchHit],
        scrapes: &[ScrapeResult],
    ) -> ResearchContext {
        let sections = merge(variants, cache_hits, snippet_hits, scrapes);
        let context = apply_budget(sections, self.budget);

        if let Some(cache) = &self.cache {
            self.persist(cache, variants, snippet_hits, scrapes).await;
        }

        tracing::info!(
            sections = context.sections.len(),
            chars = context.total_chars,
            truncated = context.truncated,
            "aggregated research context"
        );
        context
    }

    async fn persist(
        &self,
        cache: &ResultCache,
        variants: &[SearchQuery],
        snippet_hits: &[SearchHit],
        scrapes: &[ScrapeResult],
    ) {
        let fallback_query = variants
            .first()
            .map(|v| v.parent_query.as_str())
            .unwrap_or_default();

        for scrape in scrapes.iter().filter(|s| s.scraped && !s.text.is_empty()) {
            let key = normalize_url(&scrape.url);
            let query = snippet_hits
                .iter()
                .find(|h| normalize_url(&h.url) == key)
                .map(|h| h.query.text.as_str())
                .unwrap_or(fallback_query);
            cache.store(query, &scrape.url, &scrape.text).await;
        }

        for hit in snippet_hits
            .iter()
            .filter(|h| !h.persisted && !h.snippet.trim().is_empty())
        {
            cache.store(&hit.query.text, &hit.url, &hit.snippet).await;
        }
    }
}

/// Merge all evidence into ordered, de-duplicated sections (no budget).
pub fn merge(
    variants: &[SearchQuery],
    cache_hits: &[CacheHit],
    snippet_hits: &[SearchHit],
    scrapes: &[ScrapeResult],
) -> Vec<ContextSection> {
    let mut slots = Slots::default();

    let rank_of = |q: &SearchQuery| variants.iter().position(|v| v.text == q.text);

    for (rank, variant) in variants.iter().enumerate() {
        for c in cache_hits
            .iter()
            .filter(|c| c.query.text == variant.text)
        {
            slots.offer(&c.entry.url, &c.entry.content, ContentSource::Cached);
        }
        for h in snippet_hits
            .iter()
            .filter(|h| rank_of(&h.query) == Some(rank))
        {
            slots.offer(&h.url, &h.snippet, ContentSource::Snippet);
        }
    }

    // Evidence from queries not in the variant list goes after all ranked slots.
    for c in cache_hits.iter().filter(|c| rank_of(&c.query).is_none()) {
        slots.offer(&c.entry.url, &c.entry.content, ContentSource::Cached);
    }
    for h in snippet_hits.iter().filter(|h| rank_of(&h.query).is_none()) {
        slots.offer(&h.url, &h.snippet, ContentSource::Snippet);
    }

    for s in scrapes.iter().filter(|s| s.scraped) {
        slots.offer(&s.url, &s.text, ContentSource::Scraped);
    }

    slots.sections
}

#[derive(Default)]
struct Slots {
    index: HashMap<String, usize>,
    sections: Vec<ContextSection>,
}

impl Slots {
    fn offer(&mut self, url: &str, text: &str, source: ContentSource) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        let key = normalize_url(url);
        match self.index.get(&key) {
            Some(&i) => {
                let slot = &mut self.sections[i];
                if source > slot.source {
                    slot.text = text.to_string();
                    slot.source = source;
                }
            }
            None => {
                self.index.insert(key, self.sections.len());
                self.sections.push(ContextSection {
                    url: url.to_string(),
                    text: text.to_string(),
                    source,
                });
            }
        }
    }
}

/// Cut `sections` down to at most `budget` characters of text.
pub fn apply_budget(sections: Vec<ContextSection>, budget: usize) -> ResearchContext {
    let mut out = Vec::with_capacity(sections.len());
    let mut total = 0usize;
    let mut truncated = false;

    for mut section in sections {
        let len = section.text.chars().count();
        if total + len <= budget {
            total += len;
            out.push(section);
            continue;
        }

        truncated = true;
        let remaining = budget - total;
        if remaining > 0 {
            section.text = cut_at_sentence(&section.text, remaining);
            let cut_len = section.text.chars().count();
            if cut_len > 0 {
                total += cut_len;
                out.push(section);
            }
        }
        break;
    }

    ResearchContext {
        sections: out,
        total_chars: total,
        truncated,
    }
}

/// First `max` characters of `text`, ending at a sentence boundary if one
/// lies in the second half of that window.
fn cut_at_sentence(text: &str, max: usize) -> String {
    let window: String = text.chars().take(max).collect();
    let boundary = window
        .char_indices()
        .filter(|(i, c)| {
            matches!(c, '.' | '!' | '?')
                && window[i + c.len_utf8()..]
                    .chars()
                    .next()
                    .map_or(true, char::is_whitespace)
        })
        .map(|(i, c)| i + c.len_utf8())
        .last();

    match boundary {
        Some(end) if window[..end].chars().count() * 2 >= max => window[..end].to_string(),
        _ => window,
    }
}

//! End-to-end web research.
//!
//! ```text
//! query ─▶ QueryExpander ─▶ cache lookup per variant (concurrently)
//!       ─▶ snippet search per missed variant (concurrently)
//!       ─▶ fan-in, de-duplicate
//!       ─▶ EscalationPolicy (skipped when every variant came from cache)
//!       ─▶ RenderedScraper on the top unresolved hits, until the deadline
//!       ─▶ ResultAggregator ─▶ ResearchOutcome
//! ```
//!
//! Only a blank query is an error. Every collaborator failure degrades to a
//! smaller context instead.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use serde::Serialize;
use tokio::time::Instant;

use webscout_core::aggregate::ResultAggregator;
use webscout_core::cache::ResultCache;
use webscout_core::completion::CompletionService;
use webscout_core::domains::DomainAdvisory;
use webscout_core::escalation::{EscalationDecision, EscalationPolicy};
use webscout_core::expand::QueryExpander;
use webscout_core::models::{CacheHit, CachedEntry, ResearchContext, SearchQuery};
use webscout_core::store::DocumentStore;
use webscout_core::urls::normalize_url;

use crate::backends::create_backends;
use crate::config::Config;
use crate::domains::FileDomainAdvisory;
use crate::render::create_renderer;
use crate::scrape::{select_targets, RenderedScraper};
use crate::search::SnippetSearchEngine;

/// Per-run switches.
#[derive(Debug, Clone, Default)]
pub struct ResearchOptions {
    /// Render the top hits regardless of what the escalation policy says.
    pub force_render: bool,
}

/// Everything a research run produced.
#[derive(Debug, Clone, Serialize)]
pub struct ResearchOutcome {
    pub query: String,
    pub variants: Vec<SearchQuery>,
    /// Distinct snippet hits across all searched variants.
    pub total_hits: usize,
    pub cache_hits: usize,
    pub pages_scraped: usize,
    pub rendering_used: bool,
    pub decision: EscalationDecision,
    pub served_from_cache: bool,
    pub context: ResearchContext,
    pub elapsed_ms: u64,
}

/// Numeric knobs of a run.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub max_variants: usize,
    pub results_per_query: usize,
    pub max_scrape_per_run: usize,
    pub rich_snippet_chars: usize,
    pub deadline: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_variants: 4,
            results_per_query: 5,
            max_scrape_per_run: 3,
            rich_snippet_chars: 300,
            deadline: Duration::from_secs(60),
        }
    }
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_variants: config.expansion.max_variants,
            results_per_query: config.search.results_per_query,
            max_scrape_per_run: config.scrape.max_scrape_per_run,
            rich_snippet_chars: config.scrape.rich_snippet_chars,
            deadline: Duration::from_secs(config.pipeline.deadline_secs),
        }
    }
}

pub struct ResearchPipeline {
    expander: QueryExpander,
    cache: Option<ResultCache>,
    engine: SnippetSearchEngine,
    policy: EscalationPolicy,
    scraper: RenderedScraper,
    aggregator: ResultAggregator,
    settings: PipelineSettings,
}

impl ResearchPipeline {
    pub fn new(
        expander: QueryExpander,
        engine: SnippetSearchEngine,
        policy: EscalationPolicy,
        scraper: RenderedScraper,
        aggregator: ResultAggregator,
    ) -> Self {
        Self {
            expander,
            cache: None,
            engine,
            policy,
            scraper,
            aggregator,
            settings: PipelineSettings::default(),
        }
    }

    /// Consult `cache` before searching each variant.
    pub fn with_cache(mut self, cache: ResultCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_settings(mut self, settings: PipelineSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Wire every stage from configuration around a shared store and LLM.
    pub fn from_config(
        config: &Config,
        store: Arc<dyn DocumentStore>,
        llm: Arc<dyn CompletionService>,
    ) -> Result<Self> {
        let cache = ResultCache::new(store)
            .with_validity(chrono::Duration::hours(config.cache.validity_hours))
            .with_top_k(config.cache.lookup_top_k)
            .with_min_coverage(config.cache.min_coverage);

        let expander = QueryExpander::new(llm.clone())
            .with_sampling(config.expansion.temperature, config.expansion.max_tokens);

        let engine = SnippetSearchEngine::from_config(
            &config.search,
            create_backends(&config.search)?,
            Some(cache.clone()),
        );

        let tie_break = config.escalation.llm_tie_break.then(|| llm.clone());
        let policy = EscalationPolicy::new(tie_break)
            .with_keywords(config.escalation.keywords.clone())
            .with_min_snippet_chars(config.escalation.min_snippet_chars)
            .with_rich_snippet_chars(config.escalation.rich_snippet_chars);

        let domains: Arc<dyn DomainAdvisory> =
            Arc::new(FileDomainAdvisory::open(&config.scrape.domains_file));
        let scraper = RenderedScraper::new(
            create_renderer(&config.scrape)?,
            domains,
            config.scrape.clone(),
        )?;

        let aggregator =
            ResultAggregator::new(Some(cache.clone()), config.pipeline.context_char_budget);

        Ok(Self::new(expander, engine, policy, scraper, aggregator)
            .with_cache(cache)
            .with_settings(PipelineSettings::from_config(config)))
    }

    pub fn scraper(&self) -> &RenderedScraper {
        &self.scraper
    }

    pub fn engine(&self) -> &SnippetSearchEngine {
        &self.engine
    }

    pub async fn research(&self, query: &str, options: ResearchOptions) -> Result<ResearchOutcome> {
        let query = query.trim();
        if query.is_empty() {
            bail!("Research query must not be empty");
        }
        let started = Instant::now();
        let deadline = started + self.settings.deadline;
        tracing::info!(query, force_render = options.force_render, "research started");

        let variants = self.expander.expand(query, self.settings.max_variants).await;

        // All lookups finish before any search so snippets cached during
        // this run cannot answer a sibling variant.
        let lookups =
            futures::future::join_all(variants.iter().map(|v| self.lookup(v))).await;
        let served_from_cache = lookups.iter().all(|entries| !entries.is_empty());

        let misses: Vec<&SearchQuery> = variants
            .iter()
            .zip(&lookups)
            .filter(|(_, entries)| entries.is_empty())
            .map(|(v, _)| v)
            .collect();
        let searched = futures::future::join_all(
            misses
                .iter()
                .map(|v| self.engine.search(v, self.settings.results_per_query)),
        )
        .await;

        let cache_hits: Vec<CacheHit> = variants
            .iter()
            .zip(lookups)
            .flat_map(|(variant, entries)| {
                entries.into_iter().map(move |entry| CacheHit {
                    query: variant.clone(),
                    entry,
                })
            })
            .collect();
        let mut hits = Vec::new();
        let mut seen = HashSet::new();
        for hit in searched.into_iter().flatten() {
            if seen.insert(normalize_url(&hit.url)) {
                hits.push(hit);
            }
        }
        tracing::info!(
            variants = variants.len(),
            hits = hits.len(),
            cache_hits = cache_hits.len(),
            "search stage finished"
        );

        let decision = if options.force_render {
            EscalationDecision::Forced
        } else if served_from_cache {
            EscalationDecision::ServedFromCache
        } else {
            self.policy.needs_rendering(query, &hits).await
        };

        let scrapes = if decision.needs_rendering() {
            let targets = select_targets(
                &hits,
                &cache_hits,
                self.settings.max_scrape_per_run,
                self.settings.rich_snippet_chars,
            );
            self.scraper
                .scrape_all(&targets, query, options.force_render, deadline)
                .await
        } else {
            Vec::new()
        };
        let pages_scraped = scrapes.iter().filter(|s| s.scraped).count();

        let context = self
            .aggregator
            .aggregate(&variants, &cache_hits, &hits, &scrapes)
            .await;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            query,
            sections = context.sections.len(),
            pages_scraped,
            elapsed_ms,
            "research finished"
        );

        Ok(ResearchOutcome {
            query: query.to_string(),
            total_hits: hits.len(),
            cache_hits: cache_hits.len(),
            pages_scraped,
            rendering_used: pages_scraped > 0,
            decision,
            served_from_cache,
            context,
            elapsed_ms,
            variants,
        })
    }

    /// Run [`research`](Self::research) to completion on a fresh
    /// current-thread runtime. Fails when called from inside a runtime.
    pub fn research_blocking(&self, query: &str, options: ResearchOptions) -> Result<ResearchOutcome> {
        if tokio::runtime::Handle::try_current().is_ok() {
            bail!("research_blocking cannot be called from within an async runtime");
        }
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        runtime.block_on(self.research(query, options))
    }

    async fn lookup(&self, variant: &SearchQuery) -> Vec<CachedEntry> {
        match &self.cache {
            Some(cache) => cache.lookup(&variant.text).await,
            None => Vec::new(),
        }
    }
}

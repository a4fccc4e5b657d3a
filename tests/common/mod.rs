//! Scripted collaborators shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use webscout::config::ScrapeConfig;
use webscout::pipeline::{PipelineSettings, ResearchPipeline};
use webscout::scrape::RenderedScraper;
use webscout::search::SnippetSearchEngine;
use webscout_core::aggregate::ResultAggregator;
use webscout_core::backend::{RawHit, SearchBackend};
use webscout_core::cache::ResultCache;
use webscout_core::completion::{CompletionRequest, CompletionService};
use webscout_core::domains::MemoryDomainAdvisory;
use webscout_core::error::BackendError;
use webscout_core::escalation::EscalationPolicy;
use webscout_core::expand::QueryExpander;
use webscout_core::render::{PageRenderer, RenderOptions, RenderedPage};
use webscout_core::store::memory::InMemoryStore;
use webscout_core::store::DocumentStore;

type Reply = Box<dyn Fn(&CompletionRequest) -> Result<String, BackendError> + Send + Sync>;

/// LLM whose reply is computed from the request.
pub struct FakeLlm {
    reply: Reply,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl FakeLlm {
    pub fn new(
        reply: impl Fn(&CompletionRequest) -> Result<String, BackendError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            reply: Box::new(reply),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        })
    }

    /// Expansion returns `variants`; every other call answers `answer`.
    pub fn scripted(variants: &[&str], answer: &str) -> Arc<Self> {
        let array = serde_json::to_string(variants).unwrap();
        let answer = answer.to_string();
        Self::new(move |req| {
            if req.prompt.contains("search query variations") {
                Ok(array.clone())
            } else {
                Ok(answer.clone())
            }
        })
    }

    pub fn failing() -> Arc<Self> {
        Self::new(|_| Err(BackendError::unavailable("fake-llm", "down")))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionService for FakeLlm {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(request.prompt.clone());
        (self.reply)(request)
    }
}

/// Search backend returning canned hits per query text.
pub struct FakeBackend {
    name: String,
    results: HashMap<String, Vec<RawHit>>,
    fail: bool,
    calls: AtomicUsize,
}

impl FakeBackend {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            results: HashMap::new(),
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(name: &str) -> Self {
        Self {
            fail: true,
            ..Self::new(name)
        }
    }

    pub fn with(mut self, query: &str, hits: Vec<RawHit>) -> Self {
        self.results.insert(query.to_string(), hits);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SearchBackend for FakeBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn text_search(&self, query: &str, max_results: usize) -> Result<Vec<RawHit>, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(BackendError::transport(&self.name, "connection refused"));
        }
        let mut hits = self.results.get(query).cloned().unwrap_or_default();
        hits.truncate(max_results);
        Ok(hits)
    }
}

/// Renderer serving fixed HTML per URL, optionally slowly.
pub struct FakeRenderer {
    pages: HashMap<String, String>,
    delay: Duration,
    calls: AtomicUsize,
}

impl FakeRenderer {
    pub fn new() -> Self {
        Self {
            pages: HashMap::new(),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn page(mut self, url: &str, html: &str) -> Self {
        self.pages.insert(url.to_string(), html.to_string());
        self
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageRenderer for FakeRenderer {
    fn name(&self) -> &str {
        "fake"
    }

    async fn render(&self, url: &str, _options: &RenderOptions) -> Result<RenderedPage, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        match self.pages.get(url) {
            Some(html) => Ok(RenderedPage {
                final_url: url.to_string(),
                html: html.clone(),
                ..Default::default()
            }),
            None => Err(BackendError::Http {
                backend: "fake".to_string(),
                status: 404,
            }),
        }
    }
}

pub fn raw(url: &str, snippet: &str) -> RawHit {
    RawHit::new(url, format!("Title for {}", url), snippet)
}

/// An article page with `repeat` sentences mentioning `topic`.
pub fn article(topic: &str, repeat: usize) -> String {
    format!(
        "<html><head><script>track()</script></head><body><nav>Home | About</nav>\
         <article><h1>{topic}</h1><p>{}</p></article><footer>(c) site</footer></body></html>",
        format!("Detailed notes about {topic} and how it works in practice. ").repeat(repeat)
    )
}

/// Everything a test pipeline is built from, kept so tests can inspect it.
pub struct Harness {
    pub llm: Arc<FakeLlm>,
    pub backends: Vec<Arc<FakeBackend>>,
    pub renderer: Arc<FakeRenderer>,
    pub store: Arc<InMemoryStore>,
    pub domains: Arc<MemoryDomainAdvisory>,
}

impl Harness {
    pub fn new(llm: Arc<FakeLlm>, backends: Vec<FakeBackend>, renderer: FakeRenderer) -> Self {
        Self {
            llm,
            backends: backends.into_iter().map(Arc::new).collect(),
            renderer: Arc::new(renderer),
            store: Arc::new(InMemoryStore::new()),
            domains: Arc::new(MemoryDomainAdvisory::new()),
        }
    }

    pub fn pipeline(&self, settings: PipelineSettings) -> ResearchPipeline {
        let store: Arc<dyn DocumentStore> = self.store.clone();
        let cache = ResultCache::new(store);
        let llm: Arc<dyn CompletionService> = self.llm.clone();

        let backends: Vec<Arc<dyn SearchBackend>> = self
            .backends
            .iter()
            .map(|b| b.clone() as Arc<dyn SearchBackend>)
            .collect();
        let engine = SnippetSearchEngine::new(backends)
            .with_min_acceptable(1)
            .with_cache(cache.clone());

        let scraper = RenderedScraper::new(
            self.renderer.clone(),
            self.domains.clone(),
            ScrapeConfig {
                delay_ms: 0,
                settle_ms: 0,
                ..Default::default()
            },
        )
        .unwrap();

        ResearchPipeline::new(
            QueryExpander::new(llm.clone()),
            engine,
            EscalationPolicy::new(Some(llm)),
            scraper,
            ResultAggregator::new(Some(cache.clone()), 8000),
        )
        .with_cache(cache)
        .with_settings(settings)
    }
}

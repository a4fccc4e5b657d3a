//! Snippet search with ordered backend fallback.
//!
//! For one query the engine walks its backends in priority order and stops
//! at the first one that contributes at least `min_acceptable` new hits.
//! A backend that errors, times out, or comes back thin is logged and the
//! next one is tried. Hits are de-duplicated by normalized URL, keeping the
//! first one seen.
//!
//! Every call to a backend first waits on that backend's [`Throttle`], which
//! spaces consecutive calls by a random delay. Throttles are shared by all
//! concurrent searches running through the same engine.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::Mutex;
use tokio::time::Instant;

use webscout_core::backend::SearchBackend;
use webscout_core::cache::ResultCache;
use webscout_core::error::BackendError;
use webscout_core::models::{SearchHit, SearchQuery};
use webscout_core::urls::normalize_url;

use crate::config::SearchConfig;

/// Randomized minimum spacing between calls to one backend.
pub struct Throttle {
    last_call: Mutex<Option<Instant>>,
    min: Duration,
    max: Duration,
}

impl Throttle {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            last_call: Mutex::new(None),
            min,
            max: max.max(min),
        }
    }

    /// Wait until the randomly chosen gap since the previous call has passed.
    ///
    /// The lock is held while sleeping so concurrent callers queue up.
    pub async fn wait(&self) {
        let mut last = self.last_call.lock().await;
        if let Some(prev) = *last {
            let gap = self.pick_gap();
            tokio::time::sleep_until(prev + gap).await;
        }
        *last = Some(Instant::now());
    }

    /// Restart the gap from now, for callers that space the end of one call
    /// from the start of the next.
    pub async fn finished(&self) {
        *self.last_call.lock().await = Some(Instant::now());
    }

    fn pick_gap(&self) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        let ms = rand::thread_rng().gen_range(self.min.as_millis()..=self.max.as_millis());
        Duration::from_millis(ms as u64)
    }
}

pub struct SnippetSearchEngine {
    backends: Vec<Arc<dyn SearchBackend>>,
    throttles: HashMap<String, Arc<Throttle>>,
    cache: Option<ResultCache>,
    timeout: Duration,
    min_acceptable: usize,
    min_snippet_chars: usize,
}

impl SnippetSearchEngine {
    /// Engine with no politeness delay, a 12 s timeout and no cache writes.
    pub fn new(backends: Vec<Arc<dyn SearchBackend>>) -> Self {
        let mut engine = Self {
            backends,
            throttles: HashMap::new(),
            cache: None,
            timeout: Duration::from_secs(12),
            min_acceptable: 3,
            min_snippet_chars: 50,
        };
        engine.reset_throttles(Duration::ZERO, Duration::ZERO);
        engine
    }

    pub fn from_config(
        config: &SearchConfig,
        backends: Vec<Arc<dyn SearchBackend>>,
        cache: Option<ResultCache>,
    ) -> Self {
        let mut engine = Self::new(backends)
            .with_timeout(Duration::from_secs(config.timeout_secs))
            .with_min_acceptable(config.min_acceptable)
            .with_min_snippet_chars(config.min_snippet_chars)
            .with_delay(
                Duration::from_millis(config.delay_min_ms),
                Duration::from_millis(config.delay_max_ms),
            );
        engine.cache = cache;
        engine
    }

    pub fn with_cache(mut self, cache: ResultCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_min_acceptable(mut self, n: usize) -> Self {
        self.min_acceptable = n;
        self
    }

    pub fn with_min_snippet_chars(mut self, n: usize) -> Self {
        self.min_snippet_chars = n;
        self
    }

    pub fn with_delay(mut self, min: Duration, max: Duration) -> Self {
        self.reset_throttles(min, max);
        self
    }

    fn reset_throttles(&mut self, min: Duration, max: Duration) {
        self.throttles = self
            .backends
            .iter()
            .map(|b| (b.name().to_string(), Arc::new(Throttle::new(min, max))))
            .collect();
    }

    /// Up to `n` de-duplicated hits for `query`. Never fails; total backend
    /// failure yields an empty list.
    pub async fn search(&self, query: &SearchQuery, n: usize) -> Vec<SearchHit> {
        let mut seen = HashSet::new();
        let mut hits: Vec<SearchHit> = Vec::new();

        for backend in &self.backends {
            let name = backend.name();
            match self.call_backend(backend.as_ref(), &query.text, n).await {
                Ok(raw) => {
                    let before = hits.len();
                    for r in raw {
                        if seen.insert(normalize_url(&r.url)) {
                            hits.push(r.into_hit(query, name));
                        }
                    }
                    let fresh = hits.len() - before;
                    tracing::debug!(backend = name, query = %query.text, fresh, "backend returned hits");
                    if fresh >= self.min_acceptable {
                        break;
                    }
                    tracing::info!(
                        backend = name,
                        fresh,
                        min = self.min_acceptable,
                        "too few new results, trying next backend"
                    );
                }
                Err(e) => {
                    tracing::warn!(backend = name, kind = e.kind(), error = %e, "search backend failed");
                }
            }
        }

        hits.truncate(n);
        if hits.is_empty() {
            tracing::warn!(query = %query.text, "all search backends came back empty");
        }

        if let Some(cache) = &self.cache {
            for hit in hits
                .iter_mut()
                .filter(|h| h.snippet.chars().count() >= self.min_snippet_chars)
            {
                cache.store(&query.text, &hit.url, &hit.snippet).await;
                hit.persisted = true;
            }
        }
        hits
    }

    async fn call_backend(
        &self,
        backend: &dyn SearchBackend,
        query: &str,
        n: usize,
    ) -> Result<Vec<webscout_core::backend::RawHit>, BackendError> {
        if let Some(throttle) = self.throttles.get(backend.name()) {
            throttle.wait().await;
        }
        match tokio::time::timeout(self.timeout, backend.text_search(query, n)).await {
            Ok(result) => result,
            Err(_) => Err(BackendError::timeout(backend.name(), self.timeout.as_secs())),
        }
    }
}

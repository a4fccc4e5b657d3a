//! Rendered scraping of result pages.
//!
//! [`RenderedScraper::scrape`] turns one URL into cleaned text or a
//! `scraped == false` result that tells the caller to keep the snippet.
//! Structural failures (render error, no relevant content region, too
//! little text) teach the [`DomainAdvisory`] to skip that domain next time.
//!
//! [`RenderedScraper::scrape_all`] applies the caller policy for a batch:
//! a concurrency cap, a fixed politeness gap from the end of one session to
//! the start of the next, and a hard deadline after which unfinished
//! scrapes are abandoned.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures::stream::{FuturesUnordered, StreamExt};
use rand::seq::SliceRandom;
use tokio::sync::Semaphore;
use tokio::time::Instant;

use webscout_core::domains::DomainAdvisory;
use webscout_core::extract::{analyze_page, truncate_chars};
use webscout_core::models::{CacheHit, ScrapeResult, SearchHit};
use webscout_core::render::{PageRenderer, RenderOptions, RenderedPage, USER_AGENTS};
use webscout_core::urls::{domain_of, is_fetchable, normalize_url};

use crate::config::ScrapeConfig;
use crate::search::Throttle;

pub struct RenderedScraper {
    renderer: Arc<dyn PageRenderer>,
    domains: Arc<dyn DomainAdvisory>,
    config: ScrapeConfig,
    media: reqwest::Client,
    throttle: Throttle,
}

impl RenderedScraper {
    pub fn new(
        renderer: Arc<dyn PageRenderer>,
        domains: Arc<dyn DomainAdvisory>,
        config: ScrapeConfig,
    ) -> Result<Self> {
        let media = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;
        let gap = Duration::from_millis(config.delay_ms);
        Ok(Self {
            renderer,
            domains,
            throttle: Throttle::new(gap, gap),
            config,
            media,
        })
    }

    pub fn renderer_name(&self) -> &str {
        self.renderer.name()
    }

    pub fn domains(&self) -> &Arc<dyn DomainAdvisory> {
        &self.domains
    }

    /// Scrape one page. Never fails: problems are logged and reported as
    /// `scraped == false`.
    pub async fn scrape(&self, url: &str, query: &str, force: bool) -> ScrapeResult {
        if !is_fetchable(url) {
            tracing::debug!(url = %url, "skipping non-http url");
            return ScrapeResult::failed(url);
        }
        let domain = domain_of(url).unwrap_or_default();
        if !force && self.domains.is_hard_to_scrape(&domain) {
            tracing::info!(url = %url, domain = %domain, "skipping hard-to-scrape domain");
            return ScrapeResult::failed(url);
        }

        let options = self.render_options();
        let started = std::time::Instant::now();
        let page = match self.renderer.render(url, &options).await {
            Ok(page) => page,
            Err(e) => {
                tracing::warn!(url = %url, renderer = self.renderer.name(), error = %e, "render failed");
                self.domains.mark_hard_to_scrape(&domain);
                return ScrapeResult::failed(url);
            }
        };

        // Renderer-reported images already passed the size check; otherwise
        // fall back to declared sizes in the markup.
        let want_images = if self.config.download_images && page.image_urls.is_empty() {
            self.config.max_images
        } else {
            0
        };
        let analysis = analyze_page(&page.html, query, &page.final_url, want_images);

        if !analysis.relevant {
            tracing::info!(url = %url, "no content region mentions the query");
            self.domains.mark_hard_to_scrape(&domain);
            return ScrapeResult::failed(url);
        }
        let chars = analysis.text.chars().count();
        if chars < self.config.min_content_chars {
            tracing::info!(url = %url, chars, min = self.config.min_content_chars, "page text too short");
            self.domains.mark_hard_to_scrape(&domain);
            return ScrapeResult::failed(url);
        }

        let text = truncate_chars(&analysis.text, self.config.max_text_chars);
        let screenshot = self.save_screenshot(&domain, &page).await;
        let images = if self.config.download_images {
            let candidates = if page.image_urls.is_empty() {
                analysis.images
            } else {
                page.image_urls.clone()
            };
            self.download_images(&domain, &candidates).await
        } else {
            Vec::new()
        };

        tracing::info!(
            url = %url,
            chars = text.chars().count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "scraped page"
        );
        ScrapeResult {
            url: url.to_string(),
            text,
            images,
            screenshot,
            scraped: true,
        }
    }

    /// Scrape `urls` with the configured concurrency and spacing, returning
    /// whatever finished before `deadline`.
    pub async fn scrape_all(
        &self,
        urls: &[String],
        query: &str,
        force: bool,
        deadline: Instant,
    ) -> Vec<ScrapeResult> {
        if urls.is_empty() {
            return Vec::new();
        }
        let permits = Semaphore::new(self.config.concurrency.max(1));
        let mut pending: FuturesUnordered<_> = urls
            .iter()
            .map(|url| {
                let permits = &permits;
                async move {
                    let _permit = permits.acquire().await.ok();
                    self.throttle.wait().await;
                    let result = self.scrape(url, query, force).await;
                    self.throttle.finished().await;
                    result
                }
            })
            .collect();

        let mut results = Vec::with_capacity(urls.len());
        loop {
            match tokio::time::timeout_at(deadline, pending.next()).await {
                Ok(Some(result)) => results.push(result),
                Ok(None) => break,
                Err(_) => {
                    tracing::warn!(
                        finished = results.len(),
                        abandoned = pending.len(),
                        "deadline reached; abandoning remaining scrapes"
                    );
                    break;
                }
            }
        }
        results
    }

    fn render_options(&self) -> RenderOptions {
        RenderOptions {
            user_agent: pick_user_agent(),
            viewport: (self.config.viewport_width, self.config.viewport_height),
            navigation_timeout: Duration::from_secs(self.config.navigation_timeout_secs),
            settle: Duration::from_millis(self.config.settle_ms),
            capture_screenshot: self.config.screenshots,
            collect_images: self.config.download_images,
        }
    }

    async fn save_screenshot(&self, domain: &str, page: &RenderedPage) -> Option<String> {
        if !self.config.screenshots {
            return None;
        }
        let bytes = page.screenshot.as_ref()?;
        let path = self
            .config
            .screenshot_dir
            .join(format!("{}_{}.png", file_stem(domain), timestamp()));
        match write_file(&path, bytes).await {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "saved screenshot");
                Some(path.display().to_string())
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to save screenshot");
                None
            }
        }
    }

    async fn download_images(&self, domain: &str, urls: &[String]) -> Vec<String> {
        let stamp = timestamp();
        let mut seen = HashSet::new();
        let mut saved = Vec::new();
        for url in urls {
            if saved.len() >= self.config.max_images {
                break;
            }
            if !is_fetchable(url) || !seen.insert(url.as_str()) {
                continue;
            }
            let name = format!(
                "{}_{}_{}.{}",
                file_stem(domain),
                stamp,
                saved.len(),
                image_extension(url)
            );
            let path = self.config.image_dir.join(name);
            match self.fetch_image(url, &path).await {
                Ok(()) => saved.push(path.display().to_string()),
                Err(e) => tracing::debug!(url = %url, error = %e, "image download failed"),
            }
        }
        saved
    }

    async fn fetch_image(&self, url: &str, path: &Path) -> Result<()> {
        let response = self
            .media
            .get(url)
            .header("User-Agent", pick_user_agent())
            .send()
            .await?
            .error_for_status()?;
        let bytes = response.bytes().await?;
        write_file(path, &bytes).await
    }
}

/// Choose which hits to scrape: the first `max` distinct URLs whose snippet
/// and cached text are both at most `rich_chars` long.
pub fn select_targets(
    hits: &[SearchHit],
    cache_hits: &[CacheHit],
    max: usize,
    rich_chars: usize,
) -> Vec<String> {
    let rich_cached: HashSet<String> = cache_hits
        .iter()
        .filter(|c| c.entry.content.chars().count() > rich_chars)
        .map(|c| normalize_url(&c.entry.url))
        .collect();

    let mut seen = HashSet::new();
    let mut targets = Vec::new();
    for hit in hits {
        if targets.len() >= max {
            break;
        }
        let key = normalize_url(&hit.url);
        if !seen.insert(key.clone()) {
            continue;
        }
        if rich_cached.contains(&key) || hit.snippet.chars().count() > rich_chars {
            tracing::debug!(url = %hit.url, "snippet already rich; not scraping");
            continue;
        }
        targets.push(hit.url.clone());
    }
    targets
}

fn pick_user_agent() -> String {
    USER_AGENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(USER_AGENTS[0])
        .to_string()
}

fn timestamp() -> String {
    chrono::Utc::now().format("%Y%m%d_%H%M%S").to_string()
}

fn file_stem(domain: &str) -> String {
    let stem: String = domain
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect();
    if stem.is_empty() {
        "page".to_string()
    } else {
        stem
    }
}

fn image_extension(url: &str) -> &'static str {
    let path = url::Url::parse(url)
        .map(|u| u.path().to_lowercase())
        .unwrap_or_default();
    for ext in ["png", "gif", "webp", "svg", "jpeg"] {
        if path.ends_with(&format!(".{ext}")) {
            return match ext {
                "jpeg" => "jpg",
                "png" => "png",
                "gif" => "gif",
                "webp" => "webp",
                _ => "svg",
            };
        }
    }
    "jpg"
}

async fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, bytes).await?;
    Ok(())
}

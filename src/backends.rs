//! Concrete search backends.
//!
//! | Name | Endpoint | Format |
//! |------|----------|--------|
//! | `duckduckgo` | `POST https://html.duckduckgo.com/html/` | HTML |
//! | `duckduckgo_lite` | `POST https://lite.duckduckgo.com/lite/` | HTML |
//! | `bing` | `GET https://www.bing.com/search` | HTML |
//! | `brave` | `GET https://api.search.brave.com/res/v1/web/search` | JSON, needs `BRAVE_API_KEY` |
//!
//! HTML pages are parsed with `scraper` inside synchronous helpers so the
//! non-`Send` document never lives across an `.await`. The parsers are
//! public for testing against saved pages.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use rand::seq::SliceRandom;
use scraper::{ElementRef, Html, Selector};

use webscout_core::backend::{RawHit, SearchBackend};
use webscout_core::error::BackendError;
use webscout_core::render::USER_AGENTS;
use webscout_core::urls::is_fetchable;

use crate::config::SearchConfig;

/// Build the backends named in `config.backends`, in priority order.
pub fn create_backends(config: &SearchConfig) -> Result<Vec<Arc<dyn SearchBackend>>> {
    let client = WebClient::new(config.timeout_secs)?;

    let mut out: Vec<Arc<dyn SearchBackend>> = Vec::with_capacity(config.backends.len());
    for name in &config.backends {
        let backend: Arc<dyn SearchBackend> = match name.as_str() {
            "duckduckgo" => Arc::new(DuckDuckGo::new(client.clone())),
            "duckduckgo_lite" => Arc::new(DuckDuckGoLite::new(client.clone())),
            "bing" => Arc::new(Bing::new(client.clone())),
            "brave" => {
                let key = std::env::var(&config.brave_api_key_env)
                    .ok()
                    .filter(|k| !k.trim().is_empty());
                Arc::new(Brave::new(client.clone(), key))
            }
            other => anyhow::bail!("Unknown search backend: '{}'", other),
        };
        out.push(backend);
    }
    Ok(out)
}

fn random_user_agent() -> &'static str {
    USER_AGENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(USER_AGENTS[0])
}

/// HTTP client shared by all backends.
#[derive(Clone)]
pub struct WebClient {
    inner: reqwest::Client,
    timeout_secs: u64,
}

impl WebClient {
    pub fn new(timeout_secs: u64) -> Result<Self> {
        let inner = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            inner,
            timeout_secs,
        })
    }

    /// Send `request` and return the body of a successful response.
    async fn fetch(
        &self,
        backend: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<String, BackendError> {
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                BackendError::timeout(backend, self.timeout_secs)
            } else {
                BackendError::transport(backend, e)
            }
        })?;
        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::Http {
                backend: backend.to_string(),
                status: status.as_u16(),
            });
        }
        response
            .text()
            .await
            .map_err(|e| BackendError::transport(backend, e))
    }
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn selector(backend: &str, css: &str) -> Result<Selector, BackendError> {
    Selector::parse(css).map_err(|e| BackendError::parse(backend, format!("{css}: {e:?}")))
}

// ============ DuckDuckGo (HTML) ============

pub struct DuckDuckGo {
    client: WebClient,
}

impl DuckDuckGo {
    pub const NAME: &'static str = "duckduckgo";
    const URL: &'static str = "https://html.duckduckgo.com/html/";

    pub fn new(client: WebClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SearchBackend for DuckDuckGo {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn text_search(&self, query: &str, max_results: usize)
        -> Result<Vec<RawHit>, BackendError> {
        let request = self
            .client
            .inner
            .post(Self::URL)
            .header("User-Agent", random_user_agent())
            .header("Accept", "text/html")
            .form(&[("q", query)]);
        let body = self.client.fetch(Self::NAME, request).await?;
        parse_duckduckgo_html(&body, max_results)
    }
}

/// Parse a DuckDuckGo HTML results page.
pub fn parse_duckduckgo_html(html: &str, max_results: usize) -> Result<Vec<RawHit>, BackendError> {
    let name = DuckDuckGo::NAME;
    let doc = Html::parse_document(html);
    let result_sel = selector(name, ".result")?;
    let link_sel = selector(name, "a.result__a")?;
    let snippet_sel = selector(name, "a.result__snippet, .result__snippet")?;

    let mut hits = Vec::new();
    for result in doc.select(&result_sel) {
        if hits.len() >= max_results {
            break;
        }
        // Sponsored results carry the ad class and redirect through ad URLs.
        if result.value().classes().any(|c| c == "result--ad") {
            continue;
        }
        let Some(link) = result.select(&link_sel).next() else {
            continue;
        };
        let url = decode_ddg_url(link.value().attr("href").unwrap_or_default());
        let title = element_text(link);
        if title.is_empty() || !is_fetchable(&url) {
            continue;
        }
        let snippet = result
            .select(&snippet_sel)
            .next()
            .map(element_text)
            .unwrap_or_default();
        hits.push(RawHit::new(url, title, snippet));
    }
    Ok(hits)
}

/// Resolve DuckDuckGo redirect links (`//duckduckgo.com/l/?uddg=<encoded>&rut=...`).
pub fn decode_ddg_url(href: &str) -> String {
    if let Some(pos) = href.find("uddg=") {
        let start = pos + "uddg=".len();
        let end = href[start..]
            .find('&')
            .map(|i| start + i)
            .unwrap_or(href.len());
        let encoded = &href[start..end];
        if !encoded.is_empty() {
            if let Ok(decoded) = urlencoding::decode(encoded) {
                return decoded.into_owned();
            }
        }
    }
    if let Some(rest) = href.strip_prefix("//") {
        return format!("https://{}", rest);
    }
    href.to_string()
}

// ============ DuckDuckGo (lite) ============

pub struct DuckDuckGoLite {
    client: WebClient,
}

impl DuckDuckGoLite {
    pub const NAME: &'static str = "duckduckgo_lite";
    const URL: &'static str = "https://lite.duckduckgo.com/lite/";

    pub fn new(client: WebClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SearchBackend for DuckDuckGoLite {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn text_search(&self, query: &str, max_results: usize)
        -> Result<Vec<RawHit>, BackendError> {
        let request = self
            .client
            .inner
            .post(Self::URL)
            .header("User-Agent", random_user_agent())
            .form(&[("q", query)]);
        let body = self.client.fetch(Self::NAME, request).await?;
        parse_duckduckgo_lite_html(&body, max_results)
    }
}

/// Parse a DuckDuckGo lite results table.
///
/// Links and snippets sit in sibling table rows, so they are paired by
/// position.
pub fn parse_duckduckgo_lite_html(
    html: &str,
    max_results: usize,
) -> Result<Vec<RawHit>, BackendError> {
    let name = DuckDuckGoLite::NAME;
    let doc = Html::parse_document(html);
    let link_sel = selector(name, "a.result-link")?;
    let snippet_sel = selector(name, "td.result-snippet")?;

    let snippets: Vec<String> = doc.select(&snippet_sel).map(element_text).collect();
    let hits = doc
        .select(&link_sel)
        .enumerate()
        .filter_map(|(i, link)| {
            let url = decode_ddg_url(link.value().attr("href").unwrap_or_default());
            let title = element_text(link);
            if title.is_empty() || !is_fetchable(&url) {
                return None;
            }
            let snippet = snippets.get(i).cloned().unwrap_or_default();
            Some(RawHit::new(url, title, snippet))
        })
        .take(max_results)
        .collect();
    Ok(hits)
}

// ============ Bing ============

pub struct Bing {
    client: WebClient,
}

impl Bing {
    pub const NAME: &'static str = "bing";
    const URL: &'static str = "https://www.bing.com/search";

    pub fn new(client: WebClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SearchBackend for Bing {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn text_search(&self, query: &str, max_results: usize)
        -> Result<Vec<RawHit>, BackendError> {
        let count = max_results.clamp(1, 50).to_string();
        let request = self
            .client
            .inner
            .get(Self::URL)
            .header("User-Agent", random_user_agent())
            .header("Accept-Language", "en-US,en;q=0.9")
            .query(&[("q", query), ("count", count.as_str())]);
        let body = self.client.fetch(Self::NAME, request).await?;
        parse_bing_html(&body, max_results)
    }
}

/// Parse a Bing results page (`li.b_algo` blocks).
pub fn parse_bing_html(html: &str, max_results: usize) -> Result<Vec<RawHit>, BackendError> {
    let name = Bing::NAME;
    let doc = Html::parse_document(html);
    let result_sel = selector(name, "li.b_algo")?;
    let link_sel = selector(name, "h2 a")?;
    let snippet_sel = selector(name, ".b_caption p, p.b_lineclamp2, p")?;

    let hits = doc
        .select(&result_sel)
        .filter_map(|result| {
            let link = result.select(&link_sel).next()?;
            let url = link.value().attr("href")?.to_string();
            let title = element_text(link);
            if title.is_empty() || !is_fetchable(&url) {
                return None;
            }
            let snippet = result
                .select(&snippet_sel)
                .next()
                .map(element_text)
                .unwrap_or_default();
            Some(RawHit::new(url, title, snippet))
        })
        .take(max_results)
        .collect();
    Ok(hits)
}

// ============ Brave Search API ============

pub struct Brave {
    client: WebClient,
    api_key: Option<String>,
}

impl Brave {
    pub const NAME: &'static str = "brave";
    const URL: &'static str = "https://api.search.brave.com/res/v1/web/search";

    pub fn new(client: WebClient, api_key: Option<String>) -> Self {
        Self { client, api_key }
    }
}

#[async_trait]
impl SearchBackend for Brave {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn text_search(&self, query: &str, max_results: usize)
        -> Result<Vec<RawHit>, BackendError> {
        let Some(key) = &self.api_key else {
            return Err(BackendError::Disabled {
                backend: Self::NAME.to_string(),
            });
        };
        // The API caps `count` at 20.
        let count = max_results.clamp(1, 20).to_string();
        let request = self
            .client
            .inner
            .get(Self::URL)
            .header("Accept", "application/json")
            .header("X-Subscription-Token", key)
            .query(&[("q", query), ("count", count.as_str())]);
        let body = self.client.fetch(Self::NAME, request).await?;
        parse_brave_json(&body, max_results)
    }
}

/// Parse a Brave web-search response (`web.results[]`).
pub fn parse_brave_json(body: &str, max_results: usize) -> Result<Vec<RawHit>, BackendError> {
    let json: serde_json::Value =
        serde_json::from_str(body).map_err(|e| BackendError::parse(Brave::NAME, e))?;
    let Some(results) = json
        .get("web")
        .and_then(|w| w.get("results"))
        .and_then(|r| r.as_array())
    else {
        return Ok(Vec::new());
    };

    let field = |item: &serde_json::Value, key: &str| {
        item.get(key)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    };
    Ok(results
        .iter()
        .filter_map(|item| {
            let url = field(item, "url");
            if !is_fetchable(&url) {
                return None;
            }
            // Descriptions carry <strong> highlighting.
            let snippet = webscout_core::extract::clean_text(&field(item, "description"));
            Some(RawHit::new(url, field(item, "title"), snippet))
        })
        .take(max_results)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DDG_PAGE: &str = r#"
        <div class="results">
          <div class="result results_links result--ad">
            <a class="result__a" href="https://duckduckgo.com/y.js?ad_provider=x">Buy now</a>
            <a class="result__snippet">Sponsored</a>
          </div>
          <div class="result results_links">
            <h2><a class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fdoc.rust-lang.org%2Fbook%2F&amp;rut=abc">The Rust   Book</a></h2>
            <a class="result__snippet">Learn <b>Rust</b> from the ground up.</a>
          </div>
          <div class="result results_links">
            <a class="result__a" href="https://tokio.rs/">Tokio</a>
            <div class="result__snippet">An asynchronous runtime.</div>
          </div>
          <div class="result"><a class="result__a" href="javascript:void(0)">Broken</a></div>
        </div>"#;

    #[test]
    fn test_parse_duckduckgo_html() {
        let hits = parse_duckduckgo_html(DDG_PAGE, 10).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].url, "https://doc.rust-lang.org/book/");
        assert_eq!(hits[0].title, "The Rust Book");
        assert_eq!(hits[0].snippet, "Learn Rust from the ground up.");
        assert_eq!(hits[1].url, "https://tokio.rs/");
        assert_eq!(hits[1].snippet, "An asynchronous runtime.");
    }

    #[test]
    fn test_parse_duckduckgo_respects_max() {
        assert_eq!(parse_duckduckgo_html(DDG_PAGE, 1).unwrap().len(), 1);
    }

    #[test]
    fn test_decode_ddg_url() {
        assert_eq!(
            decode_ddg_url("//duckduckgo.com/l/?uddg=https%3A%2F%2Fexample.com%2Fa%3Fb%3D1&rut=x"),
            "https://example.com/a?b=1"
        );
        assert_eq!(decode_ddg_url("https://plain.example/"), "https://plain.example/");
    }

    #[test]
    fn test_parse_duckduckgo_lite_pairs_rows() {
        let html = r#"<table>
            <tr><td><a class="result-link" href="https://a.example/">Alpha</a></td></tr>
            <tr><td class="result-snippet">Alpha snippet</td></tr>
            <tr><td><a class="result-link" href="https://b.example/">Beta</a></td></tr>
            <tr><td class="result-snippet">Beta snippet</td></tr>
        </table>"#;
        let hits = parse_duckduckgo_lite_html(html, 5).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[1].title, "Beta");
        assert_eq!(hits[1].snippet, "Beta snippet");
    }

    #[test]
    fn test_parse_bing_html() {
        let html = r#"<ol id="b_results">
            <li class="b_algo"><h2><a href="https://www.rust-lang.org/">Rust Programming Language</a></h2>
              <div class="b_caption"><p>A language empowering everyone.</p></div></li>
            <li class="b_ad"><h2><a href="https://ads.example/">Ad</a></h2></li>
            <li class="b_algo"><h2><a href="/relative">Relative</a></h2></li>
        </ol>"#;
        let hits = parse_bing_html(html, 5).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].url, "https://www.rust-lang.org/");
        assert_eq!(hits[0].snippet, "A language empowering everyone.");
    }

    #[test]
    fn test_parse_brave_json() {
        let body = r#"{"web":{"results":[
            {"title":"Serde","url":"https://serde.rs/","description":"A <strong>serialization</strong> framework"},
            {"title":"Bad","url":"ftp://nope"}
        ]}}"#;
        let hits = parse_brave_json(body, 5).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].snippet, "A serialization framework");
        assert!(parse_brave_json("not json", 5).is_err());
        assert!(parse_brave_json("{}", 5).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_brave_without_key_is_disabled() {
        let brave = Brave::new(WebClient::new(5).unwrap(), None);
        let err = brave.text_search("rust", 5).await.unwrap_err();
        assert_eq!(err.kind(), "disabled");
    }

    #[test]
    fn test_create_backends_in_priority_order() {
        let config = SearchConfig {
            backends: vec!["bing".into(), "duckduckgo".into()],
            ..Default::default()
        };
        let backends = create_backends(&config).unwrap();
        let names: Vec<&str> = backends.iter().map(|b| b.name()).collect();
        assert_eq!(names, vec!["bing", "duckduckgo"]);
    }
}

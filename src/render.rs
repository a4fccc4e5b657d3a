//! Page renderers.
//!
//! - [`HttpRenderer`]: plain GET, no JavaScript. Always available.
//! - [`ChromiumRenderer`]: headless Chromium over the DevTools protocol.
//!   Requires the `browser` feature and a Chrome/Chromium binary.
//!
//! Every call is an independent session. The Chromium renderer launches a
//! fresh browser with its own profile directory per call, and on every path,
//! success or error, closes the browser and deletes the profile.

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;

use webscout_core::error::BackendError;
use webscout_core::render::{PageRenderer, RenderOptions, RenderedPage};

use crate::config::ScrapeConfig;

/// Build the renderer named by `config.renderer`.
pub fn create_renderer(config: &ScrapeConfig) -> Result<Arc<dyn PageRenderer>> {
    match config.renderer.as_str() {
        "http" => Ok(Arc::new(HttpRenderer::new()?)),
        #[cfg(feature = "browser")]
        "chromium" => Ok(Arc::new(chromium::ChromiumRenderer::new(
            config.chrome_path.clone(),
            config.headless,
        ))),
        #[cfg(not(feature = "browser"))]
        "chromium" => bail!("The chromium renderer requires building with --features browser"),
        other => bail!("Unknown renderer: '{}'", other),
    }
}

#[cfg(feature = "browser")]
pub use chromium::ChromiumRenderer;

/// Fetches the server-rendered HTML of a page.
pub struct HttpRenderer {
    client: reqwest::Client,
}

impl HttpRenderer {
    pub const NAME: &'static str = "http";

    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageRenderer for HttpRenderer {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn render(&self, url: &str, options: &RenderOptions) -> Result<RenderedPage, BackendError> {
        let request = self
            .client
            .get(url)
            .header("User-Agent", &options.user_agent)
            .header("Accept", "text/html,application/xhtml+xml")
            .header("Accept-Language", "en-US,en;q=0.9")
            .timeout(options.navigation_timeout)
            .send();

        let response = request.await.map_err(|e| {
            if e.is_timeout() {
                BackendError::timeout(Self::NAME, options.navigation_timeout.as_secs())
            } else {
                BackendError::transport(Self::NAME, e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::Http {
                backend: Self::NAME.to_string(),
                status: status.as_u16(),
            });
        }
        let final_url = response.url().to_string();
        let html = response
            .text()
            .await
            .map_err(|e| BackendError::transport(Self::NAME, e))?;

        Ok(RenderedPage {
            final_url,
            html,
            screenshot: None,
            image_urls: Vec::new(),
        })
    }
}

#[cfg(feature = "browser")]
mod chromium {
    use std::path::{Path, PathBuf};
    use std::time::Duration;

    use async_trait::async_trait;
    use chromiumoxide::{Browser, BrowserConfig, Page};
    use futures::StreamExt;

    use webscout_core::error::BackendError;
    use webscout_core::extract::MIN_IMAGE_DIMENSION;
    use webscout_core::render::{PageRenderer, RenderOptions, RenderedPage};

    const NAME: &str = "chromium";

    /// Give up on a page that has not produced HTML within this long after settling.
    const CONTENT_TIMEOUT: Duration = Duration::from_secs(10);

    pub struct ChromiumRenderer {
        chrome_path: Option<PathBuf>,
        headless: bool,
    }

    impl ChromiumRenderer {
        pub fn new(chrome_path: Option<PathBuf>, headless: bool) -> Self {
            Self {
                chrome_path,
                headless,
            }
        }

        async fn launch(
            &self,
            user_data_dir: &Path,
            options: &RenderOptions,
        ) -> Result<(Browser, tokio::task::JoinHandle<()>), BackendError> {
            let chrome = find_chrome_binary(self.chrome_path.as_ref())
                .ok_or_else(|| BackendError::unavailable(NAME, "no Chrome/Chromium binary found"))?;

            let (width, height) = options.viewport;
            let mut builder = BrowserConfig::builder()
                .chrome_executable(chrome)
                .window_size(width, height)
                .user_data_dir(user_data_dir)
                .arg(format!("--user-agent={}", options.user_agent))
                .arg("--no-first-run")
                .arg("--no-default-browser-check")
                .arg("--disable-gpu")
                .arg("--disable-extensions")
                .arg("--disable-dev-shm-usage");
            if self.headless {
                builder = builder.arg("--headless=new");
            } else {
                builder = builder.with_head();
            }
            let config = builder
                .build()
                .map_err(|e| BackendError::unavailable(NAME, format!("browser config: {e}")))?;

            let (browser, mut handler) = Browser::launch(config)
                .await
                .map_err(|e| BackendError::unavailable(NAME, format!("launch failed: {e}")))?;
            let handler_task = tokio::spawn(async move {
                while handler.next().await.is_some() {}
            });
            Ok((browser, handler_task))
        }

        async fn session(
            &self,
            browser: &Browser,
            url: &str,
            options: &RenderOptions,
        ) -> Result<RenderedPage, BackendError> {
            let page = browser
                .new_page("about:blank")
                .await
                .map_err(|e| BackendError::transport(NAME, e))?;

            match tokio::time::timeout(options.navigation_timeout, page.goto(url)).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => return Err(BackendError::transport(NAME, e)),
                Err(_) => {
                    return Err(BackendError::timeout(
                        NAME,
                        options.navigation_timeout.as_secs(),
                    ))
                }
            }
            tokio::time::sleep(options.settle).await;

            let html = tokio::time::timeout(CONTENT_TIMEOUT, page.content())
                .await
                .map_err(|_| BackendError::timeout(NAME, CONTENT_TIMEOUT.as_secs()))?
                .map_err(|e| BackendError::transport(NAME, e))?;

            let final_url = page
                .url()
                .await
                .ok()
                .flatten()
                .unwrap_or_else(|| url.to_string());

            let screenshot = if options.capture_screenshot {
                capture(&page).await
            } else {
                None
            };
            let image_urls = if options.collect_images {
                content_images(&page).await
            } else {
                Vec::new()
            };

            Ok(RenderedPage {
                final_url,
                html,
                screenshot,
                image_urls,
            })
        }
    }

    #[async_trait]
    impl PageRenderer for ChromiumRenderer {
        fn name(&self) -> &str {
            NAME
        }

        async fn render(&self, url: &str, options: &RenderOptions) -> Result<RenderedPage, BackendError> {
            let profile = profile_dir();
            let (mut browser, handler) = match self.launch(&profile, options).await {
                Ok(launched) => launched,
                Err(e) => {
                    discard_profile(&profile).await;
                    return Err(e);
                }
            };
            let result = self.session(&browser, url, options).await;

            if let Err(e) = browser.close().await {
                tracing::debug!(error = %e, "browser close failed");
            }
            let _ = browser.wait().await;
            handler.abort();
            discard_profile(&profile).await;
            result
        }
    }

    /// A unique profile dir per session keeps concurrent sessions apart.
    fn profile_dir() -> PathBuf {
        std::env::temp_dir().join(format!("webscout-chrome-{}", uuid::Uuid::new_v4()))
    }

    /// Delete a session's profile once the browser has exited.
    async fn discard_profile(dir: &Path) {
        match tokio::fs::remove_dir_all(dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(error = %e, dir = %dir.display(), "failed to remove browser profile")
            }
        }
    }

    async fn capture(page: &Page) -> Option<Vec<u8>> {
        let params = chromiumoxide::page::ScreenshotParams::builder()
            .full_page(false)
            .build();
        match page.screenshot(params).await {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                tracing::warn!(error = %e, "screenshot failed");
                None
            }
        }
    }

    /// Rendered images larger than the icon threshold, in document order.
    async fn content_images(page: &Page) -> Vec<String> {
        let js = format!(
            "Array.from(document.images)\
               .filter(img => img.width > {min} && img.height > {min})\
               .map(img => img.src)",
            min = MIN_IMAGE_DIMENSION
        );
        match page.evaluate(js).await {
            Ok(result) => result.into_value::<Vec<String>>().unwrap_or_default(),
            Err(e) => {
                tracing::debug!(error = %e, "image collection failed");
                Vec::new()
            }
        }
    }

    fn find_chrome_binary(configured: Option<&PathBuf>) -> Option<PathBuf> {
        if let Some(p) = configured {
            if p.exists() {
                return Some(p.clone());
            }
            tracing::warn!(path = %p.display(), "configured chrome_path does not exist");
        }

        let candidates: &[&str] = if cfg!(target_os = "macos") {
            &[
                "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
                "/Applications/Chromium.app/Contents/MacOS/Chromium",
            ]
        } else if cfg!(target_os = "windows") {
            &[
                r"C:\Program Files\Google\Chrome\Application\chrome.exe",
                r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            ]
        } else {
            &[
                "/usr/bin/google-chrome",
                "/usr/bin/google-chrome-stable",
                "/usr/bin/chromium",
                "/usr/bin/chromium-browser",
                "/snap/bin/chromium",
            ]
        };
        candidates
            .iter()
            .map(PathBuf::from)
            .find(|p| p.exists())
    }

}

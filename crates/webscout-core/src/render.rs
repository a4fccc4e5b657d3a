//! Page renderer collaborator.
//!
//! A renderer loads a URL the way a browser would and hands back the final
//! HTML. Each call is an independent session: implementations must tear
//! down whatever they launched before returning, on success and on error.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::BackendError;

/// Desktop user agents rotated across render sessions.
pub const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
];

/// Per-session render settings.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub user_agent: String,
    pub viewport: (u32, u32),
    pub navigation_timeout: Duration,
    /// Extra wait after navigation for client-side rendering to settle.
    pub settle: Duration,
    pub capture_screenshot: bool,
    /// Collect `<img>` sources from the rendered page.
    pub collect_images: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            user_agent: USER_AGENTS[0].to_string(),
            viewport: (1280, 800),
            navigation_timeout: Duration::from_secs(30),
            settle: Duration::from_secs(3),
            capture_screenshot: false,
            collect_images: false,
        }
    }
}

/// Output of one render session.
#[derive(Debug, Clone, Default)]
pub struct RenderedPage {
    /// Final URL after redirects.
    pub final_url: String,
    pub html: String,
    /// PNG bytes when a screenshot was requested and the renderer supports it.
    pub screenshot: Option<Vec<u8>>,
    /// Absolute image URLs large enough to be content (renderer permitting).
    pub image_urls: Vec<String>,
}

/// A page-rendering backend (headless browser or plain fetch).
#[async_trait]
pub trait PageRenderer: Send + Sync {
    fn name(&self) -> &str;

    async fn render(&self, url: &str, options: &RenderOptions)
        -> Result<RenderedPage, BackendError>;
}

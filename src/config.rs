//! Configuration parsing and validation.
//!
//! webscout is configured via a TOML file (default: `config/scout.toml`).
//! Only `[db]` is required; every other section falls back to defaults
//! that reproduce the stock research behaviour.
//!
//! # Example
//!
//! ```toml
//! [db]
//! path = "./data/scout.sqlite"
//!
//! [llm]
//! model = "mistralai/mistral-7b-instruct"
//!
//! [search]
//! backends = ["duckduckgo", "duckduckgo_lite", "bing"]
//!
//! [scrape]
//! renderer = "http"
//! max_scrape_per_run = 3
//!
//! [pipeline]
//! context_char_budget = 8000
//! ```
//!
//! [`load_config`] rejects values the pipeline cannot honour (zero budgets,
//! inverted delay ranges, unknown backend or renderer names) before
//! anything is wired up.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use webscout_core::escalation::{
    DEFAULT_KEYWORDS, DEFAULT_MIN_SNIPPET_CHARS, DEFAULT_RICH_SNIPPET_CHARS,
};

/// Search backend names accepted in `search.backends`.
pub const KNOWN_BACKENDS: &[&str] = &["duckduckgo", "duckduckgo_lite", "bing", "brave"];

/// Renderer names accepted in `scrape.renderer`.
pub const KNOWN_RENDERERS: &[&str] = &["http", "chromium"];

/// Top-level configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub expansion: ExpansionConfig,
    #[serde(default)]
    pub escalation: EscalationConfig,
    #[serde(default)]
    pub scrape: ScrapeConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub answer: AnswerConfig,
    #[serde(default)]
    pub assistant: AssistantConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// OpenAI-compatible chat-completion endpoint.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://openrouter.ai/api/v1".to_string(),
            model: "mistralai/mistral-7b-instruct".to_string(),
            api_key_env: "OPENROUTER_API_KEY".to_string(),
            timeout_secs: 30,
            max_retries: 3,
        }
    }
}

/// Embedding provider used by the SQLite store for semantic cache lookups.
#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Override for the provider's base URL (Ollama defaults to localhost).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CacheConfig {
    pub validity_hours: i64,
    /// Nearest documents fetched per lookup.
    pub lookup_top_k: usize,
    /// Share of a query's significant terms an entry must contain to count as a hit.
    pub min_coverage: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            validity_hours: webscout_core::cache::DEFAULT_VALIDITY_HOURS,
            lookup_top_k: webscout_core::cache::DEFAULT_LOOKUP_TOP_K,
            min_coverage: webscout_core::cache::DEFAULT_MIN_COVERAGE,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SearchConfig {
    /// Backends in priority order.
    pub backends: Vec<String>,
    pub results_per_query: usize,
    /// Fewer new hits than this from a backend moves on to the next one.
    pub min_acceptable: usize,
    pub timeout_secs: u64,
    pub delay_min_ms: u64,
    pub delay_max_ms: u64,
    /// Snippets at least this long are written to the cache during search.
    pub min_snippet_chars: usize,
    pub brave_api_key_env: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            backends: vec![
                "duckduckgo".to_string(),
                "duckduckgo_lite".to_string(),
                "bing".to_string(),
            ],
            results_per_query: 5,
            min_acceptable: 3,
            timeout_secs: 12,
            delay_min_ms: 500,
            delay_max_ms: 2000,
            min_snippet_chars: 50,
            brave_api_key_env: "BRAVE_API_KEY".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ExpansionConfig {
    pub max_variants: usize,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for ExpansionConfig {
    fn default() -> Self {
        Self {
            max_variants: 4,
            temperature: 0.7,
            max_tokens: 200,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EscalationConfig {
    pub keywords: Vec<String>,
    pub min_snippet_chars: usize,
    /// At or above this many snippet chars the results are sufficient without asking the LLM.
    pub rich_snippet_chars: usize,
    /// Ask the LLM when the heuristics are inconclusive.
    pub llm_tie_break: bool,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            keywords: DEFAULT_KEYWORDS.iter().map(|k| k.to_string()).collect(),
            min_snippet_chars: DEFAULT_MIN_SNIPPET_CHARS,
            rich_snippet_chars: DEFAULT_RICH_SNIPPET_CHARS,
            llm_tie_break: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ScrapeConfig {
    pub renderer: String,
    pub max_scrape_per_run: usize,
    /// Hits whose snippet or cached text is longer than this are not scraped.
    pub rich_snippet_chars: usize,
    pub delay_ms: u64,
    pub concurrency: usize,
    pub navigation_timeout_secs: u64,
    pub settle_ms: u64,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub min_content_chars: usize,
    pub max_text_chars: usize,
    pub screenshots: bool,
    pub screenshot_dir: PathBuf,
    pub download_images: bool,
    pub image_dir: PathBuf,
    pub max_images: usize,
    /// JSON file holding learned hard-to-scrape domains.
    pub domains_file: PathBuf,
    pub chrome_path: Option<PathBuf>,
    pub headless: bool,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            renderer: "http".to_string(),
            max_scrape_per_run: 3,
            rich_snippet_chars: 300,
            delay_ms: 1000,
            concurrency: 1,
            navigation_timeout_secs: 30,
            settle_ms: 3000,
            viewport_width: 1280,
            viewport_height: 800,
            min_content_chars: 150,
            max_text_chars: 5000,
            screenshots: false,
            screenshot_dir: PathBuf::from("./data/screenshots"),
            download_images: false,
            image_dir: PathBuf::from("./data/images"),
            max_images: 5,
            domains_file: PathBuf::from("./data/hard_domains.json"),
            chrome_path: None,
            headless: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PipelineConfig {
    pub context_char_budget: usize,
    /// Wall-clock bound on a run, measured from its start; caps the scrape stage.
    pub deadline_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            context_char_budget: webscout_core::aggregate::DEFAULT_CONTEXT_CHAR_BUDGET,
            deadline_secs: 60,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AnswerConfig {
    pub per_source_chars: usize,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for AnswerConfig {
    fn default() -> Self {
        Self {
            per_source_chars: 1000,
            temperature: 0.7,
            max_tokens: 600,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AssistantConfig {
    pub name: String,
    /// Phrases that route an utterance straight to web research.
    pub search_triggers: Vec<String>,
    /// Phrases stripped from an utterance to obtain the search query.
    pub remove_words: Vec<String>,
    pub history_turns: usize,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        let strings = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            name: "Jarvis".to_string(),
            search_triggers: strings(&[
                "search",
                "look up",
                "find",
                "google",
                "what is",
                "who is",
                "tell me about",
            ]),
            remove_words: strings(&[
                "can you",
                "could you",
                "please",
                "search the web for",
                "search for",
                "search",
                "look up",
                "find out",
                "find",
                "google",
                "tell me about",
                "for me",
            ]),
            history_turns: 5,
            temperature: 0.7,
            max_tokens: 500,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:7341".to_string(),
        }
    }
}

/// Read, parse and validate a config file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate config text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Cache
    if config.cache.validity_hours <= 0 {
        bail!("cache.validity_hours must be > 0");
    }
    if config.cache.lookup_top_k == 0 {
        bail!("cache.lookup_top_k must be >= 1");
    }
    if !(config.cache.min_coverage > 0.0 && config.cache.min_coverage <= 1.0) {
        bail!(
            "cache.min_coverage must be in (0, 1], got {}",
            config.cache.min_coverage
        );
    }

    // Search
    if config.search.backends.is_empty() {
        bail!("search.backends must name at least one backend");
    }
    for name in &config.search.backends {
        if !KNOWN_BACKENDS.contains(&name.as_str()) {
            bail!(
                "Unknown search backend: '{}'. Must be one of: {}",
                name,
                KNOWN_BACKENDS.join(", ")
            );
        }
    }
    if config.search.results_per_query == 0 {
        bail!("search.results_per_query must be >= 1");
    }
    if config.search.timeout_secs == 0 {
        bail!("search.timeout_secs must be > 0");
    }
    if config.search.delay_min_ms > config.search.delay_max_ms {
        bail!(
            "search.delay_min_ms ({}) must be <= search.delay_max_ms ({})",
            config.search.delay_min_ms,
            config.search.delay_max_ms
        );
    }

    // Escalation
    if config.escalation.rich_snippet_chars <= config.escalation.min_snippet_chars {
        bail!(
            "escalation.rich_snippet_chars ({}) must be > escalation.min_snippet_chars ({})",
            config.escalation.rich_snippet_chars,
            config.escalation.min_snippet_chars
        );
    }

    // Expansion
    if config.expansion.max_variants == 0 {
        bail!("expansion.max_variants must be >= 1");
    }

    // Scrape
    if !KNOWN_RENDERERS.contains(&config.scrape.renderer.as_str()) {
        bail!(
            "Unknown renderer: '{}'. Must be http or chromium.",
            config.scrape.renderer
        );
    }
    if config.scrape.concurrency == 0 {
        bail!("scrape.concurrency must be >= 1");
    }
    if config.scrape.max_text_chars == 0 {
        bail!("scrape.max_text_chars must be > 0");
    }

    // Pipeline
    if config.pipeline.context_char_budget == 0 {
        bail!("pipeline.context_char_budget must be > 0");
    }
    if config.pipeline.deadline_secs == 0 {
        bail!("pipeline.deadline_secs must be > 0");
    }

    // Embedding
    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }
    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    Ok(())
}

//! # webscout CLI (`scout`)
//!
//! ## Usage
//!
//! ```bash
//! scout --config ./config/scout.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `scout init` | Create the SQLite database and schema |
//! | `scout research "<query>"` | Run the full research pipeline |
//! | `scout ask "<utterance>"` | One assistant turn (research when needed) |
//! | `scout search "<query>"` | Snippet search only |
//! | `scout scrape <url>` | Render and clean one page |
//! | `scout cache "<query>"` | Show valid cached entries for a query |
//! | `scout domains` | List learned hard-to-scrape domains |
//! | `scout serve` | Start the HTTP API |
//!
//! ## Examples
//!
//! ```bash
//! scout init
//! scout research "rust async runtime comparison" --json
//! scout research "tokio dashboard layout" --force-render
//! scout ask "who is the maintainer of serde"
//! RUST_LOG=webscout=debug scout search "sqlite fts5 bm25" --limit 10
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};

use webscout::answer::{answer, Assistant};
use webscout::config::{load_config, Config};
use webscout::domains::FileDomainAdvisory;
use webscout::llm::ChatClient;
use webscout::pipeline::{ResearchOptions, ResearchOutcome, ResearchPipeline};
use webscout::server::{run_server, AppState};
use webscout::sqlite_store::SqliteStore;
use webscout::{logging, migrate};
use webscout_core::cache::ResultCache;
use webscout_core::completion::CompletionService;
use webscout_core::domains::DomainAdvisory;
use webscout_core::models::{DocumentKind, SearchQuery};
use webscout_core::store::DocumentStore;

/// webscout: expand a question into search variants, gather snippets and
/// rendered pages, and fold them into a bounded context for an LLM answer.
#[derive(Parser)]
#[command(name = "scout", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/scout.toml")]
    config: PathBuf,

    /// More log output (-v debug, -vv trace). `RUST_LOG` overrides.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Research a query and print the gathered context.
    Research {
        query: String,

        /// Render the top hits even when snippets look sufficient.
        #[arg(long)]
        force_render: bool,

        /// Print the full outcome as JSON.
        #[arg(long)]
        json: bool,

        /// Also generate an answer from the context.
        #[arg(long)]
        answer: bool,
    },

    /// Run one assistant turn.
    Ask { query: String },

    /// Snippet search only, no cache lookup or rendering.
    Search {
        query: String,

        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Render and clean a single page.
    Scrape {
        url: String,

        /// Query used for the relevance check.
        #[arg(long)]
        query: Option<String>,

        /// Scrape even if the domain is marked hard to scrape.
        #[arg(long)]
        force: bool,
    },

    /// Show valid cached entries similar to a query.
    Cache { query: String },

    /// List learned hard-to-scrape domains.
    Domains,

    /// Start the HTTP API on `[server].bind`.
    Serve,
}

/// Long-lived collaborators shared by the commands that need them.
struct Services {
    store: Arc<dyn DocumentStore>,
    llm: Arc<dyn CompletionService>,
    pipeline: Arc<ResearchPipeline>,
}

impl Services {
    async fn open(config: &Config) -> Result<Self> {
        let store: Arc<dyn DocumentStore> = Arc::new(SqliteStore::open(config).await?);
        let llm: Arc<dyn CompletionService> = Arc::new(ChatClient::from_config(&config.llm)?);
        let pipeline = Arc::new(ResearchPipeline::from_config(config, store.clone(), llm.clone())?);
        Ok(Self {
            store,
            llm,
            pipeline,
        })
    }

    fn assistant(&self, config: &Config) -> Assistant {
        Assistant::new(
            self.pipeline.clone(),
            self.llm.clone(),
            config.assistant.clone(),
            config.answer.clone(),
        )
        .with_memory(self.store.clone())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.json_logs);

    let cfg = load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
            let store = SqliteStore::open(&cfg).await?;
            println!(
                "Cached pages: {}  conversation turns: {}",
                store.count(DocumentKind::WebContext).await?,
                store.count(DocumentKind::Conversation).await?
            );
            store.pool().close().await;
        }
        Commands::Research {
            query,
            force_render,
            json,
            answer: with_answer,
        } => {
            let services = Services::open(&cfg).await?;
            let outcome = services
                .pipeline
                .research(&query, ResearchOptions { force_render })
                .await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                print_outcome(&outcome);
            }
            if with_answer {
                let reply = answer(services.llm.as_ref(), &cfg.answer, &query, &outcome).await;
                println!("\n{}", reply);
            }
        }
        Commands::Ask { query } => {
            let services = Services::open(&cfg).await?;
            let reply = services.assistant(&cfg).respond(&query).await;
            println!("{}", reply.answer);
            if !reply.sources.is_empty() {
                println!("\nSources ({}):", reply.route.as_str());
                for (i, url) in reply.sources.iter().enumerate() {
                    println!("  [{}] {}", i + 1, url);
                }
            }
        }
        Commands::Search { query, limit } => {
            let services = Services::open(&cfg).await?;
            let hits = services
                .pipeline
                .engine()
                .search(&SearchQuery::original(query.as_str()), limit)
                .await;
            if hits.is_empty() {
                println!("No results.");
            }
            for (i, hit) in hits.iter().enumerate() {
                println!("{}. {} [{}]", i + 1, hit.title, hit.backend);
                println!("    {}", hit.url);
                if !hit.snippet.is_empty() {
                    println!("    {}", hit.snippet);
                }
            }
        }
        Commands::Scrape { url, query, force } => {
            let services = Services::open(&cfg).await?;
            let scraper = services.pipeline.scraper();
            let result = scraper
                .scrape(&url, query.as_deref().unwrap_or_default(), force)
                .await;
            if !result.scraped {
                println!("Could not scrape {} with the {} renderer.", url, scraper.renderer_name());
                return Ok(());
            }
            println!("{}\n", result.text);
            if let Some(path) = &result.screenshot {
                println!("screenshot: {}", path);
            }
            for path in &result.images {
                println!("image: {}", path);
            }
        }
        Commands::Cache { query } => {
            let store: Arc<dyn DocumentStore> = Arc::new(SqliteStore::open(&cfg).await?);
            let cache = ResultCache::new(store)
                .with_validity(chrono::Duration::hours(cfg.cache.validity_hours))
                .with_top_k(cfg.cache.lookup_top_k)
                .with_min_coverage(cfg.cache.min_coverage);
            let entries = cache.lookup(&query).await;
            if entries.is_empty() {
                println!("No valid cached entries.");
            }
            for entry in entries {
                println!(
                    "{}  {}  (query: {})",
                    entry.fetched_at.format("%Y-%m-%d %H:%M"),
                    entry.url,
                    entry.query
                );
                println!("    {}", preview(&entry.content, 160));
            }
        }
        Commands::Domains => {
            let advisory = FileDomainAdvisory::open(&cfg.scrape.domains_file);
            let domains = advisory.domains();
            if domains.is_empty() {
                println!("No hard-to-scrape domains recorded.");
            }
            for d in domains {
                println!("{}", d);
            }
        }
        Commands::Serve => {
            let services = Services::open(&cfg).await?;
            let state = AppState {
                assistant: Arc::new(services.assistant(&cfg)),
                pipeline: services.pipeline.clone(),
            };
            run_server(&cfg.server.bind, state).await?;
        }
    }

    Ok(())
}

fn print_outcome(outcome: &ResearchOutcome) {
    println!("Query: {}", outcome.query);
    let variants: Vec<&str> = outcome.variants.iter().map(|v| v.text.as_str()).collect();
    println!("Variants: {}", variants.join(" | "));
    println!(
        "Hits: {}  cached: {}  scraped: {}  ({})  {} ms",
        outcome.total_hits,
        outcome.cache_hits,
        outcome.pages_scraped,
        outcome.decision,
        outcome.elapsed_ms
    );
    if outcome.context.is_empty() {
        println!("\nNo context gathered.");
        return;
    }
    println!(
        "Context: {} sections, {} chars{}",
        outcome.context.sections.len(),
        outcome.context.total_chars,
        if outcome.context.truncated { " (truncated)" } else { "" }
    );
    for (i, section) in outcome.context.sections.iter().enumerate() {
        println!("\n[{}] {} ({:?})", i + 1, section.url, section.source);
        println!("{}", preview(&section.text, 300));
    }
}

fn preview(text: &str, max: usize) -> String {
    let mut out: String = text.chars().take(max).collect();
    if text.chars().count() > max {
        out.push_str("...");
    }
    out
}

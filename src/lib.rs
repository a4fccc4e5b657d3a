//! # webscout
//!
//! A local-first web research pipeline for an LLM assistant.
//!
//! Given a free-form question, webscout asks an LLM for complementary search
//! variants, runs them against snippet search backends behind a time-boxed
//! cache, decides whether snippets are enough or pages must be rendered,
//! scrapes the best remaining results, and folds everything into a bounded
//! context for answer generation.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌──────────────┐   ┌────────────┐   ┌────────────┐
//! │ Expander  │──▶│ Cache/Search │──▶│ Escalation │──▶│  Scraper   │
//! │   (LLM)   │   │  (backends)  │   │  (policy)  │   │ (renderer) │
//! └───────────┘   └──────┬───────┘   └────────────┘   └─────┬──────┘
//!                        │                                  │
//!                        ▼                                  ▼
//!                  ┌───────────┐                     ┌────────────┐
//!                  │  SQLite   │◀────────────────────│ Aggregator │
//!                  │ FTS5+Vec  │                     └─────┬──────┘
//!                  └───────────┘                           ▼
//!                                            answer / CLI (scout) / HTTP
//! ```
//!
//! The runtime-agnostic stages live in `webscout-core`; this crate supplies
//! the concrete collaborators (SQLite, HTTP search backends, renderers, the
//! chat-completion client) and the CLI and HTTP surfaces.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`db`] / [`migrate`] | SQLite connection and schema |
//! | [`sqlite_store`] | Document store (FTS5 + optional vectors) |
//! | [`embedding`] | Embedding providers |
//! | [`llm`] | Chat-completion client |
//! | [`retry`] | JSON POST with exponential backoff |
//! | [`backends`] | Search backends |
//! | [`search`] | Snippet search with backend fallback |
//! | [`render`] | Page renderers |
//! | [`domains`] | Persisted hard-to-scrape domain list |
//! | [`scrape`] | Rendered scraping and scrape policy |
//! | [`pipeline`] | End-to-end research |
//! | [`answer`] | Answer generation and assistant flow |
//! | [`server`] | HTTP API |

pub mod answer;
pub mod backends;
pub mod config;
pub mod db;
pub mod domains;
pub mod embedding;
pub mod llm;
pub mod logging;
pub mod migrate;
pub mod pipeline;
pub mod render;
pub mod retry;
pub mod scrape;
pub mod search;
pub mod server;
pub mod sqlite_store;

//! # webscout core
//!
//! Runtime-agnostic logic for the webscout research pipeline: data models,
//! the typed error taxonomy for external calls, collaborator traits, query
//! expansion, the result cache, the escalation policy, and context
//! aggregation.
//!
//! This crate contains no tokio, sqlx, or HTTP client dependencies. Concrete
//! collaborators (search backends, renderers, the SQLite store, the LLM
//! client) live in the `webscout` app crate and are injected through the
//! traits defined here.

pub mod aggregate;
pub mod backend;
pub mod cache;
pub mod completion;
pub mod domains;
pub mod embedding;
pub mod error;
pub mod escalation;
pub mod expand;
pub mod extract;
pub mod models;
pub mod render;
pub mod store;
pub mod urls;

#[cfg(test)]
mod test_support;

//! Embedding calls for semantic cache lookups.
//!
//! `embedding.provider` selects the endpoint:
//!
//! - `disabled`: no embeddings; the store ranks by FTS5 only.
//! - `openai`: `POST https://api.openai.com/v1/embeddings`, key from `OPENAI_API_KEY`.
//! - `ollama`: `POST {url}/api/embed` on a local Ollama instance.
//!
//! Both network providers retry transient failures with exponential
//! backoff (see [`crate::retry`]).

use anyhow::{anyhow, bail, Result};

use crate::config::EmbeddingConfig;
use crate::retry::JsonEndpoint;

/// Embed a batch of texts, returned in input order.
pub async fn embed_texts(config: &EmbeddingConfig, texts: &[String]) -> Result<Vec<Vec<f32>>> {
    if texts.is_empty() {
        return Ok(Vec::new());
    }
    let model = config
        .model
        .as_deref()
        .ok_or_else(|| anyhow!("embedding.model required"))?;
    let body = serde_json::json!({ "model": model, "input": texts });

    let vectors = match config.provider.as_str() {
        "openai" => {
            let key = std::env::var("OPENAI_API_KEY")
                .map_err(|_| anyhow!("OPENAI_API_KEY not set"))?;
            let endpoint = JsonEndpoint::new(
                "openai-embeddings",
                "https://api.openai.com/v1/embeddings",
                config.timeout_secs,
                config.max_retries,
            )?
            .bearer(Some(key));
            parse_openai_response(&endpoint.post(&body).await?)?
        }
        "ollama" => {
            let base = config.url.as_deref().unwrap_or("http://localhost:11434");
            let endpoint = JsonEndpoint::new(
                "ollama-embeddings",
                format!("{}/api/embed", base.trim_end_matches('/')),
                config.timeout_secs,
                config.max_retries,
            )?;
            parse_ollama_response(&endpoint.post(&body).await?)?
        }
        "disabled" => bail!("Embedding provider is disabled"),
        other => bail!("Unknown embedding provider: {}", other),
    };

    if vectors.len() != texts.len() {
        bail!(
            "Embedding response has {} vectors for {} inputs",
            vectors.len(),
            texts.len()
        );
    }
    Ok(vectors)
}

/// Embed a single text.
pub async fn embed_query(config: &EmbeddingConfig, text: &str) -> Result<Vec<f32>> {
    embed_texts(config, &[text.to_string()])
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("Empty embedding response"))
}

/// `data[].embedding`, re-ordered by `data[].index` when present.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (pos, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow!("Invalid OpenAI response: missing embedding"))?;
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(pos);
        indexed.push((index, to_f32(embedding)));
    }
    indexed.sort_by_key(|(i, _)| *i);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow!("Invalid Ollama response: missing embeddings array"))?;

    embeddings
        .iter()
        .map(|e| {
            e.as_array()
                .map(|values| to_f32(values))
                .ok_or_else(|| anyhow!("Invalid Ollama response: embedding is not an array"))
        })
        .collect()
}

fn to_f32(values: &[serde_json::Value]) -> Vec<f32> {
    values
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect()
}

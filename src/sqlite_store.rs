//! SQLite-backed [`DocumentStore`] implementation.
//!
//! Documents live in `web_documents`, mirrored into the `web_documents_fts`
//! FTS5 table for BM25 keyword ranking. When an embedding provider is
//! configured, each new document is also embedded into
//! `web_document_vectors` and queries rank by cosine similarity, falling
//! back to BM25 when the provider is unreachable or no vectors exist yet.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use webscout_core::embedding::{blob_to_vec, cosine_similarity, embedding_input, vec_to_blob};
use webscout_core::models::{DocumentKind, WebDocument};
use webscout_core::store::{query_terms, DocumentStore, ScoredDocument};

use crate::config::{Config, EmbeddingConfig};
use crate::embedding::{embed_query, embed_texts};
use crate::{db, migrate};

/// Characters of document content fed to the embedding model.
const EMBED_INPUT_CHARS: usize = 2000;

pub struct SqliteStore {
    pool: SqlitePool,
    embedding: Option<EmbeddingConfig>,
}

impl SqliteStore {
    /// Keyword-only store.
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            embedding: None,
        }
    }

    /// Connect, create the schema if needed, and enable embeddings per config.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply_schema(&pool).await?;
        Ok(Self::new(pool).with_embeddings(&config.embedding))
    }

    /// Enable vector ranking when `config` names a real provider.
    pub fn with_embeddings(mut self, config: &EmbeddingConfig) -> Self {
        self.embedding = config.is_enabled().then(|| config.clone());
        self
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Number of stored documents of `kind`.
    pub async fn count(&self, kind: DocumentKind) -> Result<i64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM web_documents WHERE kind = ?")
            .bind(kind.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    async fn store_vector(&self, config: &EmbeddingConfig, doc: &WebDocument) -> Result<()> {
        let model = config
            .model
            .as_deref()
            .ok_or_else(|| anyhow!("embedding.model required"))?;
        let input = embedding_input(&doc.query, &doc.content, EMBED_INPUT_CHARS);
        let vector = embed_texts(config, &[input])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("Empty embedding response"))?;

        sqlx::query(
            r#"
            INSERT INTO web_document_vectors (document_id, model, dims, embedding, content_hash)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(document_id) DO UPDATE SET
                model = excluded.model,
                dims = excluded.dims,
                embedding = excluded.embedding,
                content_hash = excluded.content_hash
            "#,
        )
        .bind(&doc.id)
        .bind(model)
        .bind(vector.len() as i64)
        .bind(vec_to_blob(&vector))
        .bind(doc.content_hash())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn keyword_query(
        &self,
        text: &str,
        kind: DocumentKind,
        top_k: usize,
    ) -> Result<Vec<ScoredDocument>> {
        let Some(expr) = fts_match_expression(text) else {
            return Ok(Vec::new());
        };
        let rows = sqlx::query(
            r#"
            SELECT d.id, d.kind, d.query, d.url, d.content, d.fetched_at,
                   bm25(web_documents_fts) AS rank
            FROM web_documents_fts
            JOIN web_documents d ON d.id = web_documents_fts.document_id
            WHERE web_documents_fts MATCH ? AND web_documents_fts.kind = ?
            ORDER BY rank
            LIMIT ?
            "#,
        )
        .bind(&expr)
        .bind(kind.as_str())
        .bind(top_k as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let rank: f64 = row.get("rank");
                Ok(ScoredDocument {
                    document: row_to_document(row)?,
                    score: -rank,
                })
            })
            .collect()
    }

    async fn vector_query(
        &self,
        config: &EmbeddingConfig,
        text: &str,
        kind: DocumentKind,
        top_k: usize,
    ) -> Result<Vec<ScoredDocument>> {
        let query_vec = embed_query(config, text).await?;
        let rows = sqlx::query(
            r#"
            SELECT d.id, d.kind, d.query, d.url, d.content, d.fetched_at, v.embedding
            FROM web_document_vectors v
            JOIN web_documents d ON d.id = v.document_id
            WHERE d.kind = ? AND v.model = ?
            "#,
        )
        .bind(kind.as_str())
        .bind(config.model.as_deref().unwrap_or_default())
        .fetch_all(&self.pool)
        .await?;

        let mut scored = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                Ok(ScoredDocument {
                    document: row_to_document(row)?,
                    score: cosine_similarity(&query_vec, &blob_to_vec(&blob)) as f64,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(top_k);
        Ok(scored)
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn upsert(&self, doc: &WebDocument) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT OR IGNORE INTO web_documents
                (id, kind, query, url, content, content_hash, fetched_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&doc.id)
        .bind(doc.kind.as_str())
        .bind(&doc.query)
        .bind(&doc.url)
        .bind(&doc.content)
        .bind(doc.content_hash())
        .bind(doc.fetched_at.timestamp_millis())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted == 0 {
            tx.rollback().await?;
            return Ok(());
        }

        sqlx::query(
            "INSERT INTO web_documents_fts (document_id, kind, query, content) VALUES (?, ?, ?, ?)",
        )
        .bind(&doc.id)
        .bind(doc.kind.as_str())
        .bind(&doc.query)
        .bind(&doc.content)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        if let Some(config) = &self.embedding {
            if let Err(e) = self.store_vector(config, doc).await {
                tracing::warn!(id = %doc.id, error = %e, "embedding failed; document is keyword-searchable only");
            }
        }
        Ok(())
    }

    async fn query(
        &self,
        text: &str,
        kind: DocumentKind,
        top_k: usize,
    ) -> Result<Vec<ScoredDocument>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        if let Some(config) = &self.embedding {
            match self.vector_query(config, text, kind, top_k).await {
                Ok(found) if !found.is_empty() => return Ok(found),
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "vector query failed; falling back to keyword ranking")
                }
            }
        }
        self.keyword_query(text, kind, top_k).await
    }

    async fn recent(&self, kind: DocumentKind, limit: usize) -> Result<Vec<WebDocument>> {
        let rows = sqlx::query(
            r#"
            SELECT id, kind, query, url, content, fetched_at
            FROM web_documents
            WHERE kind = ?
            ORDER BY fetched_at DESC, rowid DESC
            LIMIT ?
            "#,
        )
        .bind(kind.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_document).collect()
    }
}

/// Quote each term and OR them together, so punctuation in user text can
/// never be parsed as FTS5 syntax. `None` when the text has no terms.
pub fn fts_match_expression(text: &str) -> Option<String> {
    let terms = query_terms(text);
    if terms.is_empty() {
        return None;
    }
    Some(
        terms
            .iter()
            .map(|t| format!("\"{}\"", t))
            .collect::<Vec<_>>()
            .join(" OR "),
    )
}

fn row_to_document(row: &SqliteRow) -> Result<WebDocument> {
    let kind: String = row.get("kind");
    let fetched_at: i64 = row.get("fetched_at");
    Ok(WebDocument {
        id: row.get("id"),
        kind: DocumentKind::parse(&kind).ok_or_else(|| anyhow!("Unknown document kind: {}", kind))?,
        query: row.get("query"),
        url: row.get("url"),
        content: row.get("content"),
        fetched_at: DateTime::<Utc>::from_timestamp_millis(fetched_at)
            .ok_or_else(|| anyhow!("Invalid fetched_at: {}", fetched_at))?,
    })
}

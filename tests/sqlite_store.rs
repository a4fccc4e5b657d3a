use std::sync::Arc;

use chrono::{Duration, Utc};
use tempfile::TempDir;

use webscout::config::{parse_config, Config};
use webscout::sqlite_store::SqliteStore;
use webscout_core::cache::ResultCache;
use webscout_core::models::{DocumentKind, WebDocument};
use webscout_core::store::DocumentStore;

fn config_in(dir: &TempDir) -> Config {
    let db_path = dir.path().join("data").join("scout.sqlite");
    parse_config(&format!("[db]\npath = \"{}\"\n", db_path.display())).unwrap()
}

async fn open_store(dir: &TempDir) -> SqliteStore {
    SqliteStore::open(&config_in(dir)).await.unwrap()
}

#[tokio::test]
async fn test_open_creates_database_file() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    assert!(tmp.path().join("data").join("scout.sqlite").exists());
    assert_eq!(store.count(DocumentKind::WebContext).await.unwrap(), 0);
}

#[tokio::test]
async fn test_upsert_is_idempotent_per_id() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    let doc = WebDocument::web_context(
        "tokio runtime",
        "https://tokio.rs",
        "Tokio is an asynchronous runtime for Rust.",
        Utc::now(),
    );
    store.upsert(&doc).await.unwrap();
    store.upsert(&doc).await.unwrap();
    assert_eq!(store.count(DocumentKind::WebContext).await.unwrap(), 1);

    let found = store
        .query("tokio", DocumentKind::WebContext, 10)
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
}

#[tokio::test]
async fn test_keyword_query_ranks_and_filters_by_kind() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    let now = Utc::now();
    for doc in [
        WebDocument::web_context(
            "sqlite fts5",
            "https://sqlite.org/fts5.html",
            "FTS5 is an SQLite virtual table module for full-text search. FTS5 ranks with bm25.",
            now,
        ),
        WebDocument::web_context(
            "sqlite wal",
            "https://sqlite.org/wal.html",
            "Write-ahead logging lets readers and a writer work concurrently.",
            now,
        ),
        WebDocument::conversation("tell me about fts5", "It is a search module.", "general", now),
    ] {
        store.upsert(&doc).await.unwrap();
    }

    let found = store
        .query("fts5 ranking", DocumentKind::WebContext, 10)
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].document.url, "https://sqlite.org/fts5.html");

    let both = store
        .query("sqlite", DocumentKind::WebContext, 10)
        .await
        .unwrap();
    assert_eq!(both.len(), 2);
    assert!(both[0].score >= both[1].score);

    let turns = store
        .query("fts5", DocumentKind::Conversation, 10)
        .await
        .unwrap();
    assert_eq!(turns.len(), 1);
    assert_eq!(turns[0].document.kind, DocumentKind::Conversation);
}

#[tokio::test]
async fn test_query_tolerates_fts_syntax_in_user_text() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    store
        .upsert(&WebDocument::web_context(
            "c++ templates",
            "https://cpp.example/",
            "Templates in C++ are resolved at compile time.",
            Utc::now(),
        ))
        .await
        .unwrap();

    let found = store
        .query("\"c++\" AND (templates* OR NEAR", DocumentKind::WebContext, 5)
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert!(store
        .query("*** ---", DocumentKind::WebContext, 5)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_recent_orders_newest_first() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    let t0 = Utc::now() - Duration::minutes(10);
    for (i, text) in ["first", "second", "third"].iter().enumerate() {
        store
            .upsert(&WebDocument::conversation(
                text,
                "ok",
                "general",
                t0 + Duration::minutes(i as i64),
            ))
            .await
            .unwrap();
    }

    let recent = store.recent(DocumentKind::Conversation, 2).await.unwrap();
    let users: Vec<&str> = recent.iter().map(|d| d.query.as_str()).collect();
    assert_eq!(users, vec!["third", "second"]);
    assert!(store
        .recent(DocumentKind::WebContext, 10)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_cache_validity_over_sqlite() {
    let tmp = TempDir::new().unwrap();
    let store: Arc<dyn DocumentStore> = Arc::new(open_store(&tmp).await);
    let cache = ResultCache::new(store);

    let fresh = Utc::now();
    let stale = fresh - Duration::hours(30);
    cache
        .store_at("rust async", "https://tokio.rs", "Tokio is an async runtime.", fresh)
        .await;
    cache
        .store_at("rust async", "https://old.example", "An outdated async article.", stale)
        .await;

    let hits = cache.lookup("rust async").await;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].url, "https://tokio.rs");
    assert_eq!(hits[0].fetched_at.timestamp_millis(), fresh.timestamp_millis());
}

#[tokio::test]
async fn test_documents_survive_reopen() {
    let tmp = TempDir::new().unwrap();
    {
        let store = open_store(&tmp).await;
        store
            .upsert(&WebDocument::web_context(
                "serde derive",
                "https://serde.rs/derive.html",
                "Serde derive macros generate Serialize and Deserialize impls.",
                Utc::now(),
            ))
            .await
            .unwrap();
        store.pool().close().await;
    }

    let reopened = open_store(&tmp).await;
    let found = reopened
        .query("serde", DocumentKind::WebContext, 5)
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].document.query, "serde derive");
}

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::Utc;
use tempfile::TempDir;

use webscout::config::load_config;
use webscout::sqlite_store::SqliteStore;
use webscout_core::models::WebDocument;
use webscout_core::store::DocumentStore;

fn scout_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("scout");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    // No API key is set for the LLM, so every LLM call takes its fallback
    // path without touching the network.
    let config_content = format!(
        r#"[db]
path = "{root}/data/scout.sqlite"

[llm]
api_key_env = "WEBSCOUT_CLI_TEST_UNSET_KEY"

[scrape]
domains_file = "{root}/data/hard_domains.json"
screenshot_dir = "{root}/data/screenshots"
image_dir = "{root}/data/images"

[server]
bind = "127.0.0.1:7399"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("scout.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_scout(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = scout_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("WEBSCOUT_CLI_TEST_UNSET_KEY")
        .env_remove("BRAVE_API_KEY")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run scout binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

/// Store one cache entry through the library so commands can find it.
fn seed_cache(config_path: &Path, query: &str, url: &str, content: &str) {
    let config = load_config(config_path).unwrap();
    let runtime = tokio::runtime::Runtime::new().unwrap();
    runtime.block_on(async {
        let store = SqliteStore::open(&config).await.unwrap();
        store
            .upsert(&WebDocument::web_context(query, url, content, Utc::now()))
            .await
            .unwrap();
        store.pool().close().await;
    });
}

#[test]
fn test_init_creates_database() {
    let (tmp, config) = setup_test_env();
    let (stdout, stderr, success) = run_scout(&config, &["init"]);
    assert!(success, "init failed: {}", stderr);
    assert!(stdout.contains("Database initialized successfully."));
    assert!(tmp.path().join("data/scout.sqlite").exists());
}

#[test]
fn test_init_reports_document_counts() {
    let (_tmp, config) = setup_test_env();
    let (stdout, _, success) = run_scout(&config, &["init"]);
    assert!(success);
    assert!(stdout.contains("Cached pages: 0  conversation turns: 0"));

    seed_cache(
        &config,
        "rust async",
        "https://tokio.rs",
        "Tokio is an asynchronous runtime for Rust.",
    );
    let (stdout, _, success) = run_scout(&config, &["init"]);
    assert!(success);
    assert!(stdout.contains("Cached pages: 1  conversation turns: 0"));
}

#[test]
fn test_init_is_idempotent() {
    let (_tmp, config) = setup_test_env();
    let (_, _, first) = run_scout(&config, &["init"]);
    let (_, stderr, second) = run_scout(&config, &["init"]);
    assert!(first);
    assert!(second, "second init failed: {}", stderr);
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_scout(&tmp.path().join("nope.toml"), &["init"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}

#[test]
fn test_invalid_config_fails() {
    let (tmp, _) = setup_test_env();
    let bad = tmp.path().join("config/bad.toml");
    fs::write(
        &bad,
        "[db]\npath = \"x.sqlite\"\n[search]\nbackends = [\"altavista\"]\n",
    )
    .unwrap();
    let (_, stderr, success) = run_scout(&bad, &["init"]);
    assert!(!success);
    assert!(stderr.contains("Unknown search backend"));
}

#[test]
fn test_domains_empty_then_listed() {
    let (tmp, config) = setup_test_env();
    let (stdout, _, success) = run_scout(&config, &["domains"]);
    assert!(success);
    assert!(stdout.contains("No hard-to-scrape domains recorded."));

    fs::create_dir_all(tmp.path().join("data")).unwrap();
    fs::write(
        tmp.path().join("data/hard_domains.json"),
        r#"["paywalled.example", "spa.example"]"#,
    )
    .unwrap();
    let (stdout, _, success) = run_scout(&config, &["domains"]);
    assert!(success);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines, vec!["paywalled.example", "spa.example"]);
}

#[test]
fn test_cache_command_lists_valid_entries() {
    let (_tmp, config) = setup_test_env();
    let (stdout, _, success) = run_scout(&config, &["cache", "rust async"]);
    assert!(success);
    assert!(stdout.contains("No valid cached entries."));

    seed_cache(
        &config,
        "rust async",
        "https://tokio.rs",
        "Tokio is an asynchronous runtime for Rust.",
    );
    let (stdout, _, success) = run_scout(&config, &["cache", "rust async"]);
    assert!(success);
    assert!(stdout.contains("https://tokio.rs"));
    assert!(stdout.contains("Tokio is an asynchronous runtime"));
}

#[test]
fn test_research_blank_query_fails() {
    let (_tmp, config) = setup_test_env();
    let (_, stderr, success) = run_scout(&config, &["research", "   "]);
    assert!(!success);
    assert!(stderr.contains("must not be empty"));
}

#[test]
fn test_research_served_from_cache_offline() {
    let (_tmp, config) = setup_test_env();
    seed_cache(
        &config,
        "rust async",
        "https://tokio.rs",
        "Tokio is an asynchronous runtime for Rust.",
    );

    let (stdout, stderr, success) = run_scout(&config, &["research", "rust async", "--json"]);
    assert!(success, "research failed: {}", stderr);
    let outcome: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(outcome["served_from_cache"], true);
    assert_eq!(outcome["decision"]["reason"], "served_from_cache");
    assert_eq!(outcome["context"]["sections"][0]["url"], "https://tokio.rs");
    assert_eq!(outcome["context"]["sections"][0]["source"], "cached");
}

#[test]
fn test_scrape_rejects_non_http_url() {
    let (_tmp, config) = setup_test_env();
    let (stdout, _, success) = run_scout(&config, &["scrape", "ftp://files.example/readme"]);
    assert!(success);
    assert!(stdout.contains("Could not scrape"));
}

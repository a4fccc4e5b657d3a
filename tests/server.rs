mod common;

use std::sync::Arc;

use serde_json::{json, Value};

use common::{raw, FakeBackend, FakeLlm, FakeRenderer, Harness};
use webscout::answer::Assistant;
use webscout::config::{AnswerConfig, AssistantConfig};
use webscout::pipeline::PipelineSettings;
use webscout::server::{router, AppState};

/// Serve the router over a fake-backed pipeline on an ephemeral port.
async fn spawn_server(h: &Harness) -> String {
    let pipeline = Arc::new(h.pipeline(PipelineSettings {
        max_variants: 1,
        ..Default::default()
    }));
    let assistant = Assistant::new(
        pipeline.clone(),
        h.llm.clone(),
        AssistantConfig::default(),
        AnswerConfig::default(),
    );
    let state = AppState {
        pipeline,
        assistant: Arc::new(assistant),
    };

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });
    format!("http://{}", addr)
}

fn harness() -> Harness {
    Harness::new(
        FakeLlm::new(|req| {
            if req.prompt.contains("browser automation") {
                Ok("NO".to_string())
            } else {
                Ok("Tokio schedules tasks cooperatively.".to_string())
            }
        }),
        vec![FakeBackend::new("primary").with(
            "tokio scheduler",
            vec![raw(
                "https://tokio.rs/blog/scheduler",
                &"The tokio scheduler uses work stealing across worker threads. ".repeat(10),
            )],
        )],
        FakeRenderer::new(),
    )
}

#[tokio::test]
async fn test_health() {
    let base = spawn_server(&harness()).await;
    let body: Value = reqwest::get(format!("{}/health", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_blank_query_returns_error_envelope() {
    let base = spawn_server(&harness()).await;
    let client = reqwest::Client::new();
    for path in ["research", "ask"] {
        let resp = client
            .post(format!("{}/{}", base, path))
            .json(&json!({ "query": "  " }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["error"]["code"], "bad_request");
        assert_eq!(body["error"]["message"], "query must not be empty");
    }
}

#[tokio::test]
async fn test_research_endpoint_returns_outcome() {
    let h = harness();
    let base = spawn_server(&h).await;
    let resp = reqwest::Client::new()
        .post(format!("{}/research", base))
        .json(&json!({ "query": "tokio scheduler" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["query"], "tokio scheduler");
    assert_eq!(body["total_hits"], 1);
    assert_eq!(body["decision"]["reason"], "llm_no");
    assert_eq!(
        body["context"]["sections"][0]["url"],
        "https://tokio.rs/blog/scheduler"
    );
    assert_eq!(h.backends[0].calls(), 1);
}

#[tokio::test]
async fn test_ask_endpoint_routes_trigger_to_research() {
    let base = spawn_server(&harness()).await;
    let resp = reqwest::Client::new()
        .post(format!("{}/ask", base))
        .json(&json!({ "query": "look up tokio scheduler" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["route"], "web_search");
    assert_eq!(body["answer"], "Tokio schedules tasks cooperatively.");
    assert_eq!(body["sources"], json!(["https://tokio.rs/blog/scheduler"]));
}

mod common;

use std::sync::{Arc, Mutex};

use common::{raw, FakeBackend, FakeLlm, FakeRenderer, Harness};
use webscout::answer::{Assistant, Route, EMPTY_QUERY_REPLY, NEEDS_WEB_SEARCH};
use webscout::config::{AnswerConfig, AssistantConfig};
use webscout::pipeline::PipelineSettings;
use webscout_core::completion::ChatMessage;
use webscout_core::models::DocumentKind;
use webscout_core::store::DocumentStore;

/// Replies by prompt shape: tie-break says NO, answers are canned, and
/// anything with a persona gets `direct`.
fn llm(direct: &'static str) -> Arc<FakeLlm> {
    FakeLlm::new(move |req| {
        if req.prompt.contains("browser automation") {
            Ok("NO".to_string())
        } else if req.prompt.starts_with("Using the web search results") {
            Ok("Ownership means each value has one owner.".to_string())
        } else {
            Ok(direct.to_string())
        }
    })
}

fn assistant(h: &Harness) -> Assistant {
    let pipeline = h.pipeline(PipelineSettings {
        max_variants: 1,
        ..Default::default()
    });
    Assistant::new(
        Arc::new(pipeline),
        h.llm.clone(),
        AssistantConfig::default(),
        AnswerConfig::default(),
    )
    .with_memory(h.store.clone())
}

fn long_snippet() -> String {
    "Rust ownership moves values and the borrow checker enforces it. ".repeat(10)
}

#[tokio::test]
async fn test_trigger_phrase_routes_to_research() {
    let h = Harness::new(
        llm("unused"),
        vec![FakeBackend::new("primary").with(
            "rust ownership",
            vec![raw("https://doc.rust-lang.org/book/ch04-01.html", &long_snippet())],
        )],
        FakeRenderer::new(),
    );

    let reply = assistant(&h)
        .respond("Please search for Rust ownership?")
        .await;

    assert_eq!(reply.route, Route::WebSearch);
    assert_eq!(reply.answer, "Ownership means each value has one owner.");
    assert_eq!(
        reply.sources,
        vec!["https://doc.rust-lang.org/book/ch04-01.html"]
    );
    assert_eq!(h.backends[0].calls(), 1);
}

#[tokio::test]
async fn test_trigger_without_query_fails_without_calls() {
    let h = Harness::new(llm("unused"), vec![FakeBackend::new("primary")], FakeRenderer::new());

    let reply = assistant(&h).respond("search please").await;

    assert_eq!(reply.route, Route::WebSearchFailed);
    assert_eq!(reply.answer, EMPTY_QUERY_REPLY);
    assert_eq!(h.llm.calls(), 0);
    assert_eq!(h.backends[0].calls(), 0);
}

#[tokio::test]
async fn test_model_can_ask_for_web_search() {
    let utterance = "How tall is the Eiffel tower today";
    let h = Harness::new(
        llm(NEEDS_WEB_SEARCH),
        vec![FakeBackend::new("primary").with(
            utterance,
            vec![raw("https://eiffel.example/facts", &long_snippet())],
        )],
        FakeRenderer::new(),
    );

    let reply = assistant(&h).respond(utterance).await;

    assert_eq!(reply.route, Route::WebSearch);
    assert_eq!(reply.sources, vec!["https://eiffel.example/facts"]);
    assert_eq!(h.backends[0].calls(), 1);
}

#[tokio::test]
async fn test_general_reply_and_history_replay() {
    let seen: Arc<Mutex<Vec<Vec<ChatMessage>>>> = Arc::new(Mutex::new(Vec::new()));
    let recorder = seen.clone();
    let fake = FakeLlm::new(move |req| {
        recorder.lock().unwrap().push(req.history.clone());
        Ok(format!("reply to {}", req.prompt))
    });
    let h = Harness::new(fake, vec![FakeBackend::new("primary")], FakeRenderer::new());
    let assistant = assistant(&h);

    let first = assistant.respond("hello there").await;
    assert_eq!(first.route, Route::General);
    assert_eq!(first.answer, "reply to hello there");

    assistant.respond("how are you").await;

    let histories = seen.lock().unwrap().clone();
    assert_eq!(histories.len(), 2);
    assert!(histories[0].is_empty());
    assert_eq!(
        histories[1],
        vec![
            ChatMessage::user("hello there"),
            ChatMessage::assistant("reply to hello there"),
        ]
    );

    let turns = h
        .store
        .recent(DocumentKind::Conversation, 10)
        .await
        .unwrap();
    assert_eq!(turns.len(), 2);
    assert_eq!(h.backends[0].calls(), 0);
}

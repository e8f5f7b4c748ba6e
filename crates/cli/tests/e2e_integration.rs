//! End-to-end integration tests for the memloop agent runtime.
//!
//! These tests wire the real stores, tools, assembler and loop together the
//! way `memloop chat` does, with a scripted model in place of the API.

use std::sync::Arc;

use memloop_agent::testing::{
    SequentialMockProvider, make_text_response, make_tool_call, make_tool_call_response,
};
use memloop_agent::{
    AgentLoop, AgentStreamEvent, AssemblerConfig, CancellationToken, ContextAssembler,
    ExchangeSummary, LoopConfig, MEMORY_HEADER, Terminal,
};
use memloop_config::AppConfig;
use memloop_core::conversation::{ConversationStore, TurnContent, TurnRole, UserId};
use memloop_core::memory::MemoryStore;
use memloop_core::message::Role;
use memloop_core::provider::Provider;
use memloop_memory::{MemoryRetriever, SqliteStore};
use memloop_tools::{MemoryTools, default_registry};

// ── Harness ──────────────────────────────────────────────────────────────

fn user(name: &str) -> UserId {
    UserId::new(name).unwrap()
}

fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.agent.system_prompt = "You are a helpful assistant with memory.".into();
    config.agent.max_iterations = 5;
    config
}

fn build_agent(store: Arc<SqliteStore>, provider: Arc<dyn Provider>, config: &AppConfig) -> AgentLoop {
    let retriever = MemoryRetriever::new(store.clone(), config.memory.lookback);
    let tools = default_registry(Some(MemoryTools {
        store: store.clone(),
        retriever: retriever.clone(),
    }))
    .unwrap();
    let assembler = ContextAssembler::new(store.clone(), retriever, AssemblerConfig::from_config(config));
    let agent = AgentLoop::new(
        provider,
        Arc::new(tools),
        store.clone(),
        Arc::new(assembler),
        LoopConfig::from_config(config),
    );
    if config.memory.auto_save {
        agent.with_auto_save(store, Arc::new(ExchangeSummary))
    } else {
        agent
    }
}

async fn in_memory_store() -> Arc<SqliteStore> {
    Arc::new(SqliteStore::in_memory().await.unwrap())
}

// ── Tool calling ─────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_weather_tool_round_trip() {
    let store = in_memory_store().await;
    let provider = Arc::new(SequentialMockProvider::tool_then_answer(
        vec![make_tool_call("get_weather", serde_json::json!({"city": "Madrid"}))],
        "Let me check.",
        "It's mild in Madrid today.",
    ));
    let agent = build_agent(store.clone(), provider.clone(), &test_config());

    let outcome = agent
        .run(&user("alice"), None, "What's the weather in Madrid?", &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome.text(), "It's mild in Madrid today.");

    let turns = store.turns(&user("alice"), &outcome.conversation_id).await.unwrap();
    let roles: Vec<TurnRole> = turns.iter().map(|t| t.role()).collect();
    assert_eq!(roles, vec![TurnRole::User, TurnRole::Tool, TurnRole::Assistant]);

    let TurnContent::Tool { call, result } = &turns[1].content else {
        panic!("expected a tool turn");
    };
    assert_eq!(call.arguments["city"], "Madrid");
    assert!(result.success);
    let report: serde_json::Value = serde_json::from_str(&result.output).unwrap();
    assert_eq!(report["city"], "Madrid");

    // All five built-in tools are offered to the model
    assert_eq!(provider.requests()[0].tools.len(), 5);
}

#[tokio::test]
async fn e2e_tool_failure_is_recoverable() {
    let store = in_memory_store().await;
    let provider = Arc::new(SequentialMockProvider::new(vec![
        make_tool_call_response(
            vec![make_tool_call("calculator", serde_json::json!({"expression": "1 / 0"}))],
            "",
        ),
        make_text_response("Division by zero is undefined."),
    ]));
    let agent = build_agent(store.clone(), provider.clone(), &test_config());

    let outcome = agent
        .run(&user("alice"), None, "What is 1 divided by 0?", &CancellationToken::new())
        .await
        .unwrap();
    assert!(matches!(outcome.terminal, Terminal::Done { .. }));

    let observation = provider.requests()[1].messages.last().cloned().unwrap();
    assert_eq!(observation.role, Role::Tool);
    assert!(observation.is_error);
    assert_eq!(observation.content, "Error: Division by zero");
}

// ── Memory across conversations ──────────────────────────────────────────

#[tokio::test]
async fn e2e_remembered_fact_reaches_a_new_conversation() {
    let store = in_memory_store().await;
    let provider = Arc::new(SequentialMockProvider::new(vec![
        // Conversation 1: the model decides to remember
        make_tool_call_response(
            vec![make_tool_call("remember", serde_json::json!({"text": "Lives in Madrid"}))],
            "",
        ),
        make_text_response("Noted, you live in Madrid."),
        // Conversation 2
        make_text_response("You live in Madrid."),
    ]));
    let agent = build_agent(store.clone(), provider.clone(), &test_config());
    let cancel = CancellationToken::new();

    let first = agent.run(&user("alice"), None, "I live in Madrid", &cancel).await.unwrap();
    let second = agent.run(&user("alice"), None, "Which city do I live in?", &cancel).await.unwrap();
    assert_ne!(first.conversation_id, second.conversation_id);

    let snippets = store.recent(&user("alice"), 10).await.unwrap();
    assert_eq!(snippets.len(), 1);
    assert_eq!(snippets[0].source_conversation_id.as_ref(), Some(&first.conversation_id));

    // The new conversation starts with system prompt, memory block, question
    let request = &provider.requests()[2];
    assert_eq!(request.messages.len(), 3);
    assert_eq!(request.messages[1].role, Role::System);
    assert!(request.messages[1].content.starts_with(MEMORY_HEADER));
    assert!(request.messages[1].content.contains("1. Lives in Madrid"));
    assert_eq!(request.messages[2].content, "Which city do I live in?");
}

#[tokio::test]
async fn e2e_memory_is_isolated_per_user() {
    let store = in_memory_store().await;
    store
        .append(memloop_core::NewSnippet::new(user("alice"), "Allergic to peanuts"))
        .await
        .unwrap();

    let provider = Arc::new(SequentialMockProvider::tool_then_answer(
        vec![make_tool_call("memory_search", serde_json::json!({"query": "peanuts allergy"}))],
        "",
        "I don't know of any allergies.",
    ));
    let agent = build_agent(store.clone(), provider.clone(), &test_config());

    agent
        .run(&user("bob"), None, "Do I have a peanuts allergy?", &CancellationToken::new())
        .await
        .unwrap();

    let requests = provider.requests();
    for request in &requests {
        assert!(request.messages.iter().all(|m| !m.content.starts_with(MEMORY_HEADER)));
    }
    let observation = requests[1].messages.last().unwrap();
    assert_eq!(observation.content, "No memories found for 'peanuts allergy'.");
}

#[tokio::test]
async fn e2e_auto_save_feeds_later_conversations() {
    let store = in_memory_store().await;
    let mut config = test_config();
    config.memory.auto_save = true;
    let provider = Arc::new(SequentialMockProvider::new(vec![
        make_text_response("Rust's borrow checker enforces aliasing rules at compile time."),
        make_text_response("We talked about the borrow checker."),
    ]));
    let agent = build_agent(store.clone(), provider.clone(), &config);
    let cancel = CancellationToken::new();

    agent
        .run(&user("alice"), None, "Explain the Rust borrow checker", &cancel)
        .await
        .unwrap();
    assert_eq!(store.count(&user("alice")).await.unwrap(), 1);

    agent
        .run(&user("alice"), None, "What did we discuss about the borrow checker?", &cancel)
        .await
        .unwrap();
    let memory = &provider.requests()[1].messages[1];
    assert!(memory.content.starts_with(MEMORY_HEADER));
    assert!(memory.content.contains("User asked: Explain the Rust borrow checker"));
}

// ── Persistence ──────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_history_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("memloop.sqlite");
    let cancel = CancellationToken::new();

    let conversation = {
        let store = Arc::new(SqliteStore::open(&path).await.unwrap());
        let provider = Arc::new(SequentialMockProvider::single_text("Nice to meet you, Ana."));
        let agent = build_agent(store, provider, &test_config());
        agent
            .run(&user("alice"), None, "My name is Ana", &cancel)
            .await
            .unwrap()
            .conversation_id
    };

    let store = Arc::new(SqliteStore::open(&path).await.unwrap());
    let listed = store.list_conversations(&user("alice")).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, conversation);

    let provider = Arc::new(SequentialMockProvider::single_text("Your name is Ana."));
    let agent = build_agent(store.clone(), provider.clone(), &test_config());
    agent
        .run(&user("alice"), Some(conversation.clone()), "What's my name?", &cancel)
        .await
        .unwrap();

    let contents: Vec<String> = provider.requests()[0]
        .messages
        .iter()
        .map(|m| m.content.clone())
        .collect();
    assert_eq!(
        contents,
        vec![
            "You are a helpful assistant with memory.",
            "My name is Ana",
            "Nice to meet you, Ana.",
            "What's my name?",
        ]
    );
    let sequences: Vec<u64> = store
        .turns(&user("alice"), &conversation)
        .await
        .unwrap()
        .iter()
        .map(|t| t.sequence)
        .collect();
    assert_eq!(sequences, vec![1, 2, 3, 4]);
}

// ── Streaming ────────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_streaming_over_blocking_provider() {
    let store = in_memory_store().await;
    let provider = Arc::new(SequentialMockProvider::tool_then_answer(
        vec![make_tool_call("calculator", serde_json::json!({"operation": "multiply", "a": 150, "b": 23}))],
        "",
        "150 × 23 = 3450",
    ));
    let agent = build_agent(store.clone(), provider, &test_config());

    let mut rx = agent.run_stream(user("alice"), None, "What is 150 times 23?".into(), CancellationToken::new());
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }

    let types: Vec<&str> = events.iter().map(|e| e.event_type()).collect();
    assert_eq!(types, vec!["tool_call", "tool_result", "chunk", "done"]);
    assert!(matches!(
        &events[1],
        AgentStreamEvent::ToolResult { output, success: true, .. } if output == "3450"
    ));
    match events.last().unwrap() {
        AgentStreamEvent::Done { answer, iterations, tool_calls_made, .. } => {
            assert_eq!(answer, "150 × 23 = 3450");
            assert_eq!(*iterations, 2);
            assert_eq!(*tool_calls_made, 1);
        }
        other => panic!("expected done, got {other:?}"),
    }
}

// ── Configuration ────────────────────────────────────────────────────────

#[test]
fn e2e_default_config_wires_the_loop() {
    let toml = AppConfig::default_toml();
    let config: AppConfig = toml::from_str(&toml).unwrap();
    config.validate().unwrap();

    let loop_config = LoopConfig::from_config(&config);
    assert_eq!(loop_config.max_iterations, config.agent.max_iterations);
    let assembler = AssemblerConfig::from_config(&config);
    assert_eq!(assembler.budget, config.context.budget);
    assert_eq!(assembler.memory_budget, config.memory.budget_chars);
}

//! End-to-end runs against a scripted provider.

use dexter_core::agent::{Agent, AgentConfig, AgentEvent, RunStatus};
use dexter_core::api::{Decision, ScriptedProvider};
use dexter_core::context::{ContextConfig, EVICTED_PREFIX};
use dexter_core::error::{ProviderError, ToolError};
use dexter_core::history::{ChatHistory, InMemoryChatHistory, LongTermChatHistory};
use dexter_core::tools::{FnTool, RequestCache, ToolContext, ToolRegistry};
use dexter_core::{MessageRole, TokenUsage, ToolCall, ToolDef};
use futures::StreamExt;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

fn call(id: &str, name: &str, args: &str) -> Decision {
    Decision::tool_calls(vec![ToolCall::function(id, name, args)])
}

fn kinds(events: &[AgentEvent]) -> Vec<&'static str> {
    events.iter().map(AgentEvent::kind).collect()
}

fn price_tool() -> FnTool {
    FnTool::new(
        ToolDef::new(
            "get_prices",
            "Latest price for a ticker.",
            json!({"type": "object", "properties": {"ticker": {"type": "string"}}}),
        ),
        |args: Value, ctx: ToolContext| async move {
            let ticker = args["ticker"].as_str().unwrap_or("?").to_string();
            ctx.emit_progress(format!("Fetching {ticker}"));
            ctx.emit_progress("Parsing response");
            Ok(format!("{ticker}: 187.25"))
        },
    )
}

fn agent_with(provider: Arc<ScriptedProvider>, tools: ToolRegistry, config: AgentConfig) -> Agent {
    Agent::new(provider, Arc::new(tools), config)
}

#[tokio::test]
async fn tool_call_then_answer() {
    let provider = Arc::new(
        ScriptedProvider::new()
            .then(call("c1", "get_prices", r#"{"ticker":"AAPL"}"#).with_usage(TokenUsage::new(50, 10)))
            .then(Decision::answer("AAPL is at 187.25.").with_usage(TokenUsage::new(80, 20))),
    );
    let agent = agent_with(provider.clone(), ToolRegistry::new().with(price_tool()), AgentConfig::default());

    let summary = agent.run_to_completion("What is AAPL at?", None).await.unwrap();

    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(
        kinds(&summary.events),
        vec![
            "thinking",
            "tool_start",
            "tool_progress",
            "tool_progress",
            "tool_end",
            "thinking",
            "answer_start",
            "done",
        ]
    );
    assert_eq!(
        summary.events[1],
        AgentEvent::ToolStart {
            tool: "get_prices".into(),
            args: json!({"ticker": "AAPL"}),
        }
    );
    assert_eq!(
        summary.events[2],
        AgentEvent::ToolProgress {
            tool: "get_prices".into(),
            message: "Fetching AAPL".into(),
        }
    );
    match summary.events.last() {
        Some(AgentEvent::Done {
            answer, token_usage, ..
        }) => {
            assert_eq!(answer, "AAPL is at 187.25.");
            assert_eq!(*token_usage, TokenUsage::new(130, 30));
        }
        other => panic!("expected done, got {other:?}"),
    }

    // The second decision saw the call and its result.
    let second = &provider.requests()[1];
    let tool_reply = second
        .messages
        .iter()
        .find(|m| m.role == MessageRole::Tool)
        .expect("tool result message");
    assert_eq!(tool_reply.text(), "AAPL: 187.25");
    assert_eq!(tool_reply.tool_call_id.as_deref(), Some("c1"));
}

#[tokio::test]
async fn tool_limit_forces_an_answer_without_tools() {
    let provider = Arc::new(
        ScriptedProvider::new()
            .then(call("c1", "get_prices", r#"{"ticker":"A"}"#))
            .then(Decision::tool_calls(vec![
                ToolCall::function("c2", "get_prices", r#"{"ticker":"B"}"#),
                ToolCall::function("c3", "get_prices", r#"{"ticker":"C"}"#),
            ]))
            .then(Decision::answer("Enough data.")),
    );
    let agent = agent_with(
        provider.clone(),
        ToolRegistry::new().with(price_tool()),
        AgentConfig::default().with_max_tool_calls(2),
    );

    let summary = agent.run_to_completion("compare", None).await.unwrap();
    let events: Vec<&str> = kinds(&summary.events)
        .into_iter()
        .filter(|k| *k != "tool_progress")
        .collect();

    assert_eq!(
        events,
        vec![
            "thinking",
            "tool_start",
            "tool_end",
            "thinking",
            "tool_start",
            "tool_end",
            "tool_limit",
            "thinking",
            "answer_start",
            "done",
        ]
    );
    assert!(summary.events.contains(&AgentEvent::ToolLimit { limit: 2 }));
    assert_eq!(summary.answer.as_deref(), Some("Enough data."));

    let requests = provider.requests();
    assert_eq!(requests.len(), 3);
    assert_eq!(requests[0].tools, vec!["get_prices"]);
    assert!(requests[2].tools.is_empty(), "forced answer must not offer tools");
}

#[tokio::test]
async fn unknown_tool_is_a_tool_error_and_the_run_continues() {
    let provider = Arc::new(
        ScriptedProvider::new()
            .then(call("c1", "get_weather", "{}"))
            .then(Decision::answer("No weather tool.")),
    );
    let agent = agent_with(provider.clone(), ToolRegistry::new().with(price_tool()), AgentConfig::default());

    let summary = agent.run_to_completion("weather?", None).await.unwrap();

    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(
        summary.events[2],
        AgentEvent::ToolError {
            tool: "get_weather".into(),
            error: "unknown tool 'get_weather'".into(),
        }
    );
    let second = &provider.requests()[1];
    assert!(
        second
            .messages
            .iter()
            .any(|m| m.text() == "Error: unknown tool 'get_weather'")
    );
}

#[tokio::test]
async fn executor_failure_is_reported_to_the_model() {
    let failing = FnTool::new(
        ToolDef::new("get_filings", "SEC filings.", json!({"type": "object"})),
        |_: Value, _: ToolContext| async { Err(ToolError::execution("SEC API returned 503")) },
    );
    let provider = Arc::new(
        ScriptedProvider::new()
            .then(call("c1", "get_filings", "{}"))
            .then(Decision::answer("Filings unavailable.")),
    );
    let agent = agent_with(provider, ToolRegistry::new().with(failing), AgentConfig::default());

    let summary = agent.run_to_completion("filings", None).await.unwrap();
    assert_eq!(
        summary.events[2],
        AgentEvent::ToolError {
            tool: "get_filings".into(),
            error: "SEC API returned 503".into(),
        }
    );
    assert_eq!(summary.status, RunStatus::Completed);
}

#[tokio::test]
async fn eviction_emits_context_cleared_before_thinking() {
    let big = FnTool::new(
        ToolDef::new("big_result", "Returns a lot of text.", json!({"type": "object"})),
        |_: Value, _: ToolContext| async { Ok("x".repeat(600)) },
    );
    let provider = Arc::new(
        ScriptedProvider::new()
            .then(call("c1", "big_result", "{}"))
            .then(call("c2", "big_result", "{}"))
            .then(call("c3", "big_result", "{}"))
            .then(Decision::answer("done")),
    );
    let context = ContextConfig::default()
        .with_chars_per_token(1.0)
        .with_context_threshold(1_000)
        .with_token_budget(100_000)
        .with_keep_tool_uses(1);
    let agent = agent_with(
        provider.clone(),
        ToolRegistry::new().with(big),
        AgentConfig::default()
            .with_system_prompt("sys")
            .with_context(context),
    );

    let summary = agent.run_to_completion("analyze", None).await.unwrap();

    assert_eq!(
        kinds(&summary.events),
        vec![
            "thinking",
            "tool_start",
            "tool_end",
            "thinking",
            "tool_start",
            "tool_end",
            "context_cleared",
            "thinking",
            "tool_start",
            "tool_end",
            "context_cleared",
            "thinking",
            "answer_start",
            "done",
        ]
    );
    for (i, event) in summary.events.iter().enumerate() {
        if let AgentEvent::ContextCleared { evicted_count } = event {
            assert_eq!(*evicted_count, 1);
            assert_eq!(summary.events[i + 1], AgentEvent::Thinking);
        }
    }

    // The last decision kept only the most recent tool use, plus a notice.
    let last = provider.requests().pop().unwrap();
    let call_ids: Vec<&str> = last
        .messages
        .iter()
        .filter_map(|m| m.tool_call_id.as_deref())
        .collect();
    assert_eq!(call_ids, vec!["c3"]);
    assert!(last.messages.iter().any(|m| m.role == MessageRole::System
        && m.text().starts_with(EVICTED_PREFIX)));
    assert!(last.messages.iter().any(|m| m.text() == "analyze"));
}

#[tokio::test]
async fn cacheable_tool_runs_once_for_equivalent_arguments() {
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = runs.clone();
    let tool = FnTool::new(
        ToolDef::new("get_prices", "Prices.", json!({"type": "object"})),
        move |args: Value, _: ToolContext| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(format!("{}: 42", args["ticker"].as_str().unwrap_or("?")))
            }
        },
    )
    .cacheable(true);
    let cache = Arc::new(RequestCache::in_memory());
    let provider = Arc::new(
        ScriptedProvider::new()
            .then(call("c1", "get_prices", r#"{"ticker":"AAPL","period":"1d"}"#))
            .then(call("c2", "get_prices", r#"{"period":"1d","ticker":"AAPL"}"#))
            .then(Decision::answer("42")),
    );
    let agent = agent_with(
        provider,
        ToolRegistry::new().with_cache(cache.clone()).with(tool),
        AgentConfig::default(),
    );

    let summary = agent.run_to_completion("price", None).await.unwrap();

    let results: Vec<&str> = summary
        .events
        .iter()
        .filter_map(|e| match e {
            AgentEvent::ToolEnd { result, .. } => Some(result.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(results, vec!["AAPL: 42", "AAPL: 42"]);
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(cache.hits(), 1);
}

#[tokio::test]
async fn provider_error_ends_with_error_event() {
    let history = Arc::new(InMemoryChatHistory::new());
    let provider = Arc::new(ScriptedProvider::new().then_fail(ProviderError::Http {
        status: 401,
        body: "bad key".into(),
    }));
    let agent = agent_with(provider, ToolRegistry::new(), AgentConfig::default());

    let summary = agent
        .run_to_completion("hello", Some(history.clone()))
        .await
        .unwrap();

    assert_eq!(summary.status, RunStatus::Failed);
    assert_eq!(kinds(&summary.events), vec!["thinking", "error"]);
    assert_eq!(
        summary.events[1],
        AgentEvent::Error {
            message: "provider HTTP 401: bad key".into()
        }
    );
    // No answer was produced, so the entry is closed with an empty one.
    assert_eq!(history.message_strings(), vec!["hello"]);
    assert_eq!(history.last_answer().as_deref(), Some(""));
}

#[tokio::test]
async fn cancellation_ends_without_terminal_event() {
    let slow = FnTool::new(
        ToolDef::new("slow_search", "Takes a while.", json!({"type": "object"})),
        |_: Value, ctx: ToolContext| async move {
            ctx.cancellation_token().cancelled().await;
            Err(ToolError::Cancelled)
        },
    );
    let history = Arc::new(InMemoryChatHistory::new());
    let provider = Arc::new(
        ScriptedProvider::new()
            .then(call("c1", "slow_search", "{}"))
            .then(Decision::answer("never")),
    );
    let agent = agent_with(provider.clone(), ToolRegistry::new().with(slow), AgentConfig::default());

    let mut events = agent.run("search", Some(history.clone())).unwrap();
    let mut seen = Vec::new();
    while let Some(event) = events.next().await {
        let started = matches!(event, AgentEvent::ToolStart { .. });
        seen.push(event);
        if started {
            events.cancel();
        }
    }

    assert_eq!(kinds(&seen), vec!["thinking", "tool_start"]);
    assert!(seen.iter().all(|e| !e.is_terminal()));
    assert_eq!(events.status(), RunStatus::Interrupted);
    assert_eq!(provider.requests().len(), 1);
    assert_eq!(history.last_answer().as_deref(), Some(""));
}

#[tokio::test]
async fn deadline_interrupts_a_stuck_provider() {
    let provider = Arc::new(
        ScriptedProvider::new()
            .with_delay(Duration::from_secs(30))
            .then(Decision::answer("too late")),
    );
    let agent = agent_with(
        provider,
        ToolRegistry::new(),
        AgentConfig::default().with_run_timeout(Duration::from_millis(50)),
    );

    let summary = tokio::time::timeout(Duration::from_secs(5), agent.run_to_completion("hi", None))
        .await
        .expect("deadline should stop the run")
        .unwrap();

    assert_eq!(summary.status, RunStatus::Interrupted);
    assert_eq!(kinds(&summary.events), vec!["thinking"]);
}

#[tokio::test]
async fn slow_consumer_holds_the_run_back() {
    let provider = Arc::new(
        ScriptedProvider::new()
            .then(call("c1", "get_prices", r#"{"ticker":"AAPL"}"#))
            .then(Decision::answer("ok")),
    );
    let agent = agent_with(provider.clone(), ToolRegistry::new().with(price_tool()), AgentConfig::default());

    let mut events = agent.run("price", None).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    // `thinking` fills the one-slot buffer; the run is parked on `tool_start`.
    assert_eq!(provider.requests().len(), 1);
    assert_eq!(events.status(), RunStatus::Running);

    let mut count = 0;
    while events.next().await.is_some() {
        count += 1;
    }
    assert_eq!(count, 8);
    assert_eq!(events.status(), RunStatus::Completed);
}

#[tokio::test]
async fn prior_turns_are_replayed_from_history() {
    let history: Arc<dyn ChatHistory> = Arc::new(InMemoryChatHistory::new());
    let provider = Arc::new(
        ScriptedProvider::new()
            .then(Decision::answer("Revenue was $35B."))
            .then(Decision::answer("Up 94% year over year.")),
    );
    let agent = agent_with(provider.clone(), ToolRegistry::new(), AgentConfig::default());

    agent
        .run_to_completion("NVDA revenue?", Some(history.clone()))
        .await
        .unwrap();
    agent
        .run_to_completion("And growth?", Some(history.clone()))
        .await
        .unwrap();

    let second = &provider.requests()[1];
    let texts: Vec<&str> = second.messages.iter().skip(1).map(|m| m.text()).collect();
    assert_eq!(
        texts,
        vec!["NVDA revenue?", "Revenue was $35B.", "And growth?"]
    );
    assert_eq!(history.message_strings(), vec!["And growth?", "NVDA revenue?"]);
}

#[tokio::test]
async fn long_term_history_records_the_turn() {
    let dir = tempfile::tempdir().unwrap();
    let history = Arc::new(LongTermChatHistory::new(dir.path()));
    let provider = Arc::new(ScriptedProvider::new().then(Decision::answer("42")));
    let agent = agent_with(provider, ToolRegistry::new(), AgentConfig::default());

    let summary = agent
        .run_to_completion("meaning of life?", Some(history.clone()))
        .await
        .unwrap();
    assert_eq!(summary.status, RunStatus::Completed);

    let reopened = LongTermChatHistory::new(dir.path());
    reopened.load().unwrap();
    let entries = reopened.messages();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].user_message, "meaning of life?");
    assert_eq!(entries[0].agent_response.as_deref(), Some("42"));
}

#[tokio::test]
async fn failed_run_closes_its_long_term_entry() {
    let dir = tempfile::tempdir().unwrap();
    let history = Arc::new(LongTermChatHistory::new(dir.path()));
    let provider = Arc::new(ScriptedProvider::new().then_fail(ProviderError::Api("down".into())));
    let agent = agent_with(provider, ToolRegistry::new(), AgentConfig::default());

    let summary = agent
        .run_to_completion("AAPL outlook?", Some(history.clone()))
        .await
        .unwrap();
    assert_eq!(summary.status, RunStatus::Failed);

    let reopened = LongTermChatHistory::new(dir.path());
    reopened.load().unwrap();
    let entries = reopened.messages();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].user_message, "AAPL outlook?");
    assert_eq!(entries[0].agent_response.as_deref(), Some(""));
}

#[tokio::test]
async fn cancelled_run_closes_its_long_term_entry() {
    let dir = tempfile::tempdir().unwrap();
    let history = Arc::new(LongTermChatHistory::new(dir.path()));
    let provider = Arc::new(
        ScriptedProvider::new()
            .with_delay(Duration::from_secs(30))
            .then(Decision::answer("too late")),
    );
    let agent = agent_with(provider, ToolRegistry::new(), AgentConfig::default());

    let mut events = agent.run("MSFT margins?", Some(history.clone())).unwrap();
    assert_eq!(events.next().await.map(|e| e.kind()), Some("thinking"));
    events.cancel();
    assert_eq!(events.next().await, None);
    assert_eq!(events.status(), RunStatus::Interrupted);

    let reopened = LongTermChatHistory::new(dir.path());
    reopened.load().unwrap();
    let entries = reopened.messages();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].agent_response.as_deref(), Some(""));
}

#[tokio::test]
async fn answer_is_kept_when_cancelled_at_answer_start() {
    let history = Arc::new(InMemoryChatHistory::new());
    let provider = Arc::new(ScriptedProvider::new().then(Decision::answer("EPS was $1.52.")));
    let agent = agent_with(provider, ToolRegistry::new(), AgentConfig::default());

    let mut events = agent.run("AAPL EPS?", Some(history.clone())).unwrap();
    while let Some(event) = events.next().await {
        if matches!(event, AgentEvent::AnswerStart) {
            events.cancel();
        }
    }

    assert!(events.status().is_finished());
    assert_eq!(history.last_answer().as_deref(), Some("EPS was $1.52."));
}

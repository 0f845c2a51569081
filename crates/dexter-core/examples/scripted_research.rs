//! Offline research run: typed tools, the request cache, and the event stream.
//!
//! Demonstrates:
//! - Typed argument structs with `Deserialize` + `JsonSchema`
//! - Progress reporting from inside a tool
//! - Serving a repeated call from the `RequestCache`
//! - Consuming `AgentEvent`s as a stream
//!
//! A `ScriptedProvider` stands in for the model, so no API key is needed.
//!
//! # Usage
//!
//! ```bash
//! RUST_LOG=debug cargo run --example scripted_research
//! ```

use dexter_core::prelude::*;
use futures::StreamExt;
use schemars::JsonSchema;
use serde::Deserialize;
use std::sync::Arc;

/// Arguments for the `get_price_snapshot` tool.
#[derive(Deserialize, JsonSchema)]
struct SnapshotArgs {
    /// Stock ticker, e.g. "NVDA".
    ticker: String,
}

fn price_snapshot_tool() -> FnTool {
    let def = ToolDef::new(
        "get_price_snapshot",
        "Latest price and daily change for a ticker.",
        json_schema_for::<SnapshotArgs>(),
    );

    FnTool::new(def, |args: SnapshotArgs, ctx: ToolContext| async move {
        ctx.emit_progress(format!("Fetching snapshot for {}", args.ticker));
        // A real tool would call a market data API here.
        Ok(format!("{}: 181.20 (+2.4%)", args.ticker))
    })
    .cacheable(true)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let args = r#"{"ticker":"NVDA"}"#;
    let provider = ScriptedProvider::new()
        .then(Decision::tool_calls(vec![ToolCall::function("c1", "get_price_snapshot", args)]))
        .then(Decision::tool_calls(vec![ToolCall::function("c2", "get_price_snapshot", args)]))
        .then(Decision::answer("NVDA trades at 181.20, up 2.4% on the day.").with_usage(TokenUsage::new(420, 18)));

    let cache = Arc::new(RequestCache::in_memory());
    let tools = ToolRegistry::new()
        .with_cache(cache.clone())
        .with(price_snapshot_tool());

    let agent = Agent::new(Arc::new(provider), Arc::new(tools), AgentConfig::default());
    let history: Arc<dyn ChatHistory> = Arc::new(InMemoryChatHistory::new());

    let mut events = agent.run("How is NVDA doing today?", Some(history.clone()))?;
    while let Some(event) = events.next().await {
        println!("{}", serde_json::to_string(&event)?);
    }

    println!("status: {:?}", events.status());
    println!("cache: {} hit(s), {} miss(es)", cache.hits(), cache.misses());
    println!("history: {:?}", history.recent_turns(5));
    Ok(())
}

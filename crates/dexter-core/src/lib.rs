//! Agent execution engine for LLM-powered research agents.
//!
//! `dexter-core` drives a multi-turn loop between an LLM decision step and a
//! registry of callable tools. A single call to
//! [`Agent::run()`](agent::orchestrator::Agent::run) starts a run and returns an
//! [`EventStream`](agent::stream::EventStream) of ordered
//! [`AgentEvent`](agent::events::AgentEvent) values: thinking, tool calls and
//! their progress, context eviction notices, and exactly one terminal `done`
//! or `error` (or nothing at all when the run was cancelled).
//!
//! # Getting started
//!
//! ```ignore
//! use dexter_core::prelude::*;
//! use futures::StreamExt;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let provider = Arc::new(OpenRouterClient::new(std::env::var("OPENROUTER_KEY")?)?);
//!
//!     let tools = ToolRegistry::new()
//!         .with_cache(Arc::new(RequestCache::in_memory()))
//!         .with(my_price_tool());
//!
//!     let agent = Agent::new(provider, Arc::new(tools), AgentConfig::default());
//!     let history: Arc<dyn ChatHistory> = Arc::new(InMemoryChatHistory::new());
//!
//!     let mut events = agent.run("What is AAPL's P/E ratio?", Some(history))?;
//!     while let Some(event) = events.next().await {
//!         println!("{}", serde_json::to_string(&event)?);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Where to find things
//!
//! - **Run the loop:** [`Agent`](agent::orchestrator::Agent) and
//!   [`AgentConfig`](agent::config::AgentConfig). Cancellation and the run
//!   deadline live on the [`EventStream`](agent::stream::EventStream).
//!
//! - **Define tools:** the [`Tool`](tools::core::Tool) trait,
//!   [`FnTool`](tools::core::FnTool) for closures, and
//!   [`ToolRegistry`](tools::core::ToolRegistry) for dispatch. Tools receive a
//!   [`ToolContext`](tools::progress::ToolContext) carrying the cancellation
//!   token and a progress callback.
//!
//! - **Avoid repeated work:** [`RequestCache`](tools::cache::RequestCache) is a
//!   content-addressed cache keyed by [`build_cache_key`](tools::cache::build_cache_key).
//!
//! - **Stay inside the context window:** [`ContextManager`](context::ContextManager)
//!   evicts the oldest tool uses from the [`Scratchpad`](context::Scratchpad)
//!   once the estimated cost crosses [`CONTEXT_THRESHOLD`](context::CONTEXT_THRESHOLD).
//!
//! - **Remember conversations:** [`InMemoryChatHistory`](history::InMemoryChatHistory)
//!   for a session, [`LongTermChatHistory`](history::LongTermChatHistory) for a
//!   JSON file that survives restarts.
//!
//! - **Talk to a model:** implement [`LlmProvider`](api::provider::LlmProvider),
//!   or use [`OpenRouterClient`](api::openrouter::OpenRouterClient).
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`agent`] | Orchestrator loop, configuration, events, event stream, system prompt |
//! | [`tools`] | [`Tool`](tools::core::Tool) trait, registry/dispatcher, progress channel, request cache |
//! | [`context`] | Token estimation, scratchpad, tool-use eviction |
//! | [`history`] | In-memory and long-term chat history stores |
//! | [`api`] | LLM provider boundary, OpenRouter client, retry with backoff |
//! | [`error`] | Error types for every module |

pub mod agent;
pub mod api;
pub mod context;
pub mod error;
pub mod history;
pub mod prelude;
pub mod tools;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// Re-export schemars for downstream crates.
pub use schemars;

// ── Constants ──────────────────────────────────────────────────────

/// Default model for agent runs.
pub const DEFAULT_MODEL: &str = "openai/gpt-4.1";

// ── Schema generation ──────────────────────────────────────────────

/// Generate a JSON Schema `serde_json::Value` from a type that implements
/// `schemars::JsonSchema`. This is the bridge between strong Rust types
/// and the `serde_json::Value` that the function-calling API expects.
///
/// # Example
///
/// ```
/// use dexter_core::json_schema_for;
/// use schemars::JsonSchema;
/// use serde::Deserialize;
///
/// #[derive(Deserialize, JsonSchema)]
/// struct PriceArgs {
///     ticker: String,
///     #[serde(default)]
///     period: Option<String>,
/// }
///
/// let schema = json_schema_for::<PriceArgs>();
/// assert_eq!(schema["type"], "object");
/// assert!(schema["required"].as_array().unwrap().contains(&"ticker".into()));
/// ```
pub fn json_schema_for<T: JsonSchema>() -> serde_json::Value {
    let schema = schemars::schema_for!(T);
    serde_json::to_value(schema)
        .unwrap_or_else(|_| serde_json::json!({"type": "object", "properties": {}}))
}

// ── Message types ──────────────────────────────────────────────────

/// Role of a message in the conversation.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::Tool => write!(f, "tool"),
        }
    }
}

/// A message in the conversation.
///
/// Scratchpad messages only ever carry the `System`, `User` and `Assistant`
/// roles. The `Tool` role and `tool_calls` field exist for the wire format:
/// tool-use entries are rendered into them when the conversation is sent to
/// a provider.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Message {
    pub role: MessageRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn assistant_text(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn assistant_tool_calls(calls: Vec<ToolCall>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: None,
            tool_calls: Some(calls),
            tool_call_id: None,
        }
    }

    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Tool,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: Some(call_id.into()),
        }
    }

    /// Text content, or `""` for messages that only carry tool calls.
    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }
}

// ── Tool types ─────────────────────────────────────────────────────

/// The type of a tool definition. Currently always `Function`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum ToolType {
    #[serde(rename = "function")]
    Function,
}

/// Tool definition sent to the model (OpenAI function-calling format).
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ToolDef {
    #[serde(rename = "type")]
    pub tool_type: ToolType,
    pub function: FunctionDef,
}

impl ToolDef {
    /// Create a function-calling tool definition.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            tool_type: ToolType::Function,
            function: FunctionDef {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct FunctionDef {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// The type of a tool call. Currently always `Function`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum CallType {
    #[serde(rename = "function")]
    Function,
}

/// A tool call returned by the model.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: CallType,
    pub function: FunctionCallData,
}

impl ToolCall {
    /// Build a function tool call from its parts.
    pub fn function(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            call_type: CallType::Function,
            function: FunctionCallData {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct FunctionCallData {
    pub name: String,
    pub arguments: String,
}

// ── Token usage ────────────────────────────────────────────────────

/// Token counts reported by the provider, accumulated across a run.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
        }
    }

    /// Add another usage report to this one.
    pub fn accumulate(&mut self, other: &TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.total_tokens += other.total_tokens;
    }
}

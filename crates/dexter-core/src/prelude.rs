//! Convenience re-exports for common `dexter-core` types.
//!
//! Meant to be glob-imported when building agents:
//!
//! ```ignore
//! use dexter_core::prelude::*;
//! ```
//!
//! Covers the types most programs need: the [`Agent`] and its config and
//! events, tool definition and dispatch, the request cache, chat history
//! stores, and the provider boundary. Lower-level pieces (scratchpad,
//! eviction reports, retry helpers) are left to their modules.

// ── Core types ──────────────────────────────────────────────────────
pub use crate::{Message, MessageRole, TokenUsage, ToolCall, ToolDef, json_schema_for};

// ── Agent runtime ───────────────────────────────────────────────────
pub use crate::agent::{Agent, AgentConfig, AgentEvent, EventStream, RunStatus, RunSummary};

// ── Providers ───────────────────────────────────────────────────────
pub use crate::api::{
    Decision, DecisionRequest, LlmProvider, OllamaClient, OpenRouterClient, ProviderFuture,
    RetryConfig, ScriptedProvider,
};

// ── Context management ──────────────────────────────────────────────
pub use crate::context::ContextConfig;

// ── Tools ───────────────────────────────────────────────────────────
pub use crate::tools::{
    DEFAULT_TOOL_TIMEOUT, FnTool, RequestCache, RequestDescription, Tool, ToolContext,
    ToolFuture, ToolRegistry, build_cache_key, parse_tool_args,
};

// ── History ─────────────────────────────────────────────────────────
pub use crate::history::{ChatHistory, InMemoryChatHistory, LongTermChatHistory, Turn};

// ── Errors ──────────────────────────────────────────────────────────
pub use crate::error::{AgentError, ProviderError, ToolError};

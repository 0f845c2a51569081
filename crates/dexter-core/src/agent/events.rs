//! Lifecycle events streamed from a run, and the run's status.
//!
//! A run emits [`AgentEvent`] values in order. Exactly one terminal event
//! (`done` or `error`) ends a run that was not cancelled; a cancelled run
//! simply stops, and its [`RunStatus`] says so.
//!
//! Events serialize with a snake_case `type` tag and camelCase fields:
//!
//! ```
//! use dexter_core::agent::events::AgentEvent;
//!
//! let json = serde_json::to_value(AgentEvent::ContextCleared { evicted_count: 3 }).unwrap();
//! assert_eq!(json, serde_json::json!({"type": "context_cleared", "evictedCount": 3}));
//! ```

use crate::TokenUsage;
use crate::tools::core::preview_chars;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

// ── Events ─────────────────────────────────────────────────────────

/// Events emitted by a run.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum AgentEvent {
    /// A decision step is starting. One per provider call.
    Thinking,
    /// A tool is about to run.
    ToolStart {
        tool: String,
        args: serde_json::Value,
    },
    /// Progress reported by the running tool, relayed verbatim.
    ToolProgress { tool: String, message: String },
    /// The tool returned a result.
    ToolEnd { tool: String, result: String },
    /// The tool failed, or no tool by that name exists.
    ToolError { tool: String, error: String },
    /// The tool-call bound was hit. An answer without tools follows.
    ToolLimit { limit: u32 },
    /// Old tool results were evicted before the next decision step.
    ContextCleared { evicted_count: usize },
    /// The model is producing its final answer.
    AnswerStart,
    /// The run finished with an answer.
    Done {
        answer: String,
        /// Wall-clock duration of the run in milliseconds.
        total_time: u64,
        token_usage: TokenUsage,
        /// Output tokens per second; `None` when no time elapsed.
        tokens_per_second: Option<f64>,
    },
    /// The run failed.
    Error { message: String },
}

impl AgentEvent {
    /// Whether this event ends the run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentEvent::Done { .. } | AgentEvent::Error { .. })
    }

    /// The `type` tag this event serializes with.
    pub fn kind(&self) -> &'static str {
        match self {
            AgentEvent::Thinking => "thinking",
            AgentEvent::ToolStart { .. } => "tool_start",
            AgentEvent::ToolProgress { .. } => "tool_progress",
            AgentEvent::ToolEnd { .. } => "tool_end",
            AgentEvent::ToolError { .. } => "tool_error",
            AgentEvent::ToolLimit { .. } => "tool_limit",
            AgentEvent::ContextCleared { .. } => "context_cleared",
            AgentEvent::AnswerStart => "answer_start",
            AgentEvent::Done { .. } => "done",
            AgentEvent::Error { .. } => "error",
        }
    }
}

/// Log an event at a level matching its importance.
pub fn log_event(event: &AgentEvent) {
    match event {
        AgentEvent::Thinking => debug!("[agent] thinking"),
        AgentEvent::ToolStart { tool, args } => {
            info!("[tool] {tool} started");
            trace!("[tool] {tool} args: {args}");
        }
        AgentEvent::ToolProgress { tool, message } => debug!("[tool] {tool}: {message}"),
        AgentEvent::ToolEnd { tool, result } => {
            info!("[tool] {tool} finished ({} bytes)", result.len());
            trace!("[tool] {tool} result: {}", preview_chars(result, 300));
        }
        AgentEvent::ToolError { tool, error } => warn!("[tool] {tool} failed: {error}"),
        AgentEvent::ToolLimit { limit } => {
            warn!("[agent] tool call limit ({limit}) reached, forcing an answer")
        }
        AgentEvent::ContextCleared { evicted_count } => {
            info!("[agent] context cleared: {evicted_count} tool result(s) evicted")
        }
        AgentEvent::AnswerStart => debug!("[agent] answering"),
        AgentEvent::Done {
            total_time,
            token_usage,
            tokens_per_second,
            ..
        } => info!(
            "[agent] done in {total_time}ms: {} input + {} output tokens{}",
            token_usage.input_tokens,
            token_usage.output_tokens,
            tokens_per_second
                .map(|tps| format!(" ({tps:.1} tok/s)"))
                .unwrap_or_default(),
        ),
        AgentEvent::Error { message } => warn!("[agent] run failed: {message}"),
    }
}

// ── Status ─────────────────────────────────────────────────────────

/// Where a run stands.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    /// Ended with `done`.
    Completed,
    /// Ended with `error`.
    Failed,
    /// Cancelled, timed out, or abandoned by its consumer. No terminal event.
    Interrupted,
}

impl RunStatus {
    pub fn is_finished(self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

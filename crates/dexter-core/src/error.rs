//! Error types for the engine's modules.
//!
//! Only [`AgentError`] can escape [`Agent::run()`](crate::agent::orchestrator::Agent::run).
//! Everything that happens after a run starts is reported through the event
//! stream instead: provider failures become an `error` event, tool failures
//! become `tool_error` events, and cache or history I/O failures are logged
//! and swallowed.

use std::time::Duration;

/// Input validation failures, raised before any run starts.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("query must not be empty")]
    EmptyQuery,
}

/// Failures talking to an LLM provider. The orchestrator treats every
/// variant the same way: the run ends with an `error` event.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("provider HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("failed to parse provider response: {0}")]
    Decode(String),

    #[error("provider error: {0}")]
    Api(String),

    #[error("provider returned no choices")]
    EmptyResponse,

    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

impl ProviderError {
    /// Whether retrying the same request might succeed (429, 5xx, network).
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Http { status, .. } => *status == 429 || (500..=599).contains(status),
            ProviderError::Transport(_) => true,
            ProviderError::Decode(_)
            | ProviderError::Api(_)
            | ProviderError::EmptyResponse
            | ProviderError::Client(_) => false,
        }
    }
}

/// Failures of a single tool call. Each one surfaces as a `tool_error` event
/// and is fed back to the model; none of them end the run.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ToolError {
    #[error("unknown tool '{0}'")]
    UnknownTool(String),

    #[error("invalid arguments for tool '{tool}': {message}")]
    InvalidArguments { tool: String, message: String },

    #[error("{0}")]
    Execution(String),

    #[error("tool '{tool}' timed out after {:.0} seconds", .limit.as_secs_f64())]
    Timeout { tool: String, limit: Duration },

    #[error("tool call cancelled")]
    Cancelled,
}

impl ToolError {
    /// Shorthand for an executor failure with a message.
    pub fn execution(message: impl Into<String>) -> Self {
        ToolError::Execution(message.into())
    }
}

/// Request cache persistence failures.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize cache value: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Chat history persistence failures.
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("history I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize chat history: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Violations of the scratchpad's one-tool-in-flight rule.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScratchpadError {
    #[error("tool '{0}' is still in flight")]
    ToolInFlight(String),

    #[error("no tool call is in flight")]
    NoToolInFlight,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_statuses_detected() {
        let rate_limited = ProviderError::Http {
            status: 429,
            body: "slow down".into(),
        };
        let bad_gateway = ProviderError::Http {
            status: 502,
            body: String::new(),
        };
        assert!(rate_limited.is_transient());
        assert!(bad_gateway.is_transient());
    }

    #[test]
    fn permanent_statuses_not_retried() {
        for status in [400, 401, 403, 404, 422] {
            let err = ProviderError::Http {
                status,
                body: String::new(),
            };
            assert!(!err.is_transient(), "HTTP {status} should not be transient");
        }
        assert!(!ProviderError::Api("invalid model".into()).is_transient());
        assert!(!ProviderError::EmptyResponse.is_transient());
    }

    #[test]
    fn tool_error_messages_are_readable() {
        assert_eq!(
            ToolError::UnknownTool("nope".into()).to_string(),
            "unknown tool 'nope'"
        );
        let timeout = ToolError::Timeout {
            tool: "search".into(),
            limit: Duration::from_secs(30),
        };
        assert_eq!(timeout.to_string(), "tool 'search' timed out after 30 seconds");
        assert_eq!(ToolError::execution("boom").to_string(), "boom");
    }
}

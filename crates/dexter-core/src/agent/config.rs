//! Configuration for [`Agent`](super::orchestrator::Agent) runs.
//!
//! ```ignore
//! let config = AgentConfig::new("anthropic/claude-sonnet-4")
//!     .with_max_tool_calls(20)
//!     .with_run_timeout(Duration::from_secs(120))
//!     .with_context(ContextConfig::default().with_keep_tool_uses(3));
//! ```

use crate::DEFAULT_MODEL;
use crate::context::ContextConfig;
use std::time::Duration;

/// Default bound on tool calls per run.
pub const DEFAULT_MAX_TOOL_CALLS: u32 = 10;

/// Default wall-clock limit per run.
pub const DEFAULT_RUN_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Default number of prior turns replayed from chat history.
pub const DEFAULT_HISTORY_TURNS: usize = 5;

/// Settings shared by every run of an [`Agent`](super::orchestrator::Agent).
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Model identifier passed to the provider.
    pub model: String,
    /// Replaces the built-in preamble of the system prompt when set.
    pub system_prompt: Option<String>,
    /// Tool calls allowed before an answer is forced.
    pub max_tool_calls: u32,
    /// Wall-clock limit. When it elapses the run is cancelled.
    pub run_timeout: Duration,
    /// Capacity of the event channel. The run suspends while it is full.
    pub event_buffer: usize,
    /// Answered turns replayed from chat history into a new run.
    pub history_turns: usize,
    pub context: ContextConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            system_prompt: None,
            max_tool_calls: DEFAULT_MAX_TOOL_CALLS,
            run_timeout: DEFAULT_RUN_TIMEOUT,
            event_buffer: 1,
            history_turns: DEFAULT_HISTORY_TURNS,
            context: ContextConfig::default(),
        }
    }
}

impl AgentConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_max_tool_calls(mut self, max: u32) -> Self {
        self.max_tool_calls = max;
        self
    }

    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = timeout;
        self
    }

    /// Set the event channel capacity. Clamped to at least 1.
    pub fn with_event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = capacity.max(1);
        self
    }

    pub fn with_history_turns(mut self, turns: usize) -> Self {
        self.history_turns = turns;
        self
    }

    pub fn with_context(mut self, context: ContextConfig) -> Self {
        self.context = context;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{CONTEXT_THRESHOLD, KEEP_TOOL_USES};

    #[test]
    fn defaults() {
        let config = AgentConfig::default();
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.max_tool_calls, 10);
        assert_eq!(config.run_timeout, Duration::from_secs(600));
        assert_eq!(config.event_buffer, 1);
        assert_eq!(config.history_turns, 5);
        assert_eq!(config.context.context_threshold, CONTEXT_THRESHOLD);
        assert_eq!(config.context.keep_tool_uses, KEEP_TOOL_USES);
        assert!(config.system_prompt.is_none());
    }

    #[test]
    fn builders() {
        let config = AgentConfig::new("test/model")
            .with_system_prompt("Be terse.")
            .with_max_tool_calls(3)
            .with_run_timeout(Duration::from_secs(5))
            .with_event_buffer(0)
            .with_history_turns(1);
        assert_eq!(config.model, "test/model");
        assert_eq!(config.system_prompt.as_deref(), Some("Be terse."));
        assert_eq!(config.max_tool_calls, 3);
        assert_eq!(config.run_timeout, Duration::from_secs(5));
        assert_eq!(config.event_buffer, 1);
        assert_eq!(config.history_turns, 1);
    }
}

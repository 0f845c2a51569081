//! Agent runtime: the orchestrator loop and its supporting modules.
//!
//! - [`orchestrator::Agent`]: starts runs. Start here.
//! - [`config::AgentConfig`]: model, tool-call bound, run deadline, event
//!   buffer, history replay, context thresholds.
//! - [`events`]: the [`AgentEvent`] enum and [`RunStatus`].
//! - [`stream::EventStream`]: the consumer side of a run, with cancellation.
//! - [`prompt`]: system prompt assembly.

pub mod config;
pub mod events;
pub mod orchestrator;
pub mod prompt;
pub mod stream;

// Re-export commonly used items at the module level.
pub use config::AgentConfig;
pub use events::{AgentEvent, RunStatus, log_event};
pub use orchestrator::{Agent, RunSummary};
pub use prompt::{SystemPromptBuilder, build_system_prompt};
pub use stream::EventStream;

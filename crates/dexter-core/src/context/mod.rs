//! Context window management: token estimates, the run scratchpad, eviction.
//!
//! 1. **[`budget`]**: the length-based [`estimate_tokens`] heuristic, the
//!    [`TOKEN_BUDGET`] / [`CONTEXT_THRESHOLD`] / [`KEEP_TOOL_USES`] constants,
//!    and [`ContextConfig`] to override them.
//!
//! 2. **[`scratchpad`]**: [`Scratchpad`], the in-order record of a run's
//!    messages and [`ToolUseEntry`] values, rendered into provider messages.
//!
//! 3. **[`eviction`]**: [`ContextManager`], which drops the oldest tool uses
//!    once the estimate crosses the threshold.

pub mod budget;
pub mod eviction;
pub mod scratchpad;

// Re-export commonly used items at the module level.
pub use budget::{
    CONTEXT_THRESHOLD, ContextConfig, ContextUsage, DEFAULT_CHARS_PER_TOKEN, KEEP_TOOL_USES,
    TOKEN_BUDGET, estimate_tokens, estimate_tokens_with,
};
pub use eviction::{ContextManager, EVICTED_PREFIX, EvictionReport};
pub use scratchpad::{Scratchpad, ScratchpadItem, ToolOutcome, ToolUseEntry};

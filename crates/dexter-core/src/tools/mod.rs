//! Tool abstractions for LLM function-calling agents.
//!
//! Every agent capability (price lookups, filings search, web fetches) is a
//! [`Tool`] trait implementor. Tools are collected into a [`ToolRegistry`]
//! which handles dispatch, validation, caching, truncation, and timeouts.
//!
//! # Defining tools
//!
//! - **[`FnTool`]**: closure-based, auto-parses arguments. Best for simple tools.
//! - **`impl Tool`**: full struct with manual [`Tool::definition()`] and
//!   [`Tool::execute()`]. Best for tools that own clients or configuration.
//!
//! # Submodules
//!
//! - [`core`]: [`Tool`] trait, [`ToolRegistry`], [`FnTool`], argument helpers.
//! - [`progress`]: [`ToolContext`] and the per-call progress channel.
//! - [`cache`]: content-addressed [`RequestCache`] with deterministic keys.

pub mod cache;
pub mod core;
pub mod progress;

// Re-export commonly used items at the module level.
pub use cache::{RequestCache, RequestDescription, build_cache_key, describe_request};
pub use core::{
    DEFAULT_MAX_RESULT_BYTES, DEFAULT_TOOL_TIMEOUT, FnTool, Tool, ToolFuture, ToolRegistry,
    parse_tool_args, truncate_result, validate_tool_arguments,
};
pub use progress::{ProgressReceiver, ToolContext, progress_channel};

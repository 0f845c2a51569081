//! The LLM decision boundary.
//!
//! The orchestrator never talks HTTP. Each decision step hands the rendered
//! conversation and the tools on offer to an [`LlmProvider`] and gets back a
//! [`Decision`]: tool calls to make, or the final answer text.

use crate::error::ProviderError;
use crate::{Message, TokenUsage, ToolCall, ToolDef};
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by [`LlmProvider::decide`].
pub type ProviderFuture<'a> = Pin<Box<dyn Future<Output = Result<Decision, ProviderError>> + Send + 'a>>;

/// One decision step's input.
#[derive(Debug, Clone, Copy)]
pub struct DecisionRequest<'a> {
    pub model: &'a str,
    /// The full conversation, system prompt first.
    pub messages: &'a [Message],
    /// Tools the model may call. Empty when an answer is being forced.
    pub tools: &'a [ToolDef],
}

/// What the model decided.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Decision {
    /// Answer text. Ignored when `tool_calls` is non-empty.
    pub text: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<TokenUsage>,
}

impl Decision {
    /// A final answer.
    pub fn answer(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    /// A request to call tools.
    pub fn tool_calls(calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls: calls,
            ..Default::default()
        }
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn wants_tools(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// An LLM that can take one decision step.
///
/// Implementations should be cheap to share (`Arc<dyn LlmProvider>`) and
/// safe to call from several runs at once.
pub trait LlmProvider: Send + Sync {
    fn decide<'a>(&'a self, request: DecisionRequest<'a>) -> ProviderFuture<'a>;
}

//! API interaction layer: the provider boundary, HTTP clients, retry.
//!
//! - [`provider`]: the [`LlmProvider`] trait the orchestrator calls once per
//!   decision step, with [`DecisionRequest`] in and [`Decision`] out.
//! - [`openrouter`]: [`OpenRouterClient`], an `LlmProvider` over the
//!   OpenAI-style chat completions API.
//! - [`ollama`]: [`OllamaClient`], the same API served by a local Ollama.
//! - [`retry`]: transient error retry (429, 5xx, network failures) with
//!   exponential backoff and jitter. Never retries other 4xx errors.
//! - [`scripted`]: [`ScriptedProvider`], a deterministic provider for tests
//!   and offline demos.

pub mod ollama;
pub mod openrouter;
pub mod provider;
pub mod retry;
pub mod scripted;

// Re-export commonly used items at the module level.
pub use ollama::{DEFAULT_OLLAMA_URL, OllamaClient};
pub use openrouter::{OPENROUTER_URL, OpenRouterClient};
pub use provider::{Decision, DecisionRequest, LlmProvider, ProviderFuture};
pub use retry::{RetryConfig, retry_transient};
pub use scripted::{RecordedRequest, ScriptedProvider};

//! Local models served by Ollama.
//!
//! Ollama exposes an OpenAI-compatible chat completions endpoint, so
//! decisions go through [`OpenRouterClient`] pointed at the local server.
//! Model discovery uses Ollama's native `/api/tags` listing.

use super::openrouter::OpenRouterClient;
use super::provider::{DecisionRequest, LlmProvider, ProviderFuture};
use crate::error::ProviderError;
use serde_json::Value;
use tracing::debug;

/// Where Ollama listens unless `OLLAMA_BASE_URL` says otherwise.
pub const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Environment variable overriding [`DEFAULT_OLLAMA_URL`].
pub const OLLAMA_BASE_URL_ENV: &str = "OLLAMA_BASE_URL";

/// [`LlmProvider`] backed by a local Ollama server.
pub struct OllamaClient {
    base_url: String,
    chat: OpenRouterClient,
}

impl OllamaClient {
    /// Client for the server at `base_url` (e.g. `http://127.0.0.1:11434`).
    pub fn new(base_url: impl Into<String>) -> Result<Self, ProviderError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let chat = OpenRouterClient::new("")?
            .with_endpoint(format!("{base_url}/v1/chat/completions"));
        Ok(Self { base_url, chat })
    }

    /// Client for `OLLAMA_BASE_URL`, falling back to [`DEFAULT_OLLAMA_URL`].
    pub fn from_env() -> Result<Self, ProviderError> {
        let base_url = std::env::var(OLLAMA_BASE_URL_ENV)
            .ok()
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string());
        Self::new(base_url)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Names of the locally installed models.
    ///
    /// An unreachable server or an unexpected reply yields an empty list;
    /// the caller decides whether that is an error.
    pub async fn list_models(&self) -> Vec<String> {
        let url = format!("{}/api/tags", self.base_url);
        let resp = match reqwest::get(&url).await {
            Ok(resp) => resp,
            Err(e) => {
                debug!("[ollama] server unreachable at {url}: {e}");
                return Vec::new();
            }
        };
        if !resp.status().is_success() {
            debug!("[ollama] model listing failed: HTTP {}", resp.status());
            return Vec::new();
        }
        match resp.json::<Value>().await {
            Ok(body) => parse_model_names(&body),
            Err(e) => {
                debug!("[ollama] unreadable model listing: {e}");
                Vec::new()
            }
        }
    }
}

impl LlmProvider for OllamaClient {
    fn decide<'a>(&'a self, request: DecisionRequest<'a>) -> ProviderFuture<'a> {
        self.chat.decide(request)
    }
}

/// Model names from an `/api/tags` body. Entries without a string `name`
/// are skipped.
fn parse_model_names(body: &Value) -> Vec<String> {
    body.get("models")
        .and_then(Value::as_array)
        .map(|models| {
            models
                .iter()
                .filter_map(|m| m.get("name").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

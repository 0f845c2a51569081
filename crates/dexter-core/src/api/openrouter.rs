//! Async HTTP client for the OpenRouter chat completions API.
//!
//! The same client speaks to any OpenAI-compatible endpoint via
//! [`OpenRouterClient::with_endpoint`]; the Ollama provider builds on that.

use super::provider::{Decision, DecisionRequest, LlmProvider, ProviderFuture};
use super::retry::{RetryConfig, retry_transient};
use crate::error::ProviderError;
use crate::{Message, TokenUsage, ToolCall, ToolDef};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Chat completions endpoint.
pub const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

// ── Wire types ─────────────────────────────────────────────────────

/// Chat completion request body. Unused optional fields are omitted.
#[derive(Serialize, Debug, Default)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDef>>,
}

#[derive(Deserialize, Debug)]
struct RawChatResponse {
    choices: Option<Vec<RawChoice>>,
    error: Option<ApiErrorResponse>,
    #[serde(default)]
    usage: Option<UsageInfo>,
}

#[derive(Deserialize, Debug)]
struct RawChoice {
    message: RawResponseMessage,
}

#[derive(Deserialize, Debug)]
struct RawResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Deserialize, Debug)]
struct ApiErrorResponse {
    message: String,
}

/// Token usage statistics as reported on the wire.
#[derive(Deserialize, Debug, Clone, Copy)]
pub struct UsageInfo {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

impl From<UsageInfo> for TokenUsage {
    fn from(u: UsageInfo) -> Self {
        let input = u64::from(u.prompt_tokens.unwrap_or(0));
        let output = u64::from(u.completion_tokens.unwrap_or(0));
        TokenUsage {
            input_tokens: input,
            output_tokens: output,
            total_tokens: u.total_tokens.map_or(input + output, u64::from),
        }
    }
}

/// Turn a raw response body into a [`Decision`].
fn parse_decision(text: &str) -> Result<Decision, ProviderError> {
    let parsed: RawChatResponse =
        serde_json::from_str(text).map_err(|e| ProviderError::Decode(e.to_string()))?;

    if let Some(err) = parsed.error {
        return Err(ProviderError::Api(err.message));
    }

    if let Some(usage) = parsed.usage {
        debug!(
            "Token usage: prompt={}, completion={}, total={}",
            usage.prompt_tokens.unwrap_or(0),
            usage.completion_tokens.unwrap_or(0),
            usage.total_tokens.unwrap_or(0),
        );
    }

    let choice = parsed
        .choices
        .and_then(|c| c.into_iter().next())
        .ok_or(ProviderError::EmptyResponse)?;

    let tool_calls = choice.message.tool_calls.unwrap_or_default();
    debug!(
        "LLM output: {} chars text, {} tool call(s)",
        choice.message.content.as_ref().map_or(0, |s| s.len()),
        tool_calls.len()
    );

    Ok(Decision {
        text: choice.message.content,
        tool_calls,
        usage: parsed.usage.map(TokenUsage::from),
    })
}

// ── Client ─────────────────────────────────────────────────────────

/// OpenRouter-backed [`LlmProvider`].
pub struct OpenRouterClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    referer: String,
    title: String,
    retry: RetryConfig,
    max_tokens: Option<u32>,
}

impl OpenRouterClient {
    /// Create a new client with the given API key and default headers.
    pub fn new(api_key: impl Into<String>) -> Result<Self, ProviderError> {
        Self::with_headers(api_key, "https://github.com/virattt/dexter", "dexter")
    }

    /// Create a new client with custom Referer and X-Title headers.
    pub fn with_headers(
        api_key: impl Into<String>,
        referer: impl Into<String>,
        title: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .user_agent("dexter/0.1")
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| ProviderError::Client(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: OPENROUTER_URL.to_string(),
            api_key: api_key.into(),
            referer: referer.into(),
            title: title.into(),
            retry: RetryConfig::with_retries(3),
            max_tokens: None,
        })
    }

    /// Send requests to another OpenAI-compatible chat completions URL.
    pub fn with_endpoint(mut self, url: impl Into<String>) -> Self {
        self.endpoint = url.into();
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Send a chat completion request once, without retrying.
    pub async fn chat(&self, body: &ChatRequest) -> Result<Decision, ProviderError> {
        debug!(
            "LLM request: model={}, messages={}, tools={}",
            body.model,
            body.messages.len(),
            body.tools.as_ref().map_or(0, |t| t.len()),
        );
        trace!(
            "Request payload size: {} bytes",
            serde_json::to_string(body).map_or(0, |s| s.len())
        );

        let start = Instant::now();
        let mut req = self
            .client
            .post(&self.endpoint)
            .header("HTTP-Referer", &self.referer)
            .header("X-Title", &self.title);
        if !self.api_key.is_empty() {
            req = req.header("Authorization", format!("Bearer {}", self.api_key));
        }
        let resp = req.json(body).send().await?;

        let status = resp.status();
        let text = resp.text().await?;
        debug!(
            "LLM response: HTTP {} in {:.1}s ({} bytes)",
            status,
            start.elapsed().as_secs_f64(),
            text.len()
        );

        if !status.is_success() {
            return Err(ProviderError::Http {
                status: status.as_u16(),
                body: text,
            });
        }
        parse_decision(&text)
    }
}

impl LlmProvider for OpenRouterClient {
    fn decide<'a>(&'a self, request: DecisionRequest<'a>) -> ProviderFuture<'a> {
        Box::pin(async move {
            let body = ChatRequest {
                model: request.model.to_string(),
                messages: request.messages.to_vec(),
                max_tokens: self.max_tokens,
                temperature: None,
                tools: (!request.tools.is_empty()).then(|| request.tools.to_vec()),
            };
            retry_transient(&self.retry, || self.chat(&body)).await
        })
    }
}

//! A provider that replays a fixed script of decisions.
//!
//! Useful for tests and offline demos: every call to `decide` pops the next
//! scripted step and records the request it was given.

use super::provider::{Decision, DecisionRequest, LlmProvider, ProviderFuture};
use crate::error::ProviderError;
use crate::Message;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// What the provider saw on one call.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub messages: Vec<Message>,
    /// Names of the tools offered.
    pub tools: Vec<String>,
}

enum Step {
    Reply(Decision),
    Fail(ProviderError),
}

/// Deterministic [`LlmProvider`] replaying scripted decisions in order.
///
/// Once the script runs out every further call fails with
/// [`ProviderError::EmptyResponse`].
#[derive(Default)]
pub struct ScriptedProvider {
    steps: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<RecordedRequest>>,
    delay: Option<Duration>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a decision.
    pub fn then(self, decision: Decision) -> Self {
        self.push(Step::Reply(decision))
    }

    /// Queue a failure.
    pub fn then_fail(self, error: ProviderError) -> Self {
        self.push(Step::Fail(error))
    }

    /// Sleep this long before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn push(self, step: Step) -> Self {
        self.steps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(step);
        self
    }

    /// Every request received so far, in order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of scripted steps not yet consumed.
    pub fn remaining(&self) -> usize {
        self.steps.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl LlmProvider for ScriptedProvider {
    fn decide<'a>(&'a self, request: DecisionRequest<'a>) -> ProviderFuture<'a> {
        Box::pin(async move {
            self.requests
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(RecordedRequest {
                    messages: request.messages.to_vec(),
                    tools: request
                        .tools
                        .iter()
                        .map(|t| t.function.name.clone())
                        .collect(),
                });
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let step = self
                .steps
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front();
            match step {
                Some(Step::Reply(decision)) => Ok(decision),
                Some(Step::Fail(error)) => Err(error),
                None => Err(ProviderError::EmptyResponse),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ToolDef;

    #[tokio::test]
    async fn replays_in_order_and_records() {
        let provider = ScriptedProvider::new()
            .then(Decision::answer("first"))
            .then_fail(ProviderError::Api("boom".into()));
        let messages = [Message::user("hi")];
        let tools = [ToolDef::new("search", "Search", serde_json::json!({}))];
        let request = DecisionRequest {
            model: "test",
            messages: &messages,
            tools: &tools,
        };

        let first = provider.decide(request).await.unwrap();
        assert_eq!(first.text.as_deref(), Some("first"));
        assert!(provider.decide(request).await.is_err());
        assert!(matches!(
            provider.decide(request).await,
            Err(ProviderError::EmptyResponse)
        ));

        let recorded = provider.requests();
        assert_eq!(recorded.len(), 3);
        assert_eq!(recorded[0].tools, vec!["search"]);
        assert_eq!(provider.remaining(), 0);
    }
}

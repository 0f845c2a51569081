//! The agent loop.
//!
//! A run alternates decision steps and tool calls until the model answers:
//!
//! ```text
//! Idle ─▶ Thinking ─▶ ToolDispatch ─▶ Thinking ─▶ … ─▶ Answering ─▶ Done
//!                │                                                  ├▶ Error
//!                └──────── cancellation at any check ───────────────┴▶ Interrupted
//! ```
//!
//! Before each decision step the [`ContextManager`] may evict old tool
//! uses; the run then emits `context_cleared` ahead of `thinking`. Tool
//! calls from one decision run strictly one after another. Once
//! `max_tool_calls` calls have been made, the next requested call emits
//! `tool_limit` and the run asks for an answer with no tools offered.
//!
//! The token is checked before and after every provider call and every
//! tool call; a set token ends the run without a terminal event. A pending
//! provider call is raced against the token and abandoned as soon as it is
//! set. Tool calls are not: a tool sees the token through its
//! [`ToolContext`](crate::tools::ToolContext) and the run notices only once
//! the call returns. The run deadline and a dropped [`EventStream`] set the
//! same token.
//!
//! A run that ends without `done` still closes its history entry, with the
//! last assistant text it produced or an empty answer.

use super::config::AgentConfig;
use super::events::{AgentEvent, RunStatus, log_event};
use super::prompt::build_system_prompt;
use super::stream::{EventStream, spawn_deadline};
use crate::api::provider::{Decision, DecisionRequest, LlmProvider};
use crate::context::{ContextManager, Scratchpad};
use crate::error::{AgentError, ProviderError, ScratchpadError};
use crate::history::ChatHistory;
use crate::tools::core::ToolRegistry;
use crate::tools::progress::progress_channel;
use crate::{Message, MessageRole, TokenUsage, ToolCall, ToolDef};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

// ── Agent ──────────────────────────────────────────────────────────

/// Runs queries against a provider and a tool registry.
///
/// Cheap to clone; every run gets its own scratchpad and event stream.
#[derive(Clone)]
pub struct Agent {
    provider: Arc<dyn LlmProvider>,
    tools: Arc<ToolRegistry>,
    config: AgentConfig,
}

/// Everything a drained run produced.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub events: Vec<AgentEvent>,
    pub status: RunStatus,
    /// The answer from the `done` event, if the run completed.
    pub answer: Option<String>,
}

impl Agent {
    pub fn new(provider: Arc<dyn LlmProvider>, tools: Arc<ToolRegistry>, config: AgentConfig) -> Self {
        Self {
            provider,
            tools,
            config,
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    /// Start a run and return its event stream.
    ///
    /// Fails only on an empty (or whitespace-only) query, in which case no
    /// run starts and nothing is saved. With `history`, up to
    /// `history_turns` prior answered turns are replayed into the run and
    /// the query is saved before the run begins.
    ///
    /// Must be called inside a tokio runtime: the run is a spawned task.
    pub fn run(
        &self,
        query: &str,
        history: Option<Arc<dyn ChatHistory>>,
    ) -> Result<EventStream, AgentError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AgentError::EmptyQuery);
        }

        let mut scratchpad = Scratchpad::with_chars_per_token(self.config.context.chars_per_token);
        if let Some(history) = &history {
            let turns = history.recent_turns(self.config.history_turns);
            debug!("[agent] replaying {} prior turn(s)", turns.len());
            for turn in turns.into_iter().filter(|t| !t.answer.is_empty()) {
                scratchpad.push_message(Message::user(turn.query));
                scratchpad.push_message(Message::assistant_text(turn.answer));
            }
            if let Err(e) = history.save_user_query(query) {
                warn!("[agent] failed to save query to chat history: {e}");
            }
        }
        scratchpad.push_message(Message::user(query));

        let (events_tx, events_rx) = mpsc::channel(self.config.event_buffer.max(1));
        let (status_tx, status_rx) = watch::channel(RunStatus::Running);
        let cancel = CancellationToken::new();
        let finished = CancellationToken::new();
        spawn_deadline(cancel.clone(), finished.clone(), self.config.run_timeout);

        let run = Run {
            provider: self.provider.clone(),
            tools: self.tools.clone(),
            context: ContextManager::new(self.config.context.clone()),
            system_prompt: build_system_prompt(self.config.system_prompt.as_deref(), &self.tools),
            config: self.config.clone(),
            history,
            scratchpad,
            events: events_tx,
            status: status_tx,
            cancel: cancel.clone(),
            usage: TokenUsage::default(),
            started: Instant::now(),
        };
        info!(
            "[agent] run started: model={}, tools={}, max_tool_calls={}",
            self.config.model,
            self.tools.len(),
            self.config.max_tool_calls,
        );
        tokio::spawn(run.execute(finished.drop_guard()));

        Ok(EventStream::new(events_rx, status_rx, cancel))
    }

    /// Start a run and collect every event it produces.
    pub async fn run_to_completion(
        &self,
        query: &str,
        history: Option<Arc<dyn ChatHistory>>,
    ) -> Result<RunSummary, AgentError> {
        let mut stream = self.run(query, history)?;
        let mut events = Vec::new();
        while let Some(event) = stream.next().await {
            events.push(event);
        }
        let answer = events.iter().find_map(|e| match e {
            AgentEvent::Done { answer, .. } => Some(answer.clone()),
            _ => None,
        });
        Ok(RunSummary {
            events,
            status: stream.status(),
            answer,
        })
    }
}

// ── Run ────────────────────────────────────────────────────────────

/// Why a run stopped before its terminal event.
#[derive(Debug)]
enum Halt {
    Cancelled,
    ConsumerGone,
    Failed(String),
}

impl From<ProviderError> for Halt {
    fn from(e: ProviderError) -> Self {
        Halt::Failed(e.to_string())
    }
}

impl From<ScratchpadError> for Halt {
    fn from(e: ScratchpadError) -> Self {
        Halt::Failed(e.to_string())
    }
}

/// State owned by one spawned run.
struct Run {
    provider: Arc<dyn LlmProvider>,
    tools: Arc<ToolRegistry>,
    context: ContextManager,
    system_prompt: String,
    config: AgentConfig,
    history: Option<Arc<dyn ChatHistory>>,
    scratchpad: Scratchpad,
    events: mpsc::Sender<AgentEvent>,
    status: watch::Sender<RunStatus>,
    cancel: CancellationToken,
    usage: TokenUsage,
    started: Instant,
}

impl Run {
    async fn execute(mut self, _finished: tokio_util::sync::DropGuard) {
        match self.drive().await {
            Ok(answer) => self.complete(answer).await,
            Err(Halt::Failed(message)) => self.fail(message).await,
            Err(Halt::Cancelled) => self.interrupt("cancelled"),
            Err(Halt::ConsumerGone) => self.interrupt("event consumer dropped"),
        }
    }

    /// The loop proper. Returns the answer text once the model gives one.
    async fn drive(&mut self) -> Result<String, Halt> {
        let tool_defs = self.tools.definitions();
        let no_tools: [ToolDef; 0] = [];
        let mut force_answer = false;

        loop {
            self.checkpoint()?;

            let report = self.context.enforce(&self.system_prompt, &mut self.scratchpad);
            if report.evicted > 0 {
                self.emit(AgentEvent::ContextCleared {
                    evicted_count: report.evicted,
                })
                .await?;
            }
            self.emit(AgentEvent::Thinking).await?;

            let messages = self.scratchpad.to_messages(&self.system_prompt);
            let tools: &[ToolDef] = if force_answer { &no_tools } else { &tool_defs };
            let decision = self.decide(&messages, tools).await?;
            if let Some(usage) = &decision.usage {
                self.usage.accumulate(usage);
            }

            if force_answer || !decision.wants_tools() {
                return self.answer(decision).await;
            }

            for call in decision.tool_calls {
                if self.scratchpad.tool_calls_made() >= self.config.max_tool_calls {
                    self.emit(AgentEvent::ToolLimit {
                        limit: self.config.max_tool_calls,
                    })
                    .await?;
                    force_answer = true;
                    break;
                }
                self.call_tool(call).await?;
            }
        }
    }

    async fn decide(&self, messages: &[Message], tools: &[ToolDef]) -> Result<Decision, Halt> {
        self.checkpoint()?;
        let request = DecisionRequest {
            model: &self.config.model,
            messages,
            tools,
        };
        let decision = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(Halt::Cancelled),
            decision = self.provider.decide(request) => decision,
        };
        self.checkpoint()?;
        Ok(decision?)
    }

    async fn answer(&mut self, decision: Decision) -> Result<String, Halt> {
        if decision.wants_tools() {
            debug!("[agent] ignoring tool calls in a forced answer");
        }
        let answer = decision.text.unwrap_or_default();
        self.scratchpad.push_message(Message::assistant_text(&answer));
        self.emit(AgentEvent::AnswerStart).await?;
        Ok(answer)
    }

    /// One tool call: `tool_start`, progress relayed as it arrives, then
    /// `tool_end` or `tool_error`.
    async fn call_tool(&mut self, call: ToolCall) -> Result<(), Halt> {
        self.checkpoint()?;
        let ToolCall { id, function, .. } = call;
        let name = function.name;
        let arguments = function.arguments;

        self.scratchpad.start_tool_use(id, &name, &arguments)?;
        let args = self
            .scratchpad
            .in_flight()
            .map(|e| e.arguments.clone())
            .unwrap_or_default();
        self.emit(AgentEvent::ToolStart {
            tool: name.clone(),
            args,
        })
        .await?;

        let (ctx, mut progress) = progress_channel(self.cancel.clone());
        let tools = self.tools.clone();
        let outcome = {
            let dispatch = tools.dispatch(&name, &arguments, &ctx);
            tokio::pin!(dispatch);
            loop {
                tokio::select! {
                    biased;
                    Some(message) = progress.recv() => {
                        self.emit(AgentEvent::ToolProgress { tool: name.clone(), message }).await?;
                    }
                    outcome = &mut dispatch => break outcome,
                }
            }
        };
        while let Ok(message) = progress.try_recv() {
            self.emit(AgentEvent::ToolProgress {
                tool: name.clone(),
                message,
            })
            .await?;
        }

        self.checkpoint()?;
        let event = match outcome {
            Ok(result) => {
                self.scratchpad.finish_tool_use(Ok(result.clone()))?;
                AgentEvent::ToolEnd { tool: name, result }
            }
            Err(e) => {
                let error = e.to_string();
                self.scratchpad.finish_tool_use(Err(error.clone()))?;
                AgentEvent::ToolError { tool: name, error }
            }
        };
        self.emit(event).await
    }

    /// Close the history entry of a run that ended without `done`, keeping
    /// whatever assistant text this run produced (or an empty answer).
    fn record_partial_answer(&self) {
        let Some(history) = &self.history else {
            return;
        };
        let partial = self
            .scratchpad
            .messages()
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .take_while(|m| m.role != MessageRole::User)
            .find(|m| m.role == MessageRole::Assistant && !m.text().is_empty())
            .map(|m| m.text().to_string())
            .unwrap_or_default();
        if let Err(e) = history.save_answer(&partial) {
            warn!("[agent] failed to save partial answer to chat history: {e}");
        }
    }

    fn checkpoint(&self) -> Result<(), Halt> {
        if self.cancel.is_cancelled() {
            Err(Halt::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Send a non-terminal event, waiting for room in the channel.
    async fn emit(&self, event: AgentEvent) -> Result<(), Halt> {
        log_event(&event);
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Halt::Cancelled),
            sent = self.events.send(event) => sent.map_err(|_| Halt::ConsumerGone),
        }
    }

    async fn complete(self, answer: String) {
        if self.cancel.is_cancelled() {
            return self.interrupt("cancelled");
        }
        if let Some(history) = &self.history
            && let Err(e) = history.save_answer(&answer)
        {
            warn!("[agent] failed to save answer to chat history: {e}");
        }

        let total_time = u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let tokens_per_second =
            (total_time > 0).then(|| self.usage.output_tokens as f64 / (total_time as f64 / 1000.0));
        let event = AgentEvent::Done {
            answer,
            total_time,
            token_usage: self.usage,
            tokens_per_second,
        };
        self.finish(event, RunStatus::Completed).await;
    }

    async fn fail(self, message: String) {
        self.record_partial_answer();
        self.finish(AgentEvent::Error { message }, RunStatus::Failed)
            .await;
    }

    /// Publish the final status, then deliver the terminal event.
    async fn finish(self, event: AgentEvent, status: RunStatus) {
        if self.cancel.is_cancelled() {
            return self.interrupt("cancelled");
        }
        self.status.send_replace(status);
        log_event(&event);
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => self.interrupt("cancelled before the final event"),
            sent = self.events.send(event) => {
                if sent.is_err() {
                    debug!("[agent] consumer gone before the final event");
                }
            }
        }
    }

    fn interrupt(&self, reason: &str) {
        self.record_partial_answer();
        self.status.send_replace(RunStatus::Interrupted);
        info!(
            "[agent] run interrupted ({reason}) after {:.1}s, {} tool call(s)",
            self.started.elapsed().as_secs_f64(),
            self.scratchpad.tool_calls_made(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::scripted::ScriptedProvider;
    use crate::history::InMemoryChatHistory;

    fn agent(provider: ScriptedProvider) -> Agent {
        Agent::new(
            Arc::new(provider),
            Arc::new(ToolRegistry::new()),
            AgentConfig::new("test/model"),
        )
    }

    #[tokio::test]
    async fn empty_query_is_rejected() {
        let history = Arc::new(InMemoryChatHistory::new());
        let result = agent(ScriptedProvider::new()).run("   ", Some(history.clone()));
        assert!(matches!(result, Err(AgentError::EmptyQuery)));
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn direct_answer() {
        let provider = ScriptedProvider::new().then(Decision::answer("Hello").with_usage(TokenUsage::new(10, 4)));
        let summary = agent(provider).run_to_completion("hi", None).await.unwrap();

        assert_eq!(summary.status, RunStatus::Completed);
        assert_eq!(summary.answer.as_deref(), Some("Hello"));
        let kinds: Vec<&str> = summary.events.iter().map(AgentEvent::kind).collect();
        assert_eq!(kinds, vec!["thinking", "answer_start", "done"]);
        match summary.events.last() {
            Some(AgentEvent::Done { token_usage, .. }) => {
                assert_eq!(*token_usage, TokenUsage::new(10, 4));
            }
            other => panic!("expected done, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn provider_failure_is_an_error_event() {
        let provider = ScriptedProvider::new().then_fail(ProviderError::Api("model overloaded".into()));
        let summary = agent(provider).run_to_completion("hi", None).await.unwrap();

        assert_eq!(summary.status, RunStatus::Failed);
        assert_eq!(summary.answer, None);
        assert_eq!(
            summary.events.last(),
            Some(&AgentEvent::Error {
                message: "provider error: model overloaded".into()
            })
        );
    }

    #[tokio::test]
    async fn unanswered_turns_are_not_replayed() {
        let history = Arc::new(InMemoryChatHistory::new());
        history.save_user_query("lost question").unwrap();
        history.save_answer("").unwrap();
        let provider = Arc::new(ScriptedProvider::new().then(Decision::answer("ok")));
        let agent = Agent::new(provider.clone(), Arc::new(ToolRegistry::new()), AgentConfig::default());

        agent.run_to_completion("next", Some(history)).await.unwrap();

        let requests = provider.requests();
        let texts: Vec<&str> = requests[0].messages.iter().skip(1).map(Message::text).collect();
        assert_eq!(texts, vec!["next"]);
    }

    #[tokio::test]
    async fn query_is_trimmed_before_use() {
        let provider = Arc::new(ScriptedProvider::new().then(Decision::answer("ok")));
        let agent = Agent::new(
            provider.clone(),
            Arc::new(ToolRegistry::new()),
            AgentConfig::default(),
        );
        agent.run_to_completion("  what is EBITDA?  ", None).await.unwrap();

        let request = &provider.requests()[0];
        assert_eq!(request.messages.last().map(Message::text), Some("what is EBITDA?"));
        assert_eq!(request.messages[0].role, crate::MessageRole::System);
    }
}

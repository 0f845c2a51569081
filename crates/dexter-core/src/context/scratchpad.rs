//! The live record of one run: messages interleaved with tool uses.
//!
//! A [`Scratchpad`] is owned by a single run and needs no synchronization.
//! Messages are append-only. Tool-use entries are append-only too, except
//! that the eviction policy may drop the oldest completed ones. At most one
//! tool use is in flight (started but not finished) at any time.

use super::budget::{DEFAULT_CHARS_PER_TOKEN, estimate_tokens_with};
use super::eviction::EVICTED_PREFIX;
use crate::error::ScratchpadError;
use crate::{Message, ToolCall};
use serde_json::Value;

/// How a tool use ended, or that it has not ended yet.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    InFlight,
    Result(String),
    Error(String),
}

impl ToolOutcome {
    pub fn is_in_flight(&self) -> bool {
        matches!(self, ToolOutcome::InFlight)
    }
}

/// One tool call and its outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolUseEntry {
    /// Provider-assigned call id, echoed back with the result.
    pub call_id: String,
    pub tool_name: String,
    /// Arguments as sent by the model (the raw string, when not valid JSON).
    pub arguments: Value,
    pub outcome: ToolOutcome,
    /// 1-based position among all tool uses of the run. Survives eviction.
    pub sequence_number: u32,
    /// Estimated tokens of the call and its outcome.
    pub approx_token_cost: usize,
}

impl ToolUseEntry {
    /// The two wire messages this entry stands for: the assistant's call and
    /// the tool's reply.
    pub fn to_messages(&self) -> [Message; 2] {
        let call = ToolCall::function(&self.call_id, &self.tool_name, arguments_string(&self.arguments));
        let reply = match &self.outcome {
            ToolOutcome::Result(result) => result.clone(),
            ToolOutcome::Error(error) => format!("Error: {error}"),
            ToolOutcome::InFlight => String::new(),
        };
        [
            Message::assistant_tool_calls(vec![call]),
            Message::tool_result(&self.call_id, reply),
        ]
    }
}

fn arguments_string(arguments: &Value) -> String {
    match arguments {
        Value::String(raw) => raw.clone(),
        other => other.to_string(),
    }
}

/// An item of the scratchpad, in run order.
#[derive(Debug, Clone, PartialEq)]
pub enum ScratchpadItem {
    Message(Message),
    ToolUse(ToolUseEntry),
}

/// In-order record of a run's messages and tool uses.
#[derive(Debug, Clone)]
pub struct Scratchpad {
    items: Vec<ScratchpadItem>,
    next_sequence: u32,
    evicted_total: usize,
    chars_per_token: f64,
}

impl Default for Scratchpad {
    fn default() -> Self {
        Self::new()
    }
}

impl Scratchpad {
    pub fn new() -> Self {
        Self::with_chars_per_token(DEFAULT_CHARS_PER_TOKEN)
    }

    pub fn with_chars_per_token(chars_per_token: f64) -> Self {
        Self {
            items: Vec::new(),
            next_sequence: 1,
            evicted_total: 0,
            chars_per_token,
        }
    }

    /// Append a user, assistant or system message.
    pub fn push_message(&mut self, message: Message) {
        self.items.push(ScratchpadItem::Message(message));
    }

    /// Record the start of a tool call. Fails if another call is still in
    /// flight. Returns the entry's sequence number.
    pub fn start_tool_use(
        &mut self,
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        arguments: &str,
    ) -> Result<u32, ScratchpadError> {
        if let Some(pending) = self.in_flight() {
            return Err(ScratchpadError::ToolInFlight(pending.tool_name.clone()));
        }
        let sequence_number = self.next_sequence;
        self.next_sequence += 1;
        self.items.push(ScratchpadItem::ToolUse(ToolUseEntry {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            arguments: parse_arguments(arguments),
            outcome: ToolOutcome::InFlight,
            sequence_number,
            approx_token_cost: estimate_tokens_with(arguments, self.chars_per_token),
        }));
        Ok(sequence_number)
    }

    /// Terminate the in-flight tool call with its result or error.
    pub fn finish_tool_use(
        &mut self,
        outcome: Result<String, String>,
    ) -> Result<&ToolUseEntry, ScratchpadError> {
        let chars_per_token = self.chars_per_token;
        let entry = self
            .items
            .iter_mut()
            .rev()
            .find_map(|item| match item {
                ScratchpadItem::ToolUse(e) if e.outcome.is_in_flight() => Some(e),
                _ => None,
            })
            .ok_or(ScratchpadError::NoToolInFlight)?;

        let text = match &outcome {
            Ok(result) | Err(result) => result.as_str(),
        };
        entry.approx_token_cost += estimate_tokens_with(text, chars_per_token);
        entry.outcome = match outcome {
            Ok(result) => ToolOutcome::Result(result),
            Err(error) => ToolOutcome::Error(error),
        };
        Ok(entry)
    }

    /// The unterminated tool use, if any.
    pub fn in_flight(&self) -> Option<&ToolUseEntry> {
        self.tool_uses().find(|e| e.outcome.is_in_flight())
    }

    /// All items in run order.
    pub fn items(&self) -> &[ScratchpadItem] {
        &self.items
    }

    /// Tool-use entries still held, oldest first.
    pub fn tool_uses(&self) -> impl Iterator<Item = &ToolUseEntry> {
        self.items.iter().filter_map(|item| match item {
            ScratchpadItem::ToolUse(e) => Some(e),
            ScratchpadItem::Message(_) => None,
        })
    }

    /// Messages held, oldest first.
    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.items.iter().filter_map(|item| match item {
            ScratchpadItem::Message(m) => Some(m),
            ScratchpadItem::ToolUse(_) => None,
        })
    }

    /// Number of tool uses started so far, including evicted ones.
    pub fn tool_calls_made(&self) -> u32 {
        self.next_sequence - 1
    }

    /// Number of tool uses dropped by eviction so far.
    pub fn evicted_total(&self) -> usize {
        self.evicted_total
    }

    /// Estimated token cost of everything held (messages plus tool uses).
    pub fn estimated_tokens(&self) -> usize {
        self.items
            .iter()
            .map(|item| match item {
                ScratchpadItem::Message(m) => estimate_tokens_with(m.text(), self.chars_per_token),
                ScratchpadItem::ToolUse(e) => e.approx_token_cost,
            })
            .sum()
    }

    /// Drop the oldest completed tool uses so that at most `keep` remain.
    /// Messages and an in-flight call are never touched. Returns how many
    /// entries were removed.
    pub fn evict_oldest_tool_uses(&mut self, keep: usize) -> usize {
        let completed = self
            .tool_uses()
            .filter(|e| !e.outcome.is_in_flight())
            .count();
        let mut to_remove = completed.saturating_sub(keep);
        let removed = to_remove;

        self.items.retain(|item| match item {
            ScratchpadItem::ToolUse(e) if to_remove > 0 && !e.outcome.is_in_flight() => {
                to_remove -= 1;
                false
            }
            _ => true,
        });

        self.evicted_total += removed;
        removed
    }

    /// Render the conversation for a provider: the system prompt, a notice
    /// when earlier tool results were cleared, then every item in order.
    /// An in-flight tool use is omitted.
    pub fn to_messages(&self, system_prompt: &str) -> Vec<Message> {
        let mut out = Vec::with_capacity(self.items.len() * 2 + 2);
        out.push(Message::system(system_prompt));
        if self.evicted_total > 0 {
            out.push(Message::system(format!(
                "{EVICTED_PREFIX} {} earlier tool result(s) were removed to stay within the context budget.]",
                self.evicted_total
            )));
        }
        for item in &self.items {
            match item {
                ScratchpadItem::Message(m) => out.push(m.clone()),
                ScratchpadItem::ToolUse(e) if e.outcome.is_in_flight() => {}
                ScratchpadItem::ToolUse(e) => out.extend(e.to_messages()),
            }
        }
        out
    }
}

fn parse_arguments(arguments: &str) -> Value {
    if arguments.trim().is_empty() {
        return Value::Object(Default::default());
    }
    serde_json::from_str(arguments).unwrap_or_else(|_| Value::String(arguments.to_string()))
}

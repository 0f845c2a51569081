//! Chat history stores: who asked what, and what the agent answered.
//!
//! Both stores implement [`ChatHistory`], the capability the orchestrator
//! needs: record the query before a run starts, attach the answer when it
//! finishes, and replay prior turns into the next run.
//!
//! - [`InMemoryChatHistory`]: lives as long as a session; nothing persisted.
//! - [`LongTermChatHistory`]: a newest-first JSON document on disk
//!   (`<base>/messages/chat_history.json`) that survives restarts.

pub mod in_memory;
pub mod long_term;

pub use in_memory::InMemoryChatHistory;
pub use long_term::{ConversationEntry, LongTermChatHistory};

use crate::error::HistoryError;

/// A completed question/answer pair, replayed into later runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub query: String,
    pub answer: String,
}

/// Capability shared by every chat history store.
///
/// Stores are shared across tasks behind an `Arc`, so methods take `&self`
/// and implementations synchronize internally.
pub trait ChatHistory: Send + Sync {
    /// Record a new query. Called before the run starts, so interrupted and
    /// failed runs still leave their query behind.
    fn save_user_query(&self, query: &str) -> Result<(), HistoryError>;

    /// Attach `answer` to the most recently saved query. A no-op when no
    /// query has been saved.
    fn save_answer(&self, answer: &str) -> Result<(), HistoryError>;

    /// Every saved query, newest first.
    fn message_strings(&self) -> Vec<String>;

    /// Up to `limit` of the most recent answered turns, oldest first.
    fn recent_turns(&self, limit: usize) -> Vec<Turn>;
}

//! Persisted, cross-session chat history.
//!
//! One JSON document holds every conversation entry, newest first:
//!
//! ```text
//! <base>/
//!   messages/
//!     chat_history.json
//! ```
//!
//! Every mutation rewrites the whole document atomically (temp file, then
//! rename). A document that fails to parse is treated as empty rather than
//! as an error, so a corrupted file never blocks the agent.

use super::{ChatHistory, Turn};
use crate::error::HistoryError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

/// Default base directory for persisted state.
pub const DEFAULT_BASE_DIR: &str = ".dexter";

const HISTORY_FILE: &str = "chat_history.json";

/// One persisted question and its answer.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationEntry {
    pub user_message: String,
    /// `None` while the run answering this message is still in progress.
    pub agent_response: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct State {
    entries: Vec<ConversationEntry>,
    loaded: bool,
}

/// Newest-first conversation log persisted to a JSON file.
///
/// Safe to share between concurrent runs. Each mutation holds an internal
/// lock while it updates memory and rewrites the file, so writes from
/// different runs interleave but never tear the document.
#[derive(Debug)]
pub struct LongTermChatHistory {
    path: PathBuf,
    state: Mutex<State>,
}

impl Default for LongTermChatHistory {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_DIR)
    }
}

impl LongTermChatHistory {
    /// A store rooted at `base_dir`. Nothing is read until [`load`](Self::load)
    /// or the first mutation.
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            path: base_dir.as_ref().join("messages").join(HISTORY_FILE),
            state: Mutex::new(State::default()),
        }
    }

    /// Path of the backing document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the backing document.
    ///
    /// A missing file is created empty. An unparsable file yields an empty
    /// history (the file itself is left alone until the next write).
    pub fn load(&self) -> Result<(), HistoryError> {
        let mut state = self.lock_state();
        self.load_into(&mut state)
    }

    /// Push a new entry with no answer onto the front and persist.
    pub fn add_user_message(&self, text: &str) -> Result<(), HistoryError> {
        let mut state = self.lock_state();
        self.ensure_loaded(&mut state)?;
        state.entries.insert(
            0,
            ConversationEntry {
                user_message: text.to_string(),
                agent_response: None,
                timestamp: Utc::now(),
            },
        );
        self.persist(&state.entries)
    }

    /// Set the answer of the most recent entry and persist. A no-op when the
    /// history is empty.
    pub fn update_agent_response(&self, text: &str) -> Result<(), HistoryError> {
        let mut state = self.lock_state();
        self.ensure_loaded(&mut state)?;
        let Some(latest) = state.entries.first_mut() else {
            debug!("No conversation entry to attach the response to");
            return Ok(());
        };
        latest.agent_response = Some(text.to_string());
        self.persist(&state.entries)
    }

    /// A copy of every entry, newest first.
    pub fn messages(&self) -> Vec<ConversationEntry> {
        self.lock_state().entries.clone()
    }

    /// User messages, newest first, with consecutive duplicates collapsed.
    /// Non-consecutive repeats are kept.
    pub fn message_strings(&self) -> Vec<String> {
        let state = self.lock_state();
        let mut out: Vec<String> = Vec::with_capacity(state.entries.len());
        for entry in &state.entries {
            if out.last() != Some(&entry.user_message) {
                out.push(entry.user_message.clone());
            }
        }
        out
    }

    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_loaded(&self, state: &mut State) -> Result<(), HistoryError> {
        if state.loaded {
            Ok(())
        } else {
            self.load_into(state)
        }
    }

    fn load_into(&self, state: &mut State) -> Result<(), HistoryError> {
        match std::fs::read_to_string(&self.path) {
            Ok(json) => {
                state.entries = match serde_json::from_str(&json) {
                    Ok(entries) => entries,
                    Err(e) => {
                        warn!(
                            "Ignoring malformed chat history at {}: {e}",
                            self.path.display()
                        );
                        Vec::new()
                    }
                };
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                state.entries = Vec::new();
                self.persist(&state.entries)?;
            }
            Err(e) => return Err(e.into()),
        }
        state.loaded = true;
        debug!(
            "Loaded {} chat history entries from {}",
            state.entries.len(),
            self.path.display()
        );
        Ok(())
    }

    /// Atomic write: serialize to a fresh temp file beside the document, then
    /// rename into place.
    fn persist(&self, entries: &[ConversationEntry]) -> Result<(), HistoryError> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;
        let json = serde_json::to_string_pretty(entries)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(json.as_bytes())?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}

impl ChatHistory for LongTermChatHistory {
    fn save_user_query(&self, query: &str) -> Result<(), HistoryError> {
        self.add_user_message(query)
    }

    fn save_answer(&self, answer: &str) -> Result<(), HistoryError> {
        self.update_agent_response(answer)
    }

    fn message_strings(&self) -> Vec<String> {
        LongTermChatHistory::message_strings(self)
    }

    fn recent_turns(&self, limit: usize) -> Vec<Turn> {
        let state = self.lock_state();
        let mut turns: Vec<Turn> = state
            .entries
            .iter()
            .filter_map(|e| {
                e.agent_response.as_ref().map(|answer| Turn {
                    query: e.user_message.clone(),
                    answer: answer.clone(),
                })
            })
            .take(limit)
            .collect();
        turns.reverse();
        turns
    }
}

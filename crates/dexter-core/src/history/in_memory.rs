//! Session-scoped chat history.

use super::{ChatHistory, Turn};
use crate::error::HistoryError;
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Clone)]
struct Exchange {
    query: String,
    answer: Option<String>,
}

/// Chat history held in memory for the lifetime of one session.
#[derive(Debug, Default)]
pub struct InMemoryChatHistory {
    exchanges: Mutex<Vec<Exchange>>,
}

impl InMemoryChatHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of saved queries.
    pub fn len(&self) -> usize {
        self.exchanges
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The answer attached to the most recent query, if any.
    pub fn last_answer(&self) -> Option<String> {
        self.exchanges
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .and_then(|e| e.answer.clone())
    }
}

impl ChatHistory for InMemoryChatHistory {
    fn save_user_query(&self, query: &str) -> Result<(), HistoryError> {
        self.exchanges
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Exchange {
                query: query.to_string(),
                answer: None,
            });
        Ok(())
    }

    fn save_answer(&self, answer: &str) -> Result<(), HistoryError> {
        if let Some(last) = self
            .exchanges
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last_mut()
        {
            last.answer = Some(answer.to_string());
        }
        Ok(())
    }

    fn message_strings(&self) -> Vec<String> {
        self.exchanges
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .rev()
            .map(|e| e.query.clone())
            .collect()
    }

    fn recent_turns(&self, limit: usize) -> Vec<Turn> {
        let exchanges = self.exchanges.lock().unwrap_or_else(PoisonError::into_inner);
        let mut turns: Vec<Turn> = exchanges
            .iter()
            .rev()
            .filter_map(|e| {
                e.answer.as_ref().map(|answer| Turn {
                    query: e.query.clone(),
                    answer: answer.clone(),
                })
            })
            .take(limit)
            .collect();
        turns.reverse();
        turns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answer_attaches_to_latest_query() {
        let history = InMemoryChatHistory::new();
        history.save_user_query("first").unwrap();
        history.save_answer("one").unwrap();
        history.save_user_query("second").unwrap();
        assert_eq!(history.last_answer(), None);

        history.save_answer("two").unwrap();
        assert_eq!(history.last_answer().as_deref(), Some("two"));
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn answer_without_query_is_noop() {
        let history = InMemoryChatHistory::new();
        history.save_answer("orphan").unwrap();
        assert!(history.is_empty());
    }

    #[test]
    fn message_strings_newest_first() {
        let history = InMemoryChatHistory::new();
        history.save_user_query("a").unwrap();
        history.save_user_query("b").unwrap();
        assert_eq!(history.message_strings(), vec!["b", "a"]);
    }

    #[test]
    fn recent_turns_skip_unanswered_and_respect_limit() {
        let history = InMemoryChatHistory::new();
        for (q, a) in [("q1", Some("a1")), ("q2", Some("a2")), ("q3", None), ("q4", Some("a4"))] {
            history.save_user_query(q).unwrap();
            if let Some(a) = a {
                history.save_answer(a).unwrap();
            }
        }

        let turns = history.recent_turns(2);
        let queries: Vec<&str> = turns.iter().map(|t| t.query.as_str()).collect();
        assert_eq!(queries, vec!["q2", "q4"]);
        assert_eq!(turns[1].answer, "a4");
    }
}

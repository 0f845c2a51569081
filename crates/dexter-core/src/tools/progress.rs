//! Per-call context handed to tool executors.
//!
//! A [`ToolContext`] carries the run's cancellation token and the sending
//! half of a progress channel. The orchestrator holds the receiving half and
//! relays every message as a `tool_progress` event, in order and unthrottled.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Receiving half of a progress channel.
pub type ProgressReceiver = mpsc::UnboundedReceiver<String>;

/// Create a progress channel for one tool invocation.
///
/// The channel is unbounded so that [`ToolContext::emit_progress`] never
/// blocks the executor. Backpressure is applied one level up, where the
/// orchestrator forwards each message into the bounded event stream.
pub fn progress_channel(cancel: CancellationToken) -> (ToolContext, ProgressReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        ToolContext {
            cancel,
            progress: Some(tx),
        },
        rx,
    )
}

/// Context shared with a tool executor for the duration of one call.
#[derive(Clone, Debug)]
pub struct ToolContext {
    cancel: CancellationToken,
    progress: Option<mpsc::UnboundedSender<String>>,
}

impl ToolContext {
    /// A context with no progress listener, e.g. for calling a tool outside
    /// of an agent run.
    pub fn detached(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            progress: None,
        }
    }

    /// Report progress. May be called any number of times before the
    /// executor returns. Messages sent after the run stopped listening are
    /// dropped.
    pub fn emit_progress(&self, message: impl Into<String>) {
        let message = message.into();
        trace!("[progress] {message}");
        if let Some(tx) = &self.progress {
            let _ = tx.send(message);
        }
    }

    /// The run's cancellation token. Long-running executors should check it
    /// (or `select!` on [`CancellationToken::cancelled`]) and bail out early.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Shorthand for `cancellation_token().is_cancelled()`.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn progress_messages_arrive_in_order() {
        let (ctx, mut rx) = progress_channel(CancellationToken::new());
        ctx.emit_progress("fetching");
        ctx.emit_progress("parsing");
        drop(ctx);

        assert_eq!(rx.recv().await.as_deref(), Some("fetching"));
        assert_eq!(rx.recv().await.as_deref(), Some("parsing"));
        assert_eq!(rx.recv().await, None);
    }

    #[test]
    fn detached_context_swallows_progress() {
        let ctx = ToolContext::detached(CancellationToken::new());
        ctx.emit_progress("nobody listens");
        assert!(!ctx.is_cancelled());
    }

    #[test]
    fn cancellation_is_visible_to_executor() {
        let token = CancellationToken::new();
        let (ctx, _rx) = progress_channel(token.clone());
        token.cancel();
        assert!(ctx.is_cancelled());
        assert!(ctx.cancellation_token().is_cancelled());
    }
}

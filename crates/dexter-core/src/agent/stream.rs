//! The consumer side of a run.
//!
//! [`EventStream`] is a single-pass [`Stream`] over a bounded channel. The
//! run suspends whenever the channel is full, so a slow consumer slows the
//! run down instead of piling up events. Dropping the stream cancels the
//! run.

use super::events::{AgentEvent, RunStatus};
use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::warn;

/// Events of one run, in order.
///
/// Ends after the terminal event, or without one when the run was
/// interrupted. [`status`](Self::status) tells the two apart.
#[derive(Debug)]
pub struct EventStream {
    events: mpsc::Receiver<AgentEvent>,
    status: watch::Receiver<RunStatus>,
    cancel: CancellationToken,
    _cancel_on_drop: DropGuard,
}

impl EventStream {
    pub(crate) fn new(
        events: mpsc::Receiver<AgentEvent>,
        status: watch::Receiver<RunStatus>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            events,
            status,
            _cancel_on_drop: cancel.clone().drop_guard(),
            cancel,
        }
    }

    /// Current status of the run. Final once the stream has ended.
    pub fn status(&self) -> RunStatus {
        *self.status.borrow()
    }

    /// Ask the run to stop. It ends at its next check without a terminal
    /// event.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// The run's cancellation token, e.g. to wire up Ctrl-C.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl Stream for EventStream {
    type Item = AgentEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<AgentEvent>> {
        self.events.poll_recv(cx)
    }
}

/// Cancel `cancel` once `timeout` elapses, unless `finished` fires first.
pub(crate) fn spawn_deadline(
    cancel: CancellationToken,
    finished: CancellationToken,
    timeout: Duration,
) {
    tokio::spawn(async move {
        tokio::select! {
            _ = finished.cancelled() => {}
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(timeout) => {
                warn!("[agent] run exceeded {:.0}s, cancelling", timeout.as_secs_f64());
                cancel.cancel();
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn stream(capacity: usize) -> (mpsc::Sender<AgentEvent>, watch::Sender<RunStatus>, EventStream) {
        let (tx, rx) = mpsc::channel(capacity);
        let (status_tx, status_rx) = watch::channel(RunStatus::Running);
        (tx, status_tx, EventStream::new(rx, status_rx, CancellationToken::new()))
    }

    #[tokio::test]
    async fn yields_events_then_ends() {
        let (tx, status_tx, mut events) = stream(4);
        tx.send(AgentEvent::Thinking).await.unwrap();
        tx.send(AgentEvent::AnswerStart).await.unwrap();
        status_tx.send_replace(RunStatus::Completed);
        drop(tx);

        assert_eq!(events.next().await, Some(AgentEvent::Thinking));
        assert_eq!(events.next().await, Some(AgentEvent::AnswerStart));
        assert_eq!(events.next().await, None);
        assert_eq!(events.status(), RunStatus::Completed);
    }

    #[tokio::test]
    async fn dropping_the_stream_cancels() {
        let (_tx, _status, events) = stream(1);
        let token = events.cancellation_token();
        assert!(!token.is_cancelled());
        drop(events);
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn deadline_cancels_token() {
        let cancel = CancellationToken::new();
        spawn_deadline(cancel.clone(), CancellationToken::new(), Duration::from_millis(10));
        tokio::time::timeout(Duration::from_secs(5), cancel.cancelled())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn finished_run_stops_deadline() {
        let cancel = CancellationToken::new();
        let finished = CancellationToken::new();
        spawn_deadline(cancel.clone(), finished.clone(), Duration::from_millis(50));
        finished.cancel();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!cancel.is_cancelled());
    }
}

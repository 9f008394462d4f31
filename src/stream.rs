//! One search session: request, streamed response, cancellation and timeout.
//!
//! The session runs on its own task. It moves through
//! [`SessionState::Connecting`], [`SessionState::Streaming`],
//! [`SessionState::Draining`] and finally [`SessionState::Closed`], and hands
//! decoded events to the consumer over a bounded channel. Every wait inside
//! the task is raced against the cancellation token and the session
//! deadline, and every exit path goes through [`SessionTask::run`], which
//! drops the response and publishes `Closed` exactly once.

use crate::error::SearchError;
use crate::protocol::StreamEvent;
use crate::sse::FrameDecoder;
use futures::{Stream, StreamExt};
use log::{debug, warn};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

pub type StreamItem = Result<StreamEvent, SearchError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Request sent, waiting for response headers.
    Connecting,
    /// Reading and decoding the response body.
    Streaming,
    /// Terminal event seen; remaining bytes are discarded.
    Draining,
    /// Connection released.
    Closed,
}

/// Live sequence of events for one search.
///
/// Yields `Ok(event)` in arrival order. The sequence ends after
/// `Ok(StreamEvent::Completed)`, after a single `Err`, when the server hangs
/// up, or silently once cancelled. Dropping the stream cancels the session.
pub struct SearchStream {
    rx: mpsc::Receiver<StreamItem>,
    cancel: CancellationToken,
    state: watch::Receiver<SessionState>,
    finished: bool,
}

impl SearchStream {
    /// Start a session on the current tokio runtime.
    pub(crate) fn spawn(
        request: reqwest::RequestBuilder,
        timeout: Duration,
        channel_capacity: usize,
    ) -> Self {
        let (tx, rx) = mpsc::channel(channel_capacity.max(1));
        let (state_tx, state_rx) = watch::channel(SessionState::Connecting);
        let cancel = CancellationToken::new();

        let started = Instant::now();
        let task = SessionTask {
            tx,
            cancel: cancel.clone(),
            state: state_tx,
            started,
            deadline: started + timeout,
            delivered: 0,
        };
        tokio::spawn(task.run(request));

        Self {
            rx,
            cancel,
            state: state_rx,
            finished: false,
        }
    }

    /// Stop the session. Idempotent; no error is reported for a cancelled search.
    pub fn cancel(&self) {
        if !self.cancel.is_cancelled() {
            debug!("Search cancelled by caller");
        }
        self.cancel.cancel();
    }

    /// Token that cancels this session from elsewhere, e.g. a cancel button.
    pub fn cancel_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Wait until the session has released its connection.
    pub async fn closed(&mut self) {
        let _ = self
            .state
            .wait_for(|state| *state == SessionState::Closed)
            .await;
    }

    #[cfg(test)]
    fn from_parts(rx: mpsc::Receiver<StreamItem>, state: watch::Receiver<SessionState>) -> Self {
        Self {
            rx,
            cancel: CancellationToken::new(),
            state,
            finished: false,
        }
    }
}

impl Stream for SearchStream {
    type Item = StreamItem;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished || self.cancel.is_cancelled() {
            return Poll::Ready(None);
        }

        match self.rx.poll_recv(cx) {
            Poll::Ready(Some(item)) => {
                let terminal = match &item {
                    Ok(event) => event.is_terminal(),
                    Err(_) => true,
                };
                if terminal {
                    self.finished = true;
                }
                Poll::Ready(Some(item))
            }
            Poll::Ready(None) => {
                self.finished = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for SearchStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// How the session ended.
enum Exit {
    Completed,
    Failed(SearchError),
    Cancelled,
    HungUp,
}

struct SessionTask {
    tx: mpsc::Sender<StreamItem>,
    cancel: CancellationToken,
    state: watch::Sender<SessionState>,
    started: Instant,
    deadline: Instant,
    delivered: usize,
}

impl SessionTask {
    async fn run(mut self, request: reqwest::RequestBuilder) {
        let exit = self.drive(request).await;
        // The response was owned by `drive`; the connection is gone by now.
        self.state.send_replace(SessionState::Closed);

        match exit {
            Exit::Completed => debug!("Search completed after {} events", self.delivered),
            Exit::Cancelled => debug!("Search session cancelled"),
            Exit::HungUp => warn!(
                "Server closed the stream without a terminal event after {} events",
                self.delivered
            ),
            Exit::Failed(err) => {
                debug!("Search failed: {} ({})", err, err.kind());
                // No deadline here: the error waits for the consumer to poll
                // or drop the stream, and dropping cancels.
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => {}
                    _ = self.tx.send(Err(err)) => {}
                }
            }
        }
    }

    async fn drive(&mut self, request: reqwest::RequestBuilder) -> Exit {
        self.state.send_replace(SessionState::Connecting);

        let response = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Exit::Cancelled,
            _ = sleep_until(self.deadline) => return self.timed_out(),
            response = request.send() => response,
        };
        let response = match response {
            Ok(response) => response,
            Err(e) => {
                return Exit::Failed(SearchError::Network {
                    message: e.to_string(),
                })
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Exit::Cancelled,
                _ = sleep_until(self.deadline) => return self.timed_out(),
                body = response.bytes() => body.map(|b| b.to_vec()).unwrap_or_default(),
            };
            return Exit::Failed(SearchError::from_rejection(status.as_u16(), &body));
        }

        self.state.send_replace(SessionState::Streaming);
        debug!("Streaming search response ({})", status);

        let mut body = Box::pin(response.bytes_stream());
        let mut decoder = FrameDecoder::new();

        loop {
            let chunk = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Exit::Cancelled,
                _ = sleep_until(self.deadline) => return self.timed_out(),
                chunk = body.next() => chunk,
            };

            match chunk {
                Some(Ok(bytes)) => {
                    for event in decoder.feed(&bytes) {
                        if let Some(exit) = self.dispatch(event).await {
                            decoder.clear();
                            return exit;
                        }
                    }
                }
                Some(Err(e)) => {
                    return Exit::Failed(SearchError::Network {
                        message: e.to_string(),
                    })
                }
                None => {
                    if let Some(event) = decoder.finish() {
                        if let Some(exit) = self.dispatch(event).await {
                            return exit;
                        }
                    }
                    return Exit::HungUp;
                }
            }
        }
    }

    /// Forward one decoded event. `Some` ends the session.
    async fn dispatch(&mut self, event: StreamEvent) -> Option<Exit> {
        match event {
            StreamEvent::Failed(failed) => {
                self.state.send_replace(SessionState::Draining);
                Some(Exit::Failed(SearchError::StreamError {
                    failed,
                    events_before: self.delivered,
                }))
            }
            StreamEvent::Completed(_) => {
                self.state.send_replace(SessionState::Draining);
                Some(match self.emit(Ok(event)).await {
                    Ok(()) => Exit::Completed,
                    Err(exit) => exit,
                })
            }
            event => {
                if matches!(event, StreamEvent::TaskStarted(_)) && self.delivered > 0 {
                    warn!("task-started arrived after {} other events", self.delivered);
                }
                self.emit(Ok(event)).await.err()
            }
        }
    }

    async fn emit(&mut self, item: StreamItem) -> Result<(), Exit> {
        if self.cancel.is_cancelled() {
            return Err(Exit::Cancelled);
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Exit::Cancelled),
            _ = sleep_until(self.deadline) => Err(self.timed_out()),
            sent = self.tx.send(item) => match sent {
                Ok(()) => {
                    self.delivered += 1;
                    Ok(())
                }
                // Receiver dropped without going through Drop's cancel.
                Err(_) => Err(Exit::Cancelled),
            },
        }
    }

    fn timed_out(&self) -> Exit {
        let elapsed_ms = self.started.elapsed().as_millis() as u64;
        warn!("Search timed out after {} ms", elapsed_ms);
        Exit::Failed(SearchError::Timeout { elapsed_ms })
    }
}

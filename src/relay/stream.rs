use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::decoder::FrameDecoder;
use super::persist::{persist_outcome, Persisted};
use super::{Accumulator, GenerationRequest, RelayDefaults, RelayOutcome, RelayStatus, StreamEvent};
use crate::auth::AuthUser;
use crate::store::RowStore;
use crate::upstream::{UpstreamClient, UpstreamError};

/// Lifecycle of one streaming relay run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Idle,
    Connecting,
    Streaming,
    Completed,
    Failed,
    Cancelled,
}

impl RelayState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RelayState::Completed | RelayState::Failed | RelayState::Cancelled)
    }

    pub fn can_enter(self, next: RelayState) -> bool {
        use RelayState::*;
        match (self, next) {
            (Idle, Connecting) => true,
            (Connecting, Streaming) | (Connecting, Failed) => true,
            (Streaming, Completed) | (Streaming, Failed) => true,
            (current, Cancelled) => !current.is_terminal(),
            _ => false,
        }
    }

    fn status(self) -> Option<RelayStatus> {
        match self {
            RelayState::Completed => Some(RelayStatus::Completed),
            RelayState::Failed => Some(RelayStatus::UpstreamError),
            RelayState::Cancelled => Some(RelayStatus::ClientCancelled),
            _ => None,
        }
    }
}

/// Single-writer bookkeeping for one run: current state plus the text delivered so far
struct Run {
    state: RelayState,
    text: Accumulator,
}

impl Run {
    fn new() -> Self {
        Self {
            state: RelayState::Idle,
            text: Accumulator::default(),
        }
    }

    fn enter(&mut self, next: RelayState) {
        debug_assert!(self.state.can_enter(next), "illegal relay transition {:?} -> {:?}", self.state, next);
        tracing::debug!(from = ?self.state, to = ?next, "relay transition");
        self.state = next;
    }

    /// Enter a terminal state and freeze the accumulated text
    fn finish(mut self, terminal: RelayState) -> RelayOutcome {
        self.enter(terminal);
        let status = terminal.status().unwrap_or(RelayStatus::UpstreamError);
        self.text.finish(status)
    }
}

enum Step {
    CallerGone,
    Event(Option<StreamEvent>),
}

/// Streams one generation to a caller, persisting the answer once it completes.
///
/// The caller side is an `mpsc` channel: the relay notices a dropped receiver at
/// its next suspension point and stops reading from the upstream.
#[derive(Clone)]
pub struct StreamRelay {
    upstream: Arc<dyn UpstreamClient>,
    store: Arc<dyn RowStore>,
    defaults: RelayDefaults,
}

impl StreamRelay {
    pub fn new(upstream: Arc<dyn UpstreamClient>, store: Arc<dyn RowStore>, defaults: RelayDefaults) -> Self {
        Self {
            upstream,
            store,
            defaults,
        }
    }

    pub async fn run(
        &self,
        request: GenerationRequest,
        owner: AuthUser,
        sink: mpsc::Sender<StreamEvent>,
    ) -> RelayOutcome {
        let mut run = Run::new();
        let body = request.to_body(&self.defaults, true);
        tracing::info!(user = %owner.id, provider = self.upstream.provider(), model = %body.model, "starting stream relay");

        run.enter(RelayState::Connecting);
        let timeout = self.defaults.timeout;
        let connection = tokio::select! {
            biased;
            _ = sink.closed() => return self.cancelled(run, &owner),
            result = tokio::time::timeout(timeout, self.upstream.open_stream(&body)) => {
                result.unwrap_or(Err(UpstreamError::Timeout(timeout)))
            }
        };

        match &connection {
            Ok(_) => run.enter(RelayState::Streaming),
            Err(e) => tracing::warn!(user = %owner.id, error = %e, "upstream rejected stream"),
        }
        let mut events = FrameDecoder::new(connection);

        loop {
            let step = tokio::select! {
                biased;
                _ = sink.closed() => Step::CallerGone,
                event = events.next() => Step::Event(event),
            };

            match step {
                Step::CallerGone => return self.cancelled(run, &owner),
                Step::Event(Some(StreamEvent::Token { text })) => {
                    if sink.send(StreamEvent::token(text.clone())).await.is_err() {
                        return self.cancelled(run, &owner);
                    }
                    run.text.push(&text);
                }
                Step::Event(Some(StreamEvent::End)) => {
                    if sink.send(StreamEvent::End).await.is_err() {
                        return self.cancelled(run, &owner);
                    }
                    // Close the caller's stream before touching the store
                    drop(sink);
                    drop(events);

                    let outcome = run.finish(RelayState::Completed);
                    tracing::info!(user = %owner.id, tokens = outcome.tokens(), chars = outcome.text().len(), "stream relay completed");
                    if persist_outcome(self.store.as_ref(), &owner, request.prompt(), &outcome).await == Persisted::Failed {
                        tracing::error!(user = %owner.id, "completed answer was not recorded in history");
                    }
                    return outcome;
                }
                Step::Event(Some(StreamEvent::Error { message })) => {
                    tracing::warn!(user = %owner.id, error = %message, "stream relay failed");
                    let _ = sink.send(StreamEvent::error(message)).await;
                    return run.finish(RelayState::Failed);
                }
                Step::Event(None) => {
                    // FrameDecoder always ends with End or Error; treat anything else as a failure
                    let _ = sink.send(StreamEvent::error("upstream stream ended unexpectedly")).await;
                    return run.finish(RelayState::Failed);
                }
            }
        }
    }

    fn cancelled(&self, run: Run, owner: &AuthUser) -> RelayOutcome {
        let delivered = run.text.tokens();
        tracing::info!(user = %owner.id, tokens = delivered, "caller went away, stream relay cancelled");
        run.finish(RelayState::Cancelled)
    }
}

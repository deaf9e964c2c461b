// handlers/protected/ai/stream.rs - POST /ai/stream (server-sent events)

use axum::{
    extract::{rejection::JsonRejection, State},
    response::sse::{Event, KeepAlive, Sse},
    Extension, Json,
};
use futures::Stream;
use std::convert::Infallible;
use tokio::sync::mpsc;

use super::generation_request;
use crate::app::AppState;
use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::relay::{GenerationPayload, StreamEvent, StreamRelay};

/// Events buffered between the relay task and the response body
const EVENT_BUFFER: usize = 32;

/// Stream a generation as `token`/`end`/`error` events.
///
/// The relay runs in its own task. When the client goes away axum drops the
/// response body, which drops the receiver and cancels the relay.
pub async fn stream(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    payload: Result<Json<GenerationPayload>, JsonRejection>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let request = generation_request(payload)?;
    let upstream = state.upstream()?;

    let relay = StreamRelay::new(upstream, state.store.clone(), state.relay_defaults());
    let (event_tx, mut event_rx) = mpsc::channel::<StreamEvent>(EVENT_BUFFER);

    tokio::spawn(async move {
        let outcome = relay.run(request, user, event_tx).await;
        tracing::debug!(status = ?outcome.status(), tokens = outcome.tokens(), "stream task finished");
    });

    let events = async_stream::stream! {
        while let Some(event) = event_rx.recv().await {
            yield Ok(to_sse(&event));
        }
    };

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

fn to_sse(event: &StreamEvent) -> Event {
    Event::default()
        .event(event.kind())
        .json_data(event)
        .unwrap_or_else(|e| {
            tracing::error!("failed to encode stream event: {}", e);
            Event::default().event("error").data(r#"{"kind":"error","message":"encoding failure"}"#)
        })
}

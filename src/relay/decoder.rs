use futures::Stream;
use serde::Deserialize;
use std::pin::Pin;
use std::task::{Context, Poll};

use super::StreamEvent;
use crate::upstream::{LineStream, UpstreamError};

/// Prefix of lines that carry a payload
pub const DATA_PREFIX: &str = "data:";

/// Payload marking the end of a completion stream
pub const DONE_SENTINEL: &str = "[DONE]";

/// Classification of one upstream line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Token(String),
    Done,
    Skip,
}

#[derive(Deserialize)]
struct ChunkFrame {
    #[serde(default)]
    choices: Option<Vec<ChunkChoice>>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<ChunkDelta>,
}

#[derive(Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Classify a single line. Anything that is not a well-formed data frame with a
/// non-empty `choices[0].delta.content` is skipped.
pub fn parse_frame(line: &str) -> Frame {
    let Some(data) = line.strip_prefix(DATA_PREFIX) else {
        return Frame::Skip;
    };
    let data = data.trim();

    if data == DONE_SENTINEL {
        return Frame::Done;
    }

    match serde_json::from_str::<ChunkFrame>(data) {
        Ok(chunk) => chunk
            .choices
            .and_then(|choices| choices.into_iter().next())
            .and_then(|choice| choice.delta)
            .and_then(|delta| delta.content)
            .filter(|content| !content.is_empty())
            .map(Frame::Token)
            .unwrap_or(Frame::Skip),
        Err(e) => {
            tracing::trace!(error = %e, "skipping undecodable frame");
            Frame::Skip
        }
    }
}

enum DecoderState {
    Rejected(UpstreamError),
    Reading(LineStream),
    Finished,
}

/// Turns an upstream connection into an ordered stream of [`StreamEvent`]s.
///
/// The stream always ends with exactly one `End` or `Error` event: `End` on the
/// done sentinel, `Error` when the connection was rejected, a read faulted, or
/// the input ran out before the sentinel. Nothing is read after the terminal event.
pub struct FrameDecoder {
    state: DecoderState,
}

impl FrameDecoder {
    pub fn new(connection: Result<LineStream, UpstreamError>) -> Self {
        let state = match connection {
            Ok(lines) => DecoderState::Reading(lines),
            Err(err) => DecoderState::Rejected(err),
        };
        Self { state }
    }
}

impl Stream for FrameDecoder {
    type Item = StreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match std::mem::replace(&mut self.state, DecoderState::Finished) {
                DecoderState::Finished => return Poll::Ready(None),
                DecoderState::Rejected(err) => {
                    return Poll::Ready(Some(StreamEvent::error(err.client_message())));
                }
                DecoderState::Reading(mut lines) => match lines.as_mut().poll_next(cx) {
                    Poll::Pending => {
                        self.state = DecoderState::Reading(lines);
                        return Poll::Pending;
                    }
                    Poll::Ready(Some(Ok(line))) => match parse_frame(&line) {
                        Frame::Skip => {
                            self.state = DecoderState::Reading(lines);
                        }
                        Frame::Token(text) => {
                            self.state = DecoderState::Reading(lines);
                            return Poll::Ready(Some(StreamEvent::Token { text }));
                        }
                        // `lines` is dropped here, releasing the connection
                        Frame::Done => return Poll::Ready(Some(StreamEvent::End)),
                    },
                    Poll::Ready(Some(Err(err))) => {
                        return Poll::Ready(Some(StreamEvent::error(err.client_message())));
                    }
                    Poll::Ready(None) => {
                        return Poll::Ready(Some(StreamEvent::error(
                            "upstream closed the stream before completion",
                        )));
                    }
                },
            }
        }
    }
}

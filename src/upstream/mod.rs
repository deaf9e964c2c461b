// upstream/mod.rs - Chat completion API seam
//
// The relay only needs two capabilities from a provider: a full response, and
// a stream of raw text lines. Provider differences (base URL, attribution
// headers) live behind `UpstreamClient`.

pub mod http;
pub mod lines;

use async_trait::async_trait;
use futures::Stream;
use serde::Serialize;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

pub use http::HttpUpstream;
pub use lines::LineDecoder;

/// Errors talking to the completion API
#[derive(Debug, Clone, Error)]
pub enum UpstreamError {
    /// Non-success status; `body` is the raw response text
    #[error("upstream returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("upstream did not respond within {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Transport(String),

    #[error("invalid upstream request: {0}")]
    InvalidRequest(String),
}

impl UpstreamError {
    /// Message forwarded to streaming callers: the upstream body when there is one
    pub fn client_message(&self) -> String {
        match self {
            UpstreamError::Status { body, .. } if !body.trim().is_empty() => body.clone(),
            other => other.to_string(),
        }
    }
}

/// Lines of an upstream response body, in arrival order
pub type LineStream = Pin<Box<dyn Stream<Item = Result<String, UpstreamError>> + Send>>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

/// Body of a `chat/completions` call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatCompletionBody {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f64,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub stream: bool,
}

#[async_trait]
pub trait UpstreamClient: Send + Sync {
    /// Single-shot call; returns the raw body of a success response
    async fn complete(&self, body: &ChatCompletionBody) -> Result<String, UpstreamError>;

    /// Streaming call; resolves once the response head arrived with a success status
    async fn open_stream(&self, body: &ChatCompletionBody) -> Result<LineStream, UpstreamError>;

    fn provider(&self) -> &str;
}

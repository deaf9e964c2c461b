// relay/mod.rs - Generation relay
//
// A request is validated into a `GenerationRequest`, shaped into an upstream
// chat completion body, and answered either in one piece (`SingleShotRelay`)
// or as an ordered stream of `StreamEvent`s (`StreamRelay`). Completed answers
// are written to the row store at most once.

pub mod decoder;
pub mod persist;
pub mod single_shot;
pub mod stream;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

use crate::config::{UpstreamConfig, MAX_OUTPUT_TOKENS, MIN_OUTPUT_TOKENS};
use crate::upstream::{ChatCompletionBody, ChatMessage};

pub use decoder::FrameDecoder;
pub use single_shot::{SingleShotAnswer, SingleShotRelay};
pub use stream::{RelayState, StreamRelay};

pub const DEFAULT_TEMPERATURE: f64 = 0.2;

/// Payload as received from callers; validated into [`GenerationRequest`]
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerationPayload {
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default, alias = "maxOutputTokens")]
    pub max_tokens: Option<i64>,
}

#[derive(Debug, Error)]
#[error("invalid generation request: {}", describe(.field_errors))]
pub struct ValidationError {
    pub field_errors: HashMap<String, String>,
}

fn describe(fields: &HashMap<String, String>) -> String {
    let mut parts: Vec<_> = fields.iter().map(|(k, v)| format!("{} {}", k, v)).collect();
    parts.sort();
    parts.join(", ")
}

/// Validated, immutable generation request
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    prompt: String,
    temperature: f64,
    model: Option<String>,
    max_tokens: Option<u32>,
}

impl GenerationRequest {
    pub fn new(
        prompt: impl Into<String>,
        temperature: Option<f64>,
        model: Option<String>,
        max_tokens: Option<i64>,
    ) -> Result<Self, ValidationError> {
        let prompt = prompt.into();
        let mut field_errors = HashMap::new();

        if prompt.is_empty() {
            field_errors.insert("prompt".to_string(), "must not be empty".to_string());
        }

        let temperature = temperature.unwrap_or(DEFAULT_TEMPERATURE);
        if !(0.0..=1.0).contains(&temperature) {
            field_errors.insert("temperature".to_string(), "must be between 0.0 and 1.0".to_string());
        }

        let max_tokens = match max_tokens {
            Some(n) if n < MIN_OUTPUT_TOKENS as i64 || n > MAX_OUTPUT_TOKENS as i64 => {
                field_errors.insert(
                    "max_tokens".to_string(),
                    format!("must be between {} and {}", MIN_OUTPUT_TOKENS, MAX_OUTPUT_TOKENS),
                );
                None
            }
            Some(n) => Some(n as u32),
            None => None,
        };

        if !field_errors.is_empty() {
            return Err(ValidationError { field_errors });
        }

        // A blank model means "use the default"
        let model = model.map(|m| m.trim().to_string()).filter(|m| !m.is_empty());

        Ok(Self {
            prompt,
            temperature,
            model,
            max_tokens,
        })
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn max_tokens(&self) -> Option<u32> {
        self.max_tokens
    }

    /// Shape the upstream call, filling omitted settings from `defaults`
    pub fn to_body(&self, defaults: &RelayDefaults, stream: bool) -> ChatCompletionBody {
        ChatCompletionBody {
            model: self.model.clone().unwrap_or_else(|| defaults.model.clone()),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: defaults.system_prompt.clone(),
                },
                ChatMessage {
                    role: "user",
                    content: self.prompt.clone(),
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens.unwrap_or(defaults.max_tokens),
            stream,
        }
    }
}

impl TryFrom<GenerationPayload> for GenerationRequest {
    type Error = ValidationError;

    fn try_from(payload: GenerationPayload) -> Result<Self, Self::Error> {
        GenerationRequest::new(
            payload.prompt.unwrap_or_default(),
            payload.temperature,
            payload.model,
            payload.max_tokens,
        )
    }
}

/// Server-side fallbacks applied when a request leaves settings out
#[derive(Debug, Clone)]
pub struct RelayDefaults {
    pub model: String,
    pub max_tokens: u32,
    pub system_prompt: String,
    /// Bound on connection setup and single-shot calls
    pub timeout: Duration,
}

impl From<&UpstreamConfig> for RelayDefaults {
    fn from(config: &UpstreamConfig) -> Self {
        Self {
            model: config.default_model.clone(),
            max_tokens: config.default_max_tokens,
            system_prompt: config.system_prompt.clone(),
            timeout: config.timeout(),
        }
    }
}

/// Normalized event forwarded to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StreamEvent {
    Token { text: String },
    End,
    Error { message: String },
}

impl StreamEvent {
    pub fn token(text: impl Into<String>) -> Self {
        StreamEvent::Token { text: text.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        StreamEvent::Error {
            message: message.into(),
        }
    }

    /// Event name used on the wire
    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::Token { .. } => "token",
            StreamEvent::End => "end",
            StreamEvent::Error { .. } => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RelayStatus {
    Completed,
    UpstreamError,
    ClientCancelled,
}

/// Final text of one relay run. Only produced by [`Accumulator::finish`], so it
/// cannot change once reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayOutcome {
    text: String,
    tokens: usize,
    status: RelayStatus,
}

impl RelayOutcome {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn tokens(&self) -> usize {
        self.tokens
    }

    pub fn status(&self) -> RelayStatus {
        self.status
    }

    /// Only fully completed, non-empty answers are worth keeping
    pub fn is_persistable(&self) -> bool {
        self.status == RelayStatus::Completed && !self.text.is_empty()
    }
}

/// Collects delivered token fragments in order
#[derive(Debug, Default)]
pub struct Accumulator {
    text: String,
    tokens: usize,
}

impl Accumulator {
    pub fn push(&mut self, fragment: &str) {
        self.text.push_str(fragment);
        self.tokens += 1;
    }

    pub fn tokens(&self) -> usize {
        self.tokens
    }

    pub fn finish(self, status: RelayStatus) -> RelayOutcome {
        RelayOutcome {
            text: self.text,
            tokens: self.tokens,
            status,
        }
    }
}

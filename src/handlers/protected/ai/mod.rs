// handlers/protected/ai/mod.rs - Generation endpoints

use axum::{extract::rejection::JsonRejection, Json};

use crate::error::ApiError;
use crate::relay::{GenerationPayload, GenerationRequest};

pub mod query;
pub mod stream;

pub use query::query;
pub use stream::stream;

/// Decode and validate a generation payload
fn generation_request(payload: Result<Json<GenerationPayload>, JsonRejection>) -> Result<GenerationRequest, ApiError> {
    let Json(payload) = payload.map_err(|e| ApiError::invalid_json(e.body_text()))?;
    Ok(GenerationRequest::try_from(payload)?)
}

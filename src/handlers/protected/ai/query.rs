// handlers/protected/ai/query.rs - POST /ai/query

use axum::{
    extract::{rejection::JsonRejection, State},
    Extension, Json,
};

use super::generation_request;
use crate::app::AppState;
use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::relay::{GenerationPayload, SingleShotAnswer, SingleShotRelay};

/// Answer a prompt in one response and record it in the caller's history
pub async fn query(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    payload: Result<Json<GenerationPayload>, JsonRejection>,
) -> Result<Json<SingleShotAnswer>, ApiError> {
    let request = generation_request(payload)?;
    let upstream = state.upstream()?;

    let relay = SingleShotRelay::new(upstream, state.store.clone(), state.relay_defaults());
    let answer = relay.run(&request, &user).await?;

    Ok(Json(answer))
}

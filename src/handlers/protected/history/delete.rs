// handlers/protected/history/delete.rs - DELETE /ai/history[/:id]

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde_json::{json, Value};

use crate::app::AppState;
use crate::auth::AuthUser;
use crate::error::ApiError;

pub async fn delete_all(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Value>, ApiError> {
    let count = state.store.delete_all(&user).await?;
    tracing::info!(user = %user.id, count, "cleared history");
    Ok(Json(json!({ "deleted": "all", "count": count })))
}

/// Idempotent: deleting an unknown or foreign id answers the same way
pub async fn delete_one(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let removed = state.store.delete_one(&user, &id).await?;
    tracing::info!(user = %user.id, id = %id, removed, "deleted history row");
    Ok(Json(json!({ "deleted": id })))
}

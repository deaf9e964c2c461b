// handlers/protected/history/list.rs - GET /ai/history

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    Extension, Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::app::AppState;
use crate::auth::AuthUser;
use crate::config::HistoryConfig;
use crate::error::ApiError;

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub limit: Option<u32>,
}

/// Newest first, at most `limit` rows
pub async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let limit = resolve_limit(query.limit, &state.config.history)?;

    let items = state.store.list(&user, Some(limit)).await?;
    tracing::debug!(user = %user.id, limit, count = items.len(), "listed history");

    Ok(Json(json!({ "items": items })))
}

fn resolve_limit(requested: Option<u32>, history: &HistoryConfig) -> Result<u32, ApiError> {
    let limit = requested.unwrap_or(history.default_limit);
    if limit == 0 || limit > history.max_limit {
        let mut field_errors = HashMap::new();
        field_errors.insert(
            "limit".to_string(),
            format!("must be between 1 and {}", history.max_limit),
        );
        return Err(ApiError::validation_error("Invalid history query", Some(field_errors)));
    }
    Ok(limit)
}

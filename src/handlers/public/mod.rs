// handlers/public/mod.rs - Public handlers (no authentication required)

use axum::{extract::State, http::StatusCode, response::Json};
use serde_json::{json, Value};

use crate::app::AppState;

/// GET /
pub async fn root() -> Json<Value> {
    Json(json!({
        "name": "prompt-relay",
        "version": env!("CARGO_PKG_VERSION"),
        "message": "Prompt relay API running",
        "endpoints": {
            "health": "/health, /ai/health-check (public)",
            "query": "POST /ai/query (bearer)",
            "stream": "POST /ai/stream (bearer, server-sent events)",
            "history": "GET|DELETE /ai/history, DELETE /ai/history/:id, GET /ai/history/export.{json,csv} (bearer)",
        }
    }))
}

/// GET /health - liveness plus row store reachability
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let now = chrono::Utc::now();
    let backend = state.store.backend();

    match state.store.health_check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "timestamp": now,
                "store": { "backend": backend, "status": "ok" }
            })),
        ),
        Err(e) => {
            tracing::warn!(backend, error = %e, "store health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "degraded",
                    "timestamp": now,
                    "store": { "backend": backend, "status": "unavailable" }
                })),
            )
        }
    }
}

/// GET /ai/health-check - whether the completion API is usable, and with which defaults
pub async fn ai_health_check(State(state): State<AppState>) -> Json<Value> {
    let upstream = &state.config.upstream;
    Json(json!({
        "ok": state.upstream.is_ok(),
        "provider": upstream.provider.as_str(),
        "default_model": upstream.default_model,
        "default_max_tokens": upstream.default_max_tokens,
    }))
}

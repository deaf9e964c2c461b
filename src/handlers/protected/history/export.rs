// handlers/protected/history/export.rs - GET /ai/history/export.{json,csv}

use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    Extension, Json,
};

use crate::app::AppState;
use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::store::QueryRecord;

const CSV_COLUMNS: [&str; 4] = ["id", "created_at", "prompt", "response"];

pub async fn export_json(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Response, ApiError> {
    let items = state.store.list(&user, None).await?;
    tracing::info!(user = %user.id, count = items.len(), "exported history as json");

    Ok((
        [(header::CONTENT_DISPOSITION, attachment("history.json"))],
        Json(items),
    )
        .into_response())
}

pub async fn export_csv(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Response, ApiError> {
    let items = state.store.list(&user, None).await?;
    let body = to_csv(&items).map_err(|e| {
        tracing::error!("failed to render history csv: {}", e);
        ApiError::internal_server_error("Failed to render export")
    })?;
    tracing::info!(user = %user.id, count = items.len(), "exported history as csv");

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, attachment("history.csv")),
        ],
        body,
    )
        .into_response())
}

fn attachment(filename: &str) -> String {
    format!("attachment; filename=\"{}\"", filename)
}

fn to_csv(items: &[QueryRecord]) -> anyhow::Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(CSV_COLUMNS)?;
    for item in items {
        writer.write_record([
            item.id.as_str(),
            item.created_at.to_rfc3339().as_str(),
            item.prompt.as_str(),
            item.response.as_str(),
        ])?;
    }
    let bytes = writer.into_inner().map_err(|e| anyhow::anyhow!("{}", e))?;
    Ok(String::from_utf8(bytes)?)
}

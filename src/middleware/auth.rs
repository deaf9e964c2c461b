use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};

use crate::app::AppState;
use crate::auth::{bearer_token, AuthUser};
use crate::error::ApiError;

/// Bearer authentication middleware: resolves the token through the configured
/// identity provider and injects [`AuthUser`] into the request
pub async fn require_user(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let identity = state.identity.clone().ok_or_else(|| {
        tracing::error!("Authenticated route hit but no identity provider is configured");
        ApiError::service_unavailable("Authentication is not configured")
    })?;

    let header = request
        .headers()
        .get(AUTHORIZATION)
        .map(|value| value.to_str().unwrap_or_default());
    let token = bearer_token(header)?.to_string();

    let id = identity.authenticate(&token).await?;
    tracing::debug!(user = %id, provider = identity.name(), "authenticated request");

    request.extensions_mut().insert(AuthUser { id, token });

    Ok(next.run(request).await)
}

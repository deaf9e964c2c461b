// HTTP API Error Types
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::auth::AuthError;
use crate::config::ConfigError;
use crate::relay::ValidationError;
use crate::store::StoreError;
use crate::upstream::UpstreamError;

/// HTTP API error with appropriate status codes and client-friendly messages
#[derive(Debug)]
pub enum ApiError {
    // 400 Bad Request
    BadRequest(String),
    ValidationError {
        message: String,
        field_errors: Option<HashMap<String, String>>,
    },
    InvalidJson(String),

    // 401 Unauthorized
    Unauthorized(String),

    // 404 Not Found
    NotFound(String),

    // 500 Internal Server Error
    InternalServerError(String),

    // 500, a required setting is absent
    ConfigMissing(String),

    // Upstream completion API answered with a non-success status; mirrored to the caller
    Upstream { status: u16, detail: String },

    // 502 Bad Gateway (upstream unreachable or faulted)
    BadGateway(String),

    // 503 Service Unavailable
    ServiceUnavailable(String),
}

impl ApiError {
    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::BadRequest(_) => 400,
            ApiError::ValidationError { .. } => 400,
            ApiError::InvalidJson(_) => 400,
            ApiError::Unauthorized(_) => 401,
            ApiError::NotFound(_) => 404,
            ApiError::InternalServerError(_) => 500,
            ApiError::ConfigMissing(_) => 500,
            ApiError::Upstream { status, .. } => *status,
            ApiError::BadGateway(_) => 502,
            ApiError::ServiceUnavailable(_) => 503,
        }
    }

    /// Get client-safe error message
    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg) => msg,
            ApiError::ValidationError { message, .. } => message,
            ApiError::InvalidJson(msg) => msg,
            ApiError::Unauthorized(msg) => msg,
            ApiError::NotFound(msg) => msg,
            ApiError::InternalServerError(msg) => msg,
            ApiError::ConfigMissing(msg) => msg,
            ApiError::Upstream { detail, .. } => detail,
            ApiError::BadGateway(msg) => msg,
            ApiError::ServiceUnavailable(msg) => msg,
        }
    }

    /// Short category shown in the `error` field
    pub fn category(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) | ApiError::InvalidJson(_) => "bad_request",
            ApiError::ValidationError { .. } => "validation_error",
            ApiError::Unauthorized(_) => "unauthorized",
            ApiError::NotFound(_) => "not_found",
            ApiError::InternalServerError(_) => "internal_error",
            ApiError::ConfigMissing(_) => "config_error",
            ApiError::Upstream { .. } | ApiError::BadGateway(_) => "upstream_error",
            ApiError::ServiceUnavailable(_) => "service_unavailable",
        }
    }

    /// Convert to JSON response body
    pub fn to_json(&self) -> Value {
        let mut response = json!({
            "error": self.category(),
            "detail": self.message(),
            "code": self.error_code()
        });

        if let ApiError::ValidationError {
            field_errors: Some(field_errors),
            ..
        } = self
        {
            response["field_errors"] = json!(field_errors);
        }

        response
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::ValidationError { .. } => "VALIDATION_ERROR",
            ApiError::InvalidJson(_) => "INVALID_JSON",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
            ApiError::ConfigMissing(_) => "CONFIG_ERROR",
            ApiError::Upstream { .. } => "UPSTREAM_ERROR",
            ApiError::BadGateway(_) => "BAD_GATEWAY",
            ApiError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
        }
    }
}

// Static constructor methods
impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn validation_error(
        message: impl Into<String>,
        field_errors: Option<HashMap<String, String>>,
    ) -> Self {
        ApiError::ValidationError {
            message: message.into(),
            field_errors,
        }
    }

    pub fn invalid_json(message: impl Into<String>) -> Self {
        ApiError::InvalidJson(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::Unauthorized(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        ApiError::InternalServerError(message.into())
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        ApiError::BadGateway(message.into())
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        ApiError::ServiceUnavailable(message.into())
    }
}

// Convert other error types to ApiError
impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        tracing::error!("Configuration error: {}", err);
        ApiError::ConfigMissing(err.to_string())
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Unavailable(msg) => {
                // Provider outage still reads as a failed login to the caller
                tracing::warn!("Identity provider unavailable: {}", msg);
                ApiError::unauthorized("Authentication failed")
            }
            other => ApiError::unauthorized(other.to_string()),
        }
    }
}

impl From<UpstreamError> for ApiError {
    fn from(err: UpstreamError) -> Self {
        match err {
            UpstreamError::Status { status, body } => ApiError::Upstream {
                status: if (400..=599).contains(&status) { status } else { 502 },
                detail: body,
            },
            UpstreamError::Timeout(after) => ApiError::bad_gateway(format!(
                "Upstream error: no response within {}s",
                after.as_secs()
            )),
            UpstreamError::Transport(msg) => ApiError::bad_gateway(format!("Upstream error: {}", msg)),
            UpstreamError::InvalidRequest(msg) => {
                tracing::error!("Failed to build upstream request: {}", msg);
                ApiError::internal_server_error("AI failure: could not build upstream request")
            }
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(msg) => {
                tracing::error!("Row store unavailable: {}", msg);
                ApiError::service_unavailable("History store temporarily unavailable")
            }
            StoreError::Rejected { status, body } => {
                tracing::error!("Row store rejected request ({}): {}", status, body);
                ApiError::internal_server_error("History request failed")
            }
            StoreError::Sqlx(sqlx_err) => {
                // Log the real error but return generic message
                tracing::error!("SQLx error: {}", sqlx_err);
                ApiError::internal_server_error("Database error occurred")
            }
            StoreError::Decode(msg) => {
                tracing::error!("Row store returned unexpected data: {}", msg);
                ApiError::internal_server_error("History request failed")
            }
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::validation_error("Invalid request payload", Some(err.field_errors))
    }
}

// Standard error trait implementations
impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ApiError {}

// Automatic HTTP response conversion for Axum
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_json())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_status_is_mirrored_with_body_as_detail() {
        let err: ApiError = UpstreamError::Status {
            status: 429,
            body: "rate limited".to_string(),
        }
        .into();
        assert_eq!(err.status_code(), 429);
        let body = err.to_json();
        assert_eq!(body["error"], "upstream_error");
        assert_eq!(body["detail"], "rate limited");
        assert_eq!(body["code"], "UPSTREAM_ERROR");
    }

    #[test]
    fn non_error_upstream_status_becomes_bad_gateway() {
        let err: ApiError = UpstreamError::Status {
            status: 302,
            body: String::new(),
        }
        .into();
        assert_eq!(err.status_code(), 502);
    }

    #[test]
    fn validation_errors_carry_field_errors() {
        let mut fields = HashMap::new();
        fields.insert("prompt".to_string(), "must not be empty".to_string());
        let body = ApiError::validation_error("Invalid request payload", Some(fields)).to_json();
        assert_eq!(body["code"], "VALIDATION_ERROR");
        assert_eq!(body["field_errors"]["prompt"], "must not be empty");
    }

    #[test]
    fn missing_credential_is_a_config_error() {
        let err: ApiError = ConfigError::MissingCredential("OPENROUTER_API_KEY").into();
        assert_eq!(err.status_code(), 500);
        assert_eq!(err.to_json()["detail"], "Server is missing OPENROUTER_API_KEY");
    }
}

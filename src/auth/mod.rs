// auth/mod.rs - Identity provider seam
//
// Bearer tokens are issued elsewhere (Supabase Auth). This service only resolves
// a token to a stable user id, either by asking the auth server or by verifying
// the token signature locally when the project JWT secret is configured.

pub mod jwt;
pub mod remote;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::config::IdentityConfig;

pub use jwt::{Claims, JwtIdentity};
pub use remote::RemoteIdentity;

/// Stable identifier of the owner of persisted rows
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Authenticated caller, injected into request extensions by the bearer middleware.
/// The raw token is kept so row-store calls can run under the caller's identity.
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub id: UserId,
    pub token: String,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing Authorization header")]
    MissingToken,

    #[error("Authorization header must use Bearer token format")]
    Malformed,

    #[error("Invalid or expired token")]
    Rejected,

    #[error("Identity provider unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolve a bearer token to the user it belongs to
    async fn authenticate(&self, token: &str) -> Result<UserId, AuthError>;

    fn name(&self) -> &'static str;
}

/// Pick an identity provider from configuration. Local verification wins when a
/// JWT secret is present; `None` means authenticated routes cannot be served.
pub fn from_config(config: &IdentityConfig) -> Option<Arc<dyn IdentityProvider>> {
    if let Some(secret) = &config.jwt_secret {
        return Some(Arc::new(JwtIdentity::new(secret, &config.jwt_audience)));
    }

    match (&config.supabase_url, &config.anon_key) {
        (Some(url), Some(key)) => match RemoteIdentity::new(url, key, config.timeout()) {
            Ok(provider) => Some(Arc::new(provider)),
            Err(e) => {
                tracing::error!("Cannot use SUPABASE_URL for authentication: {}", e);
                None
            }
        },
        _ => None,
    }
}

/// Pull the token out of an `Authorization: Bearer <token>` header value
pub fn bearer_token(header: Option<&str>) -> Result<&str, AuthError> {
    let value = header.ok_or(AuthError::MissingToken)?;
    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))
        .ok_or(AuthError::Malformed)?
        .trim();

    if token.is_empty() {
        return Err(AuthError::Malformed);
    }
    Ok(token)
}

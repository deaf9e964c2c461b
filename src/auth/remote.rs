use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

use super::{AuthError, IdentityProvider, UserId};

/// Asks the Supabase auth server who a token belongs to (`GET /auth/v1/user`)
pub struct RemoteIdentity {
    client: reqwest::Client,
    user_url: Url,
    anon_key: String,
}

#[derive(Deserialize)]
struct UserResponse {
    id: String,
}

impl RemoteIdentity {
    pub fn new(supabase_url: &str, anon_key: &str, timeout: Duration) -> Result<Self, String> {
        let user_url = Url::parse(supabase_url)
            .and_then(|base| base.join("/auth/v1/user"))
            .map_err(|e| e.to_string())?;
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .map_err(|e| format!("failed to build HTTP client: {}", e))?;

        Ok(Self {
            client,
            user_url,
            anon_key: anon_key.to_string(),
        })
    }
}

#[async_trait]
impl IdentityProvider for RemoteIdentity {
    async fn authenticate(&self, token: &str) -> Result<UserId, AuthError> {
        let response = self
            .client
            .get(self.user_url.clone())
            .bearer_auth(token)
            .header("apikey", &self.anon_key)
            .send()
            .await
            .map_err(|e| AuthError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            tracing::debug!("Auth server rejected token with status {}", response.status());
            return Err(AuthError::Rejected);
        }

        let user: UserResponse = response
            .json()
            .await
            .map_err(|e| AuthError::Unavailable(format!("unexpected user payload: {}", e)))?;

        Ok(UserId(user.id))
    }

    fn name(&self) -> &'static str {
        "supabase"
    }
}

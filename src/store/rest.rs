use async_trait::async_trait;
use reqwest::{RequestBuilder, Response};
use serde_json::json;
use std::time::Duration;
use url::Url;

use super::{NewQuery, QueryRecord, RowStore, StoreError};
use crate::auth::AuthUser;

const COLUMNS: &str = "id,prompt,response,created_at";

/// Supabase PostgREST backend. Requests carry the caller's own token so the
/// table's row-level security policies apply on top of the explicit owner filter.
pub struct RestStore {
    client: reqwest::Client,
    table_url: Url,
    health_url: Url,
    anon_key: String,
}

impl RestStore {
    pub fn new(supabase_url: &str, anon_key: &str, timeout: Duration) -> Result<Self, StoreError> {
        let base = Url::parse(supabase_url).map_err(|e| StoreError::Unavailable(format!("invalid SUPABASE_URL: {}", e)))?;
        let table_url = base
            .join("/rest/v1/queries")
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let health_url = base
            .join("/rest/v1/")
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::Unavailable(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            table_url,
            health_url,
            anon_key: anon_key.to_string(),
        })
    }

    fn request(&self, method: reqwest::Method, owner: &AuthUser) -> RequestBuilder {
        self.client
            .request(method, self.table_url.clone())
            .header("apikey", &self.anon_key)
            .bearer_auth(&owner.token)
    }

    async fn send(builder: RequestBuilder) -> Result<Response, StoreError> {
        let response = builder
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Rejected { status, body });
        }
        Ok(response)
    }

    async fn deleted_rows(response: Response) -> Result<u64, StoreError> {
        let rows: Vec<serde_json::Value> = response
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        Ok(rows.len() as u64)
    }
}

#[async_trait]
impl RowStore for RestStore {
    async fn insert(&self, owner: &AuthUser, row: NewQuery) -> Result<(), StoreError> {
        let builder = self
            .request(reqwest::Method::POST, owner)
            .header("Prefer", "return=minimal")
            .json(&json!({
                "user_id": owner.id,
                "prompt": row.prompt,
                "response": row.response,
            }));
        Self::send(builder).await?;
        Ok(())
    }

    async fn list(&self, owner: &AuthUser, limit: Option<u32>) -> Result<Vec<QueryRecord>, StoreError> {
        let mut params = vec![
            ("select", COLUMNS.to_string()),
            ("user_id", format!("eq.{}", owner.id)),
            ("order", "created_at.desc".to_string()),
        ];
        if let Some(limit) = limit {
            params.push(("limit", limit.to_string()));
        }

        let response = Self::send(self.request(reqwest::Method::GET, owner).query(&params)).await?;
        response
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))
    }

    async fn delete_all(&self, owner: &AuthUser) -> Result<u64, StoreError> {
        let builder = self
            .request(reqwest::Method::DELETE, owner)
            .header("Prefer", "return=representation")
            .query(&[("user_id", format!("eq.{}", owner.id))]);
        Self::deleted_rows(Self::send(builder).await?).await
    }

    async fn delete_one(&self, owner: &AuthUser, id: &str) -> Result<bool, StoreError> {
        let builder = self
            .request(reqwest::Method::DELETE, owner)
            .header("Prefer", "return=representation")
            .query(&[
                ("id", format!("eq.{}", id)),
                ("user_id", format!("eq.{}", owner.id)),
            ]);
        Ok(Self::deleted_rows(Self::send(builder).await?).await? > 0)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        let response = self
            .client
            .get(self.health_url.clone())
            .header("apikey", &self.anon_key)
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        // Any answer from PostgREST means it is reachable
        if response.status().is_server_error() {
            return Err(StoreError::Rejected {
                status: response.status().as_u16(),
                body: String::new(),
            });
        }
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "rest"
    }
}

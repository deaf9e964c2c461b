// store/mod.rs - Owner-scoped access to the `queries` table
//
// Every operation takes the authenticated caller; no backend ever reads or
// deletes rows belonging to another user.

pub mod memory;
pub mod postgres;
pub mod rest;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::auth::AuthUser;
use crate::config::{AppConfig, StoreBackend};

pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use rest::RestStore;

/// Errors from row store backends
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store rejected request with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Unexpected store payload: {0}")]
    Decode(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// One persisted prompt/answer pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct QueryRecord {
    #[serde(deserialize_with = "id_as_string")]
    pub id: String,
    pub prompt: String,
    #[serde(default)]
    pub response: String,
    pub created_at: DateTime<Utc>,
}

/// Row to insert for the current owner
#[derive(Debug, Clone, PartialEq)]
pub struct NewQuery {
    pub prompt: String,
    pub response: String,
}

#[async_trait]
pub trait RowStore: Send + Sync {
    async fn insert(&self, owner: &AuthUser, row: NewQuery) -> Result<(), StoreError>;

    /// Owner's rows, newest first
    async fn list(&self, owner: &AuthUser, limit: Option<u32>) -> Result<Vec<QueryRecord>, StoreError>;

    /// Returns how many rows were removed
    async fn delete_all(&self, owner: &AuthUser) -> Result<u64, StoreError>;

    /// Returns whether a row was removed
    async fn delete_one(&self, owner: &AuthUser, id: &str) -> Result<bool, StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;

    fn backend(&self) -> &'static str;
}

/// Build the configured backend. Postgres pools connect lazily, so this never blocks.
pub fn from_config(config: &AppConfig) -> Result<Arc<dyn RowStore>, StoreError> {
    match config.store_backend() {
        StoreBackend::Postgres => {
            let url = config
                .store
                .database_url
                .as_deref()
                .ok_or_else(|| StoreError::Unavailable("DATABASE_URL is not set".to_string()))?;
            Ok(Arc::new(PgStore::connect_lazy(url, config.store.max_connections)?))
        }
        StoreBackend::Rest => {
            let (Some(url), Some(key)) = (&config.identity.supabase_url, &config.identity.anon_key) else {
                return Err(StoreError::Unavailable(
                    "SUPABASE_URL and SUPABASE_ANON_KEY are required for the rest store".to_string(),
                ));
            };
            Ok(Arc::new(RestStore::new(url, key, config.identity.timeout())?))
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory history store; rows are lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

// PostgREST returns bigint ids as numbers and uuid ids as strings
fn id_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!("unsupported id value: {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_accepts_numeric_and_uuid_ids() {
        let numeric: QueryRecord = serde_json::from_str(
            r#"{"id": 42, "prompt": "p", "response": "r", "created_at": "2025-11-02T10:45:33.123456+00:00"}"#,
        )
        .unwrap();
        assert_eq!(numeric.id, "42");

        let uuid: QueryRecord = serde_json::from_str(
            r#"{"id": "7f1c0c3e-0000-4000-8000-000000000000", "prompt": "p", "created_at": "2025-11-02T10:45:33Z"}"#,
        )
        .unwrap();
        assert_eq!(uuid.response, "");
    }
}

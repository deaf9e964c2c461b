use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};

use super::{NewQuery, QueryRecord, RowStore, StoreError};
use crate::auth::AuthUser;

/// Direct Postgres access to the `queries` table
///
/// Expected schema:
/// ```sql
/// CREATE TABLE queries (
///     id uuid PRIMARY KEY DEFAULT gen_random_uuid(),
///     user_id uuid NOT NULL,
///     prompt text NOT NULL,
///     response text NOT NULL DEFAULT '',
///     created_at timestamptz NOT NULL DEFAULT now()
/// );
/// ```
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn connect_lazy(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_lazy(database_url)?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl RowStore for PgStore {
    async fn insert(&self, owner: &AuthUser, row: NewQuery) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO queries (user_id, prompt, response) VALUES ($1::uuid, $2, $3)")
            .bind(owner.id.as_str())
            .bind(&row.prompt)
            .bind(&row.response)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list(&self, owner: &AuthUser, limit: Option<u32>) -> Result<Vec<QueryRecord>, StoreError> {
        // LIMIT NULL means no limit in Postgres
        let records = sqlx::query_as::<_, QueryRecord>(
            r#"
            SELECT id::text AS id, prompt, response, created_at
            FROM queries
            WHERE user_id = $1::uuid
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(owner.id.as_str())
        .bind(limit.map(i64::from))
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    async fn delete_all(&self, owner: &AuthUser) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM queries WHERE user_id = $1::uuid")
            .bind(owner.id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_one(&self, owner: &AuthUser, id: &str) -> Result<bool, StoreError> {
        // Compare as text so a malformed id is simply "not found"
        let result = sqlx::query("DELETE FROM queries WHERE id::text = $1 AND user_id = $2::uuid")
            .bind(id)
            .bind(owner.id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{NewQuery, QueryRecord, RowStore, StoreError};
use crate::auth::{AuthUser, UserId};

/// Process-local store for development and tests
#[derive(Default)]
pub struct MemoryStore {
    rows: RwLock<Vec<(UserId, QueryRecord)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RowStore for MemoryStore {
    async fn insert(&self, owner: &AuthUser, row: NewQuery) -> Result<(), StoreError> {
        let record = QueryRecord {
            id: Uuid::new_v4().to_string(),
            prompt: row.prompt,
            response: row.response,
            created_at: Utc::now(),
        };
        self.rows.write().await.push((owner.id.clone(), record));
        Ok(())
    }

    async fn list(&self, owner: &AuthUser, limit: Option<u32>) -> Result<Vec<QueryRecord>, StoreError> {
        let rows = self.rows.read().await;
        // Insertion order is chronological, so reversing gives newest first
        let owned = rows
            .iter()
            .rev()
            .filter(|(id, _)| *id == owner.id)
            .map(|(_, record)| record.clone());

        Ok(match limit {
            Some(limit) => owned.take(limit as usize).collect(),
            None => owned.collect(),
        })
    }

    async fn delete_all(&self, owner: &AuthUser) -> Result<u64, StoreError> {
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|(id, _)| *id != owner.id);
        Ok((before - rows.len()) as u64)
    }

    async fn delete_one(&self, owner: &AuthUser, id: &str) -> Result<bool, StoreError> {
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|(owner_id, record)| !(*owner_id == owner.id && record.id == id));
        Ok(rows.len() != before)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str) -> AuthUser {
        AuthUser {
            id: UserId(id.to_string()),
            token: format!("token-{}", id),
        }
    }

    fn row(prompt: &str) -> NewQuery {
        NewQuery {
            prompt: prompt.to_string(),
            response: format!("answer to {}", prompt),
        }
    }

    #[tokio::test]
    async fn rows_are_scoped_to_their_owner() {
        let store = MemoryStore::new();
        let alice = user("alice");
        let bob = user("bob");

        store.insert(&alice, row("first")).await.unwrap();
        store.insert(&alice, row("second")).await.unwrap();
        store.insert(&bob, row("other")).await.unwrap();

        let listed = store.list(&alice, None).await.unwrap();
        let prompts: Vec<_> = listed.iter().map(|r| r.prompt.as_str()).collect();
        assert_eq!(prompts, vec!["second", "first"]);
        assert_eq!(store.list(&alice, Some(1)).await.unwrap().len(), 1);

        // Bob cannot delete Alice's row by id
        assert!(!store.delete_one(&bob, &listed[0].id).await.unwrap());
        assert!(store.delete_one(&alice, &listed[0].id).await.unwrap());

        assert_eq!(store.delete_all(&alice).await.unwrap(), 1);
        assert_eq!(store.list(&bob, None).await.unwrap().len(), 1);
    }
}

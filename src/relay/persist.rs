// Fire-and-forget persistence of finished answers.
//
// Store failures are logged and swallowed; they never reach the caller.

use crate::auth::AuthUser;
use crate::store::{NewQuery, RowStore};

use super::RelayOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persisted {
    Saved,
    Skipped,
    Failed,
}

/// Store a streamed outcome if, and only if, it completed with text
pub async fn persist_outcome(
    store: &dyn RowStore,
    owner: &AuthUser,
    prompt: &str,
    outcome: &RelayOutcome,
) -> Persisted {
    if !outcome.is_persistable() {
        tracing::debug!(user = %owner.id, status = ?outcome.status(), "not persisting relay outcome");
        return Persisted::Skipped;
    }
    save(store, owner, prompt, outcome.text()).await
}

/// Store one prompt/answer pair, swallowing failures
pub async fn save(store: &dyn RowStore, owner: &AuthUser, prompt: &str, answer: &str) -> Persisted {
    let row = NewQuery {
        prompt: prompt.to_string(),
        response: answer.to_string(),
    };

    match store.insert(owner, row).await {
        Ok(()) => {
            tracing::debug!(user = %owner.id, backend = store.backend(), "saved query");
            Persisted::Saved
        }
        Err(e) => {
            tracing::warn!(user = %owner.id, backend = store.backend(), error = %e, "failed to save query");
            Persisted::Failed
        }
    }
}

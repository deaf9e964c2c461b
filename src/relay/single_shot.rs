use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use super::persist;
use super::{GenerationRequest, RelayDefaults};
use crate::auth::AuthUser;
use crate::store::RowStore;
use crate::upstream::{UpstreamClient, UpstreamError};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SingleShotAnswer {
    pub answer: String,
    pub model: String,
}

/// Answers a generation request with one upstream call
#[derive(Clone)]
pub struct SingleShotRelay {
    upstream: Arc<dyn UpstreamClient>,
    store: Arc<dyn RowStore>,
    defaults: RelayDefaults,
}

impl SingleShotRelay {
    pub fn new(upstream: Arc<dyn UpstreamClient>, store: Arc<dyn RowStore>, defaults: RelayDefaults) -> Self {
        Self {
            upstream,
            store,
            defaults,
        }
    }

    pub async fn run(&self, request: &GenerationRequest, owner: &AuthUser) -> Result<SingleShotAnswer, UpstreamError> {
        let body = request.to_body(&self.defaults, false);
        let timeout = self.defaults.timeout;

        let raw = tokio::time::timeout(timeout, self.upstream.complete(&body))
            .await
            .unwrap_or(Err(UpstreamError::Timeout(timeout)))
            .map_err(|e| {
                tracing::warn!(user = %owner.id, provider = self.upstream.provider(), error = %e, "single-shot call failed");
                e
            })?;

        let answer = extract_answer(&raw);
        tracing::info!(user = %owner.id, model = %body.model, chars = answer.len(), "single-shot answered");

        // Success always leaves a history row, even for an empty answer
        persist::save(self.store.as_ref(), owner, request.prompt(), &answer).await;

        Ok(SingleShotAnswer {
            answer,
            model: body.model,
        })
    }
}

/// `choices[0].message.content` of a completion body, or empty when absent or unparseable
pub fn extract_answer(raw: &str) -> String {
    let Ok(value) = serde_json::from_str::<Value>(raw) else {
        tracing::debug!("single-shot body is not JSON");
        return String::new();
    };

    value
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

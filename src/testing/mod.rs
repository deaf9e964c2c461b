// Test doubles for the upstream and the row store

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::auth::{AuthUser, UserId};
use crate::relay::RelayDefaults;
use crate::store::{NewQuery, QueryRecord, RowStore, StoreError};
use crate::upstream::{ChatCompletionBody, LineStream, UpstreamClient, UpstreamError};

pub fn test_user(id: &str) -> AuthUser {
    AuthUser {
        id: UserId(id.to_string()),
        token: format!("token-{}", id),
    }
}

pub fn test_defaults() -> RelayDefaults {
    RelayDefaults {
        model: "openrouter/auto".to_string(),
        max_tokens: 512,
        system_prompt: "You are a helpful assistant.".to_string(),
        timeout: Duration::from_secs(5),
    }
}

/// Base URL of a server that accepts connections and never answers
pub async fn silent_server() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    format!("http://{}", addr)
}

/// One upstream data line carrying `text` as its delta
pub fn frame(text: &str) -> String {
    format!(
        "data: {}",
        serde_json::json!({"choices": [{"delta": {"content": text}}]})
    )
}

#[derive(Clone)]
enum Connect {
    Lines {
        items: Vec<Result<String, UpstreamError>>,
        hang: bool,
    },
    Reject(UpstreamError),
    Stall,
}

#[derive(Clone)]
enum Complete {
    Body(String),
    Reject(UpstreamError),
    Stall,
}

#[derive(Default)]
struct Shared {
    connects: AtomicUsize,
    live_streams: AtomicUsize,
    last_body: Mutex<Option<ChatCompletionBody>>,
}

struct LiveGuard(Arc<Shared>);

impl LiveGuard {
    fn new(shared: Arc<Shared>) -> Self {
        shared.live_streams.fetch_add(1, Ordering::SeqCst);
        Self(shared)
    }
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.live_streams.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Upstream that replays a fixed script
#[derive(Clone)]
pub struct ScriptedUpstream {
    connect: Connect,
    complete: Complete,
    shared: Arc<Shared>,
}

impl ScriptedUpstream {
    fn new(connect: Connect, complete: Complete) -> Self {
        Self {
            connect,
            complete,
            shared: Arc::default(),
        }
    }

    pub fn script(items: Vec<Result<String, UpstreamError>>) -> Self {
        Self::new(
            Connect::Lines { items, hang: false },
            Complete::Body(String::new()),
        )
    }

    pub fn lines(lines: Vec<String>) -> Self {
        Self::script(lines.into_iter().map(Ok).collect())
    }

    /// Sends `lines` and then keeps the connection open forever
    pub fn hanging(lines: Vec<String>) -> Self {
        Self::new(
            Connect::Lines {
                items: lines.into_iter().map(Ok).collect(),
                hang: true,
            },
            Complete::Stall,
        )
    }

    pub fn rejected(status: u16, body: &str) -> Self {
        let err = UpstreamError::Status {
            status,
            body: body.to_string(),
        };
        Self::new(Connect::Reject(err.clone()), Complete::Reject(err))
    }

    pub fn answer(body: &str) -> Self {
        Self::new(
            Connect::Lines {
                items: Vec::new(),
                hang: false,
            },
            Complete::Body(body.to_string()),
        )
    }

    pub fn stalled() -> Self {
        Self::new(
            Connect::Lines {
                items: Vec::new(),
                hang: true,
            },
            Complete::Stall,
        )
    }

    /// Never finishes opening the connection
    pub fn unreachable() -> Self {
        Self::new(Connect::Stall, Complete::Stall)
    }

    pub fn connects(&self) -> usize {
        self.shared.connects.load(Ordering::SeqCst)
    }

    /// True once every opened line stream has been dropped
    pub fn released(&self) -> bool {
        self.shared.live_streams.load(Ordering::SeqCst) == 0
    }

    pub fn last_body(&self) -> Option<ChatCompletionBody> {
        self.shared.last_body.lock().unwrap().clone()
    }

    fn record(&self, body: &ChatCompletionBody) {
        *self.shared.last_body.lock().unwrap() = Some(body.clone());
    }
}

#[async_trait]
impl UpstreamClient for ScriptedUpstream {
    async fn complete(&self, body: &ChatCompletionBody) -> Result<String, UpstreamError> {
        self.record(body);
        match &self.complete {
            Complete::Body(raw) => Ok(raw.clone()),
            Complete::Reject(err) => Err(err.clone()),
            Complete::Stall => futures::future::pending().await,
        }
    }

    async fn open_stream(&self, body: &ChatCompletionBody) -> Result<LineStream, UpstreamError> {
        self.record(body);
        self.shared.connects.fetch_add(1, Ordering::SeqCst);

        let (items, hang) = match &self.connect {
            Connect::Reject(err) => return Err(err.clone()),
            Connect::Stall => futures::future::pending().await,
            Connect::Lines { items, hang } => (items.clone(), *hang),
        };

        let guard = LiveGuard::new(self.shared.clone());
        Ok(Box::pin(async_stream::stream! {
            let _guard = guard;
            for item in items {
                yield item;
            }
            if hang {
                futures::future::pending::<()>().await;
            }
        }))
    }

    fn provider(&self) -> &str {
        "scripted"
    }
}

/// Row store that records inserts, optionally failing every write
#[derive(Default)]
pub struct RecordingStore {
    rows: Mutex<Vec<(UserId, NewQuery)>>,
    attempts: AtomicUsize,
    fail: bool,
    stall: bool,
}

impl RecordingStore {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Inserts are counted but never finish
    pub fn stalling() -> Self {
        Self {
            stall: true,
            ..Self::default()
        }
    }

    pub fn rows(&self) -> Vec<(UserId, NewQuery)> {
        self.rows.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RowStore for RecordingStore {
    async fn insert(&self, owner: &AuthUser, row: NewQuery) -> Result<(), StoreError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.stall {
            futures::future::pending::<()>().await;
        }
        if self.fail {
            return Err(StoreError::Unavailable("recording store set to fail".to_string()));
        }
        self.rows.lock().unwrap().push((owner.id.clone(), row));
        Ok(())
    }

    async fn list(&self, _owner: &AuthUser, _limit: Option<u32>) -> Result<Vec<QueryRecord>, StoreError> {
        Ok(Vec::new())
    }

    async fn delete_all(&self, _owner: &AuthUser) -> Result<u64, StoreError> {
        Ok(0)
    }

    async fn delete_one(&self, _owner: &AuthUser, _id: &str) -> Result<bool, StoreError> {
        Ok(false)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "recording"
    }
}

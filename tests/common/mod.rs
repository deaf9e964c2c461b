#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::post, Json, Router};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};

use prompt_relay::app::{router, AppState};
use prompt_relay::config::{AppConfig, StoreBackend};

pub const JWT_SECRET: &str = "integration-test-secret";

/// The real router served in-process on a free port
pub struct TestServer {
    pub base_url: String,
    pub client: reqwest::Client,
}

impl TestServer {
    pub async fn start(config: AppConfig) -> Result<Self> {
        let state = AppState::from_config(config).context("failed to build app state")?;
        let base_url = serve(router(state)).await?;
        Ok(Self {
            base_url,
            client: reqwest::Client::new(),
        })
    }

    /// Server whose upstream is `mock`
    pub async fn with_upstream(mock: &MockUpstream) -> Result<Self> {
        Self::start(test_config(Some(&mock.base_url))).await
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn get(&self, path: &str, user: &str) -> reqwest::RequestBuilder {
        self.client.get(self.url(path)).bearer_auth(token_for(user))
    }

    pub fn post(&self, path: &str, user: &str, body: Value) -> reqwest::RequestBuilder {
        self.client.post(self.url(path)).bearer_auth(token_for(user)).json(&body)
    }

    pub fn delete(&self, path: &str, user: &str) -> reqwest::RequestBuilder {
        self.client.delete(self.url(path)).bearer_auth(token_for(user))
    }

    pub async fn history(&self, user: &str) -> Result<Vec<Value>> {
        let res = self.get("/ai/history", user).send().await?;
        anyhow::ensure!(res.status() == reqwest::StatusCode::OK, "history failed: {}", res.status());
        let body: Value = res.json().await?;
        Ok(body["items"].as_array().cloned().unwrap_or_default())
    }

    /// History rows are written after the stream closes, so poll briefly for them
    pub async fn wait_for_history(&self, user: &str, expected: usize) -> Result<Vec<Value>> {
        for _ in 0..40 {
            let items = self.history(user).await?;
            if items.len() >= expected {
                return Ok(items);
            }
            tokio::time::sleep(std::time::Duration::from_millis(25)).await;
        }
        self.history(user).await
    }
}

async fn serve(app: Router) -> Result<String> {
    // Pick an unused port for isolation
    let port = portpicker::pick_unused_port().context("failed to pick free port")?;
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
        .await
        .with_context(|| format!("failed to bind port {}", port))?;

    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(format!("http://127.0.0.1:{}", port))
}

/// Development config with local JWT verification, the memory store, and an
/// upstream at `upstream_base` (no credential when `None`)
pub fn test_config(upstream_base: Option<&str>) -> AppConfig {
    let mut config = AppConfig::development();
    config.server.enable_request_logging = false;
    config.identity.jwt_secret = Some(JWT_SECRET.to_string());
    config.store.backend = Some(StoreBackend::Memory);
    config.upstream.timeout_secs = 5;
    if let Some(base) = upstream_base {
        config.upstream.api_key = Some("test-upstream-key".to_string());
        config.upstream.base_url = format!("{}/v1", base);
    }
    config
}

pub fn token_for(user: &str) -> String {
    token_with(user, JWT_SECRET, chrono::Utc::now().timestamp() + 3600)
}

pub fn token_with(user: &str, secret: &str, exp: i64) -> String {
    let claims = json!({
        "sub": user,
        "exp": exp,
        "aud": "authenticated",
        "role": "authenticated",
    });
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
        .expect("failed to sign test token")
}

/// Canned behaviour of the mock completion API
#[derive(Clone)]
pub enum MockReply {
    /// Streaming body: each entry is one line, separated by blank lines
    Sse(Vec<String>),
    Json(Value),
    Status(u16, String),
}

#[derive(Clone)]
struct MockState {
    reply: MockReply,
    requests: Arc<Mutex<Vec<Value>>>,
}

/// Mock OpenAI-compatible upstream serving `/v1/chat/completions`
pub struct MockUpstream {
    pub base_url: String,
    requests: Arc<Mutex<Vec<Value>>>,
}

impl MockUpstream {
    pub async fn start(reply: MockReply) -> Result<Self> {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let state = MockState {
            reply,
            requests: requests.clone(),
        };
        let app = Router::new()
            .route("/v1/chat/completions", post(completions))
            .with_state(state);
        let base_url = serve(app).await?;
        Ok(Self { base_url, requests })
    }

    pub fn requests(&self) -> Vec<Value> {
        self.requests.lock().unwrap().clone()
    }
}

async fn completions(State(state): State<MockState>, Json(body): Json<Value>) -> axum::response::Response {
    state.requests.lock().unwrap().push(body);

    match state.reply {
        MockReply::Sse(lines) => {
            let mut text = String::new();
            for line in lines {
                text.push_str(&line);
                text.push_str("\n\n");
            }
            ([(axum::http::header::CONTENT_TYPE, "text/event-stream")], text).into_response()
        }
        MockReply::Json(value) => Json(value).into_response(),
        MockReply::Status(status, body) => {
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, body).into_response()
        }
    }
}

/// One upstream data line carrying `text` as its delta
pub fn frame(text: &str) -> String {
    format!("data: {}", json!({"choices": [{"delta": {"content": text}}]}))
}

pub fn completion(answer: &str) -> Value {
    json!({
        "id": "chatcmpl-test",
        "choices": [{"index": 0, "message": {"role": "assistant", "content": answer}}]
    })
}

/// (event name, JSON data) pairs of a server-sent event body; comments are skipped
pub fn parse_sse(body: &str) -> Vec<(String, Value)> {
    let normalized = body.replace("\r\n", "\n");
    normalized
        .split("\n\n")
        .filter_map(|block| {
            let mut event = None;
            let mut data = String::new();
            for line in block.lines() {
                if let Some(name) = line.strip_prefix("event:") {
                    event = Some(name.trim().to_string());
                } else if let Some(chunk) = line.strip_prefix("data:") {
                    data.push_str(chunk.trim_start());
                }
            }
            let event = event?;
            let data = serde_json::from_str(&data).ok()?;
            Some((event, data))
        })
        .collect()
}

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use std::time::Duration;
use url::Url;

use super::lines::lines;
use super::{ChatCompletionBody, LineStream, UpstreamClient, UpstreamError};
use crate::config::{ConfigError, Provider, UpstreamConfig};

/// reqwest client for OpenAI-compatible `chat/completions` endpoints
pub struct HttpUpstream {
    client: reqwest::Client,
    provider: Provider,
    endpoint: Url,
    api_key: String,
    timeout: Duration,
}

impl HttpUpstream {
    /// Fails when the provider credential is absent; callers treat that as a
    /// startup configuration problem, not a per-request one
    pub fn new(config: &UpstreamConfig) -> Result<Self, ConfigError> {
        let api_key = config.credential()?.to_string();
        let endpoint = endpoint_url(&config.base_url)?;

        let client = reqwest::Client::builder()
            .connect_timeout(config.timeout())
            .default_headers(provider_headers(config))
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                key: "AI_BASE_URL",
                value: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            provider: config.provider,
            endpoint,
            api_key,
            timeout: config.timeout(),
        })
    }

    fn post(&self, body: &ChatCompletionBody) -> reqwest::RequestBuilder {
        self.client
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .json(body)
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, UpstreamError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(UpstreamError::Status {
            status: status.as_u16(),
            body,
        })
    }

    fn transport_error(&self, e: reqwest::Error) -> UpstreamError {
        if e.is_timeout() {
            UpstreamError::Timeout(self.timeout)
        } else {
            UpstreamError::Transport(format!("{} request failed: {}", self.provider.as_str(), e))
        }
    }
}

#[async_trait]
impl UpstreamClient for HttpUpstream {
    async fn complete(&self, body: &ChatCompletionBody) -> Result<String, UpstreamError> {
        let response = self
            .post(body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let response = Self::check_status(response).await?;
        response.text().await.map_err(|e| self.transport_error(e))
    }

    async fn open_stream(&self, body: &ChatCompletionBody) -> Result<LineStream, UpstreamError> {
        // No overall timeout here: the body is read for as long as the upstream keeps sending
        let response = self
            .post(body)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let response = Self::check_status(response).await?;
        tracing::debug!(provider = self.provider.as_str(), status = %response.status(), "upstream stream opened");
        Ok(lines(response.bytes_stream()))
    }

    fn provider(&self) -> &str {
        self.provider.as_str()
    }
}

fn endpoint_url(base_url: &str) -> Result<Url, ConfigError> {
    let invalid = |e: url::ParseError| ConfigError::InvalidValue {
        key: "AI_BASE_URL",
        value: format!("{} ({})", base_url, e),
    };

    // Url::join replaces the last segment unless the base ends with a slash
    let mut base = base_url.trim().to_string();
    if !base.ends_with('/') {
        base.push('/');
    }
    Url::parse(&base).and_then(|u| u.join("chat/completions")).map_err(invalid)
}

fn provider_headers(config: &UpstreamConfig) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if config.provider != Provider::OpenRouter {
        return headers;
    }

    // OpenRouter attribution headers
    let attribution = [("http-referer", &config.app_url), ("x-title", &config.app_name)];
    for (name, value) in attribution {
        if let Some(value) = value {
            match HeaderValue::from_str(value) {
                Ok(v) => {
                    headers.insert(name, v);
                }
                Err(_) => tracing::warn!("Ignoring {} header: value is not valid ASCII", name),
            }
        }
    }
    headers
}

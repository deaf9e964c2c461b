use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Smallest and largest output token ceiling a caller may request.
pub const MIN_OUTPUT_TOKENS: u32 = 32;
pub const MAX_OUTPUT_TOKENS: u32 = 4096;

const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

/// Startup-time configuration problems
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("Server is missing {0}")]
    MissingCredential(&'static str),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub identity: IdentityConfig,
    pub store: StoreConfig,
    pub history: HistoryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub enable_request_logging: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    OpenAi,
    OpenRouter,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::OpenRouter => "openrouter",
        }
    }

    /// Environment variable holding this provider's API key
    pub fn credential_var(&self) -> &'static str {
        match self {
            Provider::OpenAi => "OPENAI_API_KEY",
            Provider::OpenRouter => "OPENROUTER_API_KEY",
        }
    }

    fn default_base_url(&self) -> &'static str {
        match self {
            Provider::OpenAi => "https://api.openai.com/v1/",
            Provider::OpenRouter => "https://openrouter.ai/api/v1/",
        }
    }

    fn default_model(&self) -> &'static str {
        match self {
            Provider::OpenAi => "gpt-4o-mini",
            Provider::OpenRouter => "openrouter/auto",
        }
    }
}

impl std::str::FromStr for Provider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Provider::OpenAi),
            "openrouter" => Ok(Provider::OpenRouter),
            other => Err(ConfigError::InvalidValue {
                key: "AI_PROVIDER",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    pub provider: Provider,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub base_url: String,
    pub default_model: String,
    pub default_max_tokens: u32,
    pub timeout_secs: u64,
    pub system_prompt: String,
    pub app_url: Option<String>,
    pub app_name: Option<String>,
}

impl UpstreamConfig {
    /// Credential required by every AI endpoint
    pub fn credential(&self) -> Result<&str, ConfigError> {
        self.api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or(ConfigError::MissingCredential(self.provider.credential_var()))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    pub supabase_url: Option<String>,
    #[serde(skip_serializing)]
    pub anon_key: Option<String>,
    #[serde(skip_serializing)]
    pub jwt_secret: Option<String>,
    pub jwt_audience: String,
    /// Bound on every request to the Supabase auth and REST endpoints
    pub timeout_secs: u64,
}

impl IdentityConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Rest,
    Postgres,
    Memory,
}

impl std::str::FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rest" | "supabase" => Ok(StoreBackend::Rest),
            "postgres" | "pg" => Ok(StoreBackend::Postgres),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(ConfigError::InvalidValue {
                key: "STORE_BACKEND",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub backend: Option<StoreBackend>,
    #[serde(skip_serializing)]
    pub database_url: Option<String>,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    pub default_limit: u32,
    pub max_limit: u32,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Server overrides
        if let Some(port) = env::var("RELAY_API_PORT")
            .ok()
            .or_else(|| env::var("PORT").ok())
            .and_then(|s| s.parse().ok())
        {
            self.server.port = port;
        }
        if let Ok(v) = env::var("CORS_ORIGINS") {
            self.server.cors_origins = split_list(&v);
        }
        if let Ok(v) = env::var("API_ENABLE_REQUEST_LOGGING") {
            self.server.enable_request_logging = v.parse().unwrap_or(self.server.enable_request_logging);
        }

        // Upstream overrides
        if let Ok(v) = env::var("AI_PROVIDER") {
            match v.parse() {
                Ok(provider) => self.upstream = UpstreamConfig::for_provider(provider),
                Err(e) => tracing::warn!("{}; keeping {}", e, self.upstream.provider.as_str()),
            }
        }
        let provider = self.upstream.provider;
        self.upstream.api_key = non_empty_var(provider.credential_var())
            .or_else(|| non_empty_var(Provider::OpenRouter.credential_var()))
            .or_else(|| non_empty_var(Provider::OpenAi.credential_var()));
        if let Some(v) = non_empty_var("AI_BASE_URL") {
            self.upstream.base_url = v;
        }
        if let Some(v) = non_empty_var("AI_MODEL") {
            self.upstream.default_model = v;
        }
        if let Ok(v) = env::var("AI_MAX_TOKENS") {
            if let Ok(tokens) = v.parse::<u32>() {
                self.upstream.default_max_tokens = tokens.clamp(MIN_OUTPUT_TOKENS, MAX_OUTPUT_TOKENS);
            }
        }
        if let Ok(v) = env::var("AI_TIMEOUT_SECS") {
            self.upstream.timeout_secs = v.parse().unwrap_or(self.upstream.timeout_secs);
        }
        if let Some(v) = non_empty_var("AI_SYSTEM_PROMPT") {
            self.upstream.system_prompt = v;
        }
        self.upstream.app_url = non_empty_var("APP_URL").or(self.upstream.app_url.take());
        self.upstream.app_name = non_empty_var("APP_NAME").or(self.upstream.app_name.take());

        // Identity overrides
        self.identity.supabase_url = non_empty_var("SUPABASE_URL");
        self.identity.anon_key = non_empty_var("SUPABASE_ANON_KEY").or_else(|| non_empty_var("SUPABASE_KEY"));
        self.identity.jwt_secret = non_empty_var("SUPABASE_JWT_SECRET");
        if let Some(v) = non_empty_var("SUPABASE_JWT_AUDIENCE") {
            self.identity.jwt_audience = v;
        }
        if let Ok(v) = env::var("SUPABASE_TIMEOUT_SECS") {
            self.identity.timeout_secs = v.parse().unwrap_or(self.identity.timeout_secs);
        }

        // Store overrides
        if let Ok(v) = env::var("STORE_BACKEND") {
            match v.parse() {
                Ok(backend) => self.store.backend = Some(backend),
                Err(e) => tracing::warn!("{}; selecting backend automatically", e),
            }
        }
        self.store.database_url = non_empty_var("DATABASE_URL");
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.store.max_connections = v.parse().unwrap_or(self.store.max_connections);
        }

        self
    }

    /// Store backend in effect: explicit choice first, then whatever credentials are present
    pub fn store_backend(&self) -> StoreBackend {
        if let Some(backend) = self.store.backend {
            return backend;
        }
        if self.store.database_url.is_some() {
            StoreBackend::Postgres
        } else if self.identity.supabase_url.is_some() && self.identity.anon_key.is_some() {
            StoreBackend::Rest
        } else {
            StoreBackend::Memory
        }
    }

    pub fn development() -> Self {
        Self {
            environment: Environment::Development,
            server: ServerConfig {
                port: 8000,
                cors_origins: vec!["*".to_string()],
                enable_request_logging: true,
            },
            upstream: UpstreamConfig::for_provider(Provider::OpenRouter),
            identity: IdentityConfig::default(),
            store: StoreConfig {
                backend: None,
                database_url: None,
                max_connections: 5,
            },
            history: HistoryConfig {
                default_limit: 50,
                max_limit: 200,
            },
        }
    }

    fn staging() -> Self {
        let mut config = Self::development();
        config.environment = Environment::Staging;
        config.server.cors_origins = vec!["https://staging.example.com".to_string()];
        config.store.max_connections = 10;
        config
    }

    fn production() -> Self {
        let mut config = Self::development();
        config.environment = Environment::Production;
        config.server.cors_origins = vec!["https://app.example.com".to_string()];
        config.server.enable_request_logging = false;
        config.store.max_connections = 20;
        config
    }
}

impl UpstreamConfig {
    pub fn for_provider(provider: Provider) -> Self {
        Self {
            provider,
            api_key: None,
            base_url: provider.default_base_url().to_string(),
            default_model: provider.default_model().to_string(),
            default_max_tokens: 512,
            timeout_secs: 60,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            app_url: None,
            app_name: None,
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            supabase_url: None,
            anon_key: None,
            jwt_secret: None,
            jwt_audience: "authenticated".to_string(),
            timeout_secs: 10,
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_development_config() {
        let config = AppConfig::development();
        assert_eq!(config.upstream.provider, Provider::OpenRouter);
        assert_eq!(config.upstream.default_model, "openrouter/auto");
        assert_eq!(config.upstream.default_max_tokens, 512);
        assert_eq!(config.upstream.timeout_secs, 60);
        assert_eq!(config.history.max_limit, 200);
        assert_eq!(config.identity.timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_missing_credential_names_provider_variable() {
        let config = AppConfig::development();
        let err = config.upstream.credential().unwrap_err();
        assert_eq!(err.to_string(), "Server is missing OPENROUTER_API_KEY");

        let mut openai = UpstreamConfig::for_provider(Provider::OpenAi);
        openai.api_key = Some("   ".to_string());
        assert!(matches!(
            openai.credential(),
            Err(ConfigError::MissingCredential("OPENAI_API_KEY"))
        ));
    }

    #[test]
    fn test_store_backend_selection() {
        let mut config = AppConfig::development();
        assert_eq!(config.store_backend(), StoreBackend::Memory);

        config.identity.supabase_url = Some("https://x.supabase.co".to_string());
        config.identity.anon_key = Some("anon".to_string());
        assert_eq!(config.store_backend(), StoreBackend::Rest);

        config.store.database_url = Some("postgres://localhost/relay".to_string());
        assert_eq!(config.store_backend(), StoreBackend::Postgres);

        config.store.backend = Some(StoreBackend::Memory);
        assert_eq!(config.store_backend(), StoreBackend::Memory);
    }

    #[test]
    fn test_provider_parsing() {
        assert_eq!("OpenAI".parse::<Provider>().unwrap(), Provider::OpenAi);
        assert!("anthropic".parse::<Provider>().is_err());
        assert_eq!(" supabase ".parse::<StoreBackend>().unwrap(), StoreBackend::Rest);
    }
}

// app.rs - Shared state and route table

use axum::{
    http::HeaderValue,
    middleware,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::auth::{self, IdentityProvider};
use crate::config::{AppConfig, ConfigError, ServerConfig};
use crate::handlers::{protected, public};
use crate::middleware::require_user;
use crate::relay::RelayDefaults;
use crate::store::{self, RowStore, StoreError};
use crate::upstream::{HttpUpstream, UpstreamClient};

/// Everything a handler needs, cloned per request
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub identity: Option<Arc<dyn IdentityProvider>>,
    pub store: Arc<dyn RowStore>,
    /// `Err` keeps the startup reason so AI routes can report it per request
    pub upstream: Result<Arc<dyn UpstreamClient>, ConfigError>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        identity: Option<Arc<dyn IdentityProvider>>,
        store: Arc<dyn RowStore>,
        upstream: Result<Arc<dyn UpstreamClient>, ConfigError>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            identity,
            store,
            upstream,
        }
    }

    /// Wire up the configured identity provider, row store and upstream client
    pub fn from_config(config: AppConfig) -> Result<Self, StoreError> {
        let identity = auth::from_config(&config.identity);
        match &identity {
            Some(provider) => tracing::info!("Identity provider: {}", provider.name()),
            None => tracing::warn!("No identity provider configured; authenticated routes will answer 503"),
        }

        let store = store::from_config(&config)?;
        tracing::info!("Row store backend: {}", store.backend());

        let upstream = HttpUpstream::new(&config.upstream).map(|client| Arc::new(client) as Arc<dyn UpstreamClient>);
        match &upstream {
            Ok(client) => tracing::info!(
                provider = client.provider(),
                model = %config.upstream.default_model,
                "Upstream completion API configured"
            ),
            Err(e) => tracing::warn!("AI endpoints disabled: {}", e),
        }

        Ok(Self::new(config, identity, store, upstream))
    }

    pub fn upstream(&self) -> Result<Arc<dyn UpstreamClient>, ConfigError> {
        self.upstream.clone()
    }

    pub fn relay_defaults(&self) -> RelayDefaults {
        RelayDefaults::from(&self.config.upstream)
    }
}

pub fn router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.server);
    let request_logging = state.config.server.enable_request_logging;

    let router = Router::new()
        // Public
        .route("/", get(public::root))
        .route("/health", get(public::health))
        .route("/ai/health-check", get(public::ai_health_check))
        // Bearer-authenticated
        .merge(ai_routes(state.clone()))
        .merge(history_routes(state.clone()))
        .with_state(state)
        .layer(cors);

    if request_logging {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

fn ai_routes(state: AppState) -> Router<AppState> {
    use protected::ai;

    Router::new()
        .route("/ai/query", post(ai::query))
        .route("/ai/stream", post(ai::stream))
        .route_layer(middleware::from_fn_with_state(state, require_user))
}

fn history_routes(state: AppState) -> Router<AppState> {
    use protected::history;

    Router::new()
        .route("/ai/history", get(history::list).delete(history::delete_all))
        .route("/ai/history/export.json", get(history::export_json))
        .route("/ai/history/export.csv", get(history::export_csv))
        .route("/ai/history/:id", delete(history::delete_one))
        .route_layer(middleware::from_fn_with_state(state, require_user))
}

fn cors_layer(server: &ServerConfig) -> CorsLayer {
    if server.cors_origins.iter().any(|origin| origin == "*") {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = server
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin {:?}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

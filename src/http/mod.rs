//! HTTP boundary: lookup routes, stats and share codes.
//!
//! Handlers turn requests into [`Job`](crate::job::Job)s and hand them to
//! the [`InspectService`]; everything else here is middleware.

pub mod middleware;
pub mod routes;

use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use regex::Regex;
use tower_http::trace::TraceLayer;

use crate::config::{Config, RateLimitConfig, secrets::SecretString};
use crate::engine::InspectService;
use middleware::{apply_rate_limit, cors_layer, extract_client_ip};
use routes::{bulk_handler, inspect_handler, sharecode_handler, stats_handler};

const BODY_LIMIT: usize = 5 * 1024 * 1024;

/// Shared secrets clients may present.
#[derive(Default)]
pub struct Keys {
    pub price_key: Option<SecretString>,
    pub bulk_key: Option<SecretString>,
}

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<InspectService>,
    pub keys: Arc<Keys>,
}

impl AppState {
    pub fn new(service: Arc<InspectService>, keys: Keys) -> Self {
        Self {
            service,
            keys: Arc::new(keys),
        }
    }
}

/// Router-level settings that do not live in the handlers' state.
#[derive(Debug, Clone, Default)]
pub struct HttpOptions {
    pub trust_proxy: bool,
    pub allowed_origins: Vec<String>,
    pub allowed_regex_origins: Vec<Regex>,
    /// `None` disables rate limiting.
    pub rate_limit: Option<RateLimitConfig>,
}

impl HttpOptions {
    /// Origins were validated when the config loaded; a pattern that
    /// somehow fails to compile here is skipped.
    pub fn from_config(config: &Config) -> Self {
        Self {
            trust_proxy: config.trust_proxy,
            allowed_origins: config.allowed_origins.clone(),
            allowed_regex_origins: config
                .allowed_regex_origins
                .iter()
                .filter_map(|origin| Regex::new(origin).ok())
                .collect(),
            rate_limit: config
                .rate_limit
                .enable
                .then(|| config.rate_limit.clone()),
        }
    }
}

pub fn build_router(state: AppState, options: &HttpOptions) -> Router {
    let mut router = Router::new()
        .route("/", get(inspect_handler))
        .route("/bulk", post(bulk_handler))
        .route("/stats", get(stats_handler))
        .route("/sharecode/:code", get(sharecode_handler))
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .with_state(state);

    // Middleware layers (applied in reverse order - last added runs first)
    if let Some(rate_limit) = &options.rate_limit {
        router = apply_rate_limit(router, rate_limit, options.trust_proxy);
    }
    if let Some(cors) = cors_layer(
        options.allowed_origins.clone(),
        options.allowed_regex_origins.clone(),
    ) {
        router = router.layer(cors);
    }

    router
        .layer(axum::middleware::from_fn_with_state(
            options.trust_proxy,
            extract_client_ip,
        ))
        .layer(TraceLayer::new_for_http())
}

pub mod adapters;
pub mod cli;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod health;
pub mod middleware;
pub mod ports;
pub mod provider;
pub mod services;
pub mod utils;
pub mod validation;

use axum::{
    Router,
    http::HeaderValue,
    routing::{get, post},
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::middleware::request_logger::{request_logger_middleware, RequestLogConfig};
use crate::ports::TransactionStore;
use crate::provider::ProviderApi;
use crate::services::{
    NotificationBroker, Poller, Reconciler, SettlementEnricher, WebhookAdapter,
};

/// Deployment settings the running service needs.
#[derive(Debug, Clone)]
pub struct AppSettings {
    pub sender_name: String,
    pub webhook_secret: String,
    pub provider_timeout: Duration,
    pub keepalive: Duration,
    pub log_request_body: bool,
    pub allowed_origins: Vec<String>,
}

impl AppSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            sender_name: config.sender_name.clone(),
            webhook_secret: config.webhook_secret.clone(),
            provider_timeout: config.provider_timeout(),
            keepalive: config.keepalive(),
            log_request_body: config.log_request_body,
            allowed_origins: config.allowed_origins(),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn TransactionStore>,
    pub provider: Arc<dyn ProviderApi>,
    pub broker: Arc<NotificationBroker>,
    pub reconciler: Arc<Reconciler>,
    pub poller: Arc<Poller>,
    pub webhooks: Arc<WebhookAdapter>,
    pub keepalive: Duration,
    pub log_request_body: bool,
    pub allowed_origins: Vec<String>,
    pub start_time: Instant,
}

impl AppState {
    /// Wires the reconciliation core around one store, one provider and one broker.
    pub fn new(
        store: Arc<dyn TransactionStore>,
        provider: Arc<dyn ProviderApi>,
        settings: AppSettings,
    ) -> Self {
        let broker = Arc::new(NotificationBroker::new());
        let enricher = SettlementEnricher::new(provider.clone(), store.clone());
        let reconciler = Arc::new(Reconciler::new(
            store.clone(),
            broker.clone(),
            enricher,
            settings.sender_name,
        ));
        let poller = Arc::new(Poller::new(
            provider.clone(),
            reconciler.clone(),
            settings.provider_timeout,
        ));
        let webhooks = Arc::new(WebhookAdapter::new(
            provider.clone(),
            reconciler.clone(),
            settings.webhook_secret,
        ));

        Self {
            store,
            provider,
            broker,
            reconciler,
            poller,
            webhooks,
            keepalive: settings.keepalive,
            log_request_body: settings.log_request_body,
            allowed_origins: settings.allowed_origins,
            start_time: Instant::now(),
        }
    }
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if allowed_origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(origins)
}

pub fn create_app(state: AppState) -> Router {
    let log_config = RequestLogConfig {
        log_body: state.log_request_body,
    };
    let cors = cors_layer(&state.allowed_origins);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/webhooks/provider", post(handlers::webhook::provider_webhook))
        .route("/track/:code", get(handlers::tracking::get_tracking))
        .route("/track/:code/live", get(handlers::live::live_updates))
        .route("/track/:code/refresh", post(handlers::tracking::refresh))
        .route(
            "/track/:code/documents/settlement",
            get(handlers::tracking::settlement_document),
        )
        .layer(axum::middleware::from_fn_with_state(
            log_config,
            request_logger_middleware,
        ))
        .layer(cors)
        .with_state(state)
}

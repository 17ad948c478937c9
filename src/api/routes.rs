use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api::handlers::{ask, backend, AppState};
use crate::config::Config;
use crate::services::{BackendConnector, CachedGateway, GatewayError, InferenceGateway, QueryPipeline, RpcGateway};

/// Wire the gateway, connector and pipeline described by `config`
pub fn build_state(config: Config) -> Result<AppState, GatewayError> {
    let rpc: Arc<dyn InferenceGateway> = Arc::new(RpcGateway::new(&config.gateway)?);
    let gateway: Arc<dyn InferenceGateway> = if config.cache.enabled {
        tracing::info!(
            "Memoizing gateway calls ({} entries, {}s TTL)",
            config.cache.max_entries,
            config.cache.ttl_secs
        );
        Arc::new(CachedGateway::new(rpc, &config.cache))
    } else {
        rpc
    };

    let connector = Arc::new(BackendConnector::new(
        config.backends.clone(),
        Duration::from_secs(config.pipeline.query_timeout_secs),
    ));
    let pipeline = Arc::new(QueryPipeline::new(&config, gateway, connector));

    Ok(AppState {
        config: Arc::new(config),
        pipeline,
    })
}

/// Create router with application state
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/backends", get(backend::list_backends))
        .route("/api/backends/{kind}/check", post(backend::check_backend))
        .route("/api/questions", get(ask::list_questions))
        .route("/api/ask", post(ask::ask))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::json;
use std::sync::Arc;

use crate::api::middleware::AppError;
use crate::config::Config;
use crate::models::BackendKind;
use crate::services::{DialectAdapter, QueryPipeline};

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pipeline: Arc<QueryPipeline>,
}

/// List every backend with its configuration status
pub async fn list_backends(State(state): State<AppState>) -> Json<serde_json::Value> {
    let backends = state.pipeline.connector().backends();
    let default_backend = state.config.default_backend();

    let entries: Vec<serde_json::Value> = BackendKind::ALL
        .iter()
        .map(|&kind| {
            let missing: Vec<String> = backends
                .missing_settings(kind)
                .iter()
                .map(|s| format!("backends.{}.{}", kind.as_str(), s.key()))
                .collect();
            json!({
                "kind": kind,
                "name": kind.display_name(),
                "default": kind == default_backend,
                "configured": missing.is_empty(),
                "missing_settings": missing,
                "setup": DialectAdapter::setup_statements(kind, backends).unwrap_or_default(),
            })
        })
        .collect();

    Json(json!({ "backends": entries }))
}

/// Open a session, apply the dialect setup and run `SELECT 1`
pub async fn check_backend(
    State(state): State<AppState>,
    Path(kind): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let kind: BackendKind = kind.parse()?;
    tracing::info!("Checking {} backend", kind);

    state.pipeline.executor().ping(kind).await?;

    Ok(Json(json!({
        "backend": kind,
        "status": "ok",
    })))
}

use axum::{extract::State, Json};

use crate::api::handlers::backend::AppState;
use crate::api::middleware::AppError;
use crate::models::{Answer, AskRequest, BackendKind};

/// Suggested questions for the start of a session
pub async fn list_questions(State(state): State<AppState>) -> Json<serde_json::Value> {
    let questions = state.pipeline.suggested_questions().await;
    Json(serde_json::json!({ "questions": questions }))
}

/// Answer a natural language question against the selected backend
pub async fn ask(
    State(state): State<AppState>,
    Json(payload): Json<AskRequest>,
) -> Result<Json<Answer>, AppError> {
    let question = payload.question.trim();
    if question.is_empty() {
        return Err(AppError::Validation("Question cannot be empty".to_string()));
    }

    let backend = match payload.backend.as_deref() {
        Some(name) => name
            .parse::<BackendKind>()
            .map_err(|e| AppError::Validation(e.to_string()))?,
        None => state.config.default_backend(),
    };
    let options = payload
        .options
        .apply(state.config.pipeline.derivation_options());

    tracing::info!("Answering question against {}", backend);
    let answer = state.pipeline.ask(question, backend, options).await;

    Ok(Json(answer))
}

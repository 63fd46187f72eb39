//! Question answering and cancellation endpoints.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::core::errors::ApiError;
use crate::sessions::Turn;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub question: String,
}

pub async fn ask(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Json(payload): Json<AskRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if !state.sessions.exists(&session_id) {
        return Err(ApiError::NotFound("Session not found".to_string()));
    }
    let question = payload.question.trim();
    if question.is_empty() {
        return Err(ApiError::BadRequest("question must not be empty".to_string()));
    }

    // History as it stood before this question is the model's context.
    let history = state.sessions.load_history(&session_id);
    state
        .sessions
        .append_and_save(&session_id, Turn::user(question))?;

    let stop = state.stops.begin(&session_id);
    let outcome = state
        .pipeline
        .answer(&session_id, question, &history, &stop)
        .await;
    state.stops.finish(&session_id);

    state
        .sessions
        .append_and_save(&session_id, Turn::assistant(outcome.answer.clone()))?;

    let sources: Vec<Value> = outcome
        .sources
        .iter()
        .map(|sc| {
            json!({
                "source": sc.chunk.source,
                "content": sc.chunk.content,
                "score": sc.score,
            })
        })
        .collect();

    Ok(Json(json!({
        "answer": outcome.answer,
        "sources": sources,
        "grounded": outcome.grounded,
        "cancelled": outcome.cancelled,
    })))
}

pub async fn stop(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let stopped = state.stops.stop(&session_id);
    Ok(Json(json!({"stopped": stopped})))
}

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::core::errors::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub id: String,
}

pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let sessions = state.sessions.list_sessions();
    Ok(Json(json!({"sessions": sessions})))
}

pub async fn create_session(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateSessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state.sessions.create_session(&payload.id)?;
    Ok(Json(json!({"session": payload.id})))
}

pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.sessions.delete_session(&session_id)?;
    state.indexes.remove_session(&session_id).await;
    Ok(Json(json!({"success": true})))
}

pub async fn get_session_messages(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    if !state.sessions.exists(&session_id) {
        return Err(ApiError::NotFound("Session not found".to_string()));
    }

    let messages: Vec<Value> = state
        .sessions
        .load_history(&session_id)
        .into_iter()
        .map(|turn| {
            json!({
                "role": turn.role,
                "content": turn.content,
            })
        })
        .collect();

    Ok(Json(json!({"messages": messages})))
}

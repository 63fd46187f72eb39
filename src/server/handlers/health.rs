use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::state::AppState;

pub async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

pub async fn get_status(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let provider_reachable = state.provider.health_check().await.unwrap_or(false);
    let uptime_secs = (chrono::Utc::now() - state.started_at).num_seconds();

    Ok(Json(json!({
        "status": "ok",
        "uptime_secs": uptime_secs,
        "provider": {
            "name": state.provider.name(),
            "reachable": provider_reachable,
        },
        "sessions": state.sessions.list_sessions().len(),
    })))
}

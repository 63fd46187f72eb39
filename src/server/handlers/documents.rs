//! Document upload and indexing.
//!
//! Each file in the batch is processed independently: extraction, chunking
//! and indexing failures are reported per file and never abort the rest of
//! the batch.

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::core::config::IndexScope;
use crate::core::errors::ApiError;
use crate::loader::load_document;
use crate::rag::chunk_text;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct UploadRequest {
    /// Required when the index scope is per-session.
    pub session_id: Option<String>,
    pub files: Vec<PathBuf>,
}

pub async fn upload_documents(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<UploadRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if payload.files.is_empty() {
        return Err(ApiError::BadRequest("no files provided".to_string()));
    }

    let session_id = match (state.indexes.scope(), payload.session_id.as_deref()) {
        (IndexScope::PerSession, None) => {
            return Err(ApiError::BadRequest(
                "session_id is required with a per-session index".to_string(),
            ));
        }
        (_, Some(id)) if !state.sessions.exists(id) => {
            return Err(ApiError::NotFound(format!("session not found: {}", id)));
        }
        (_, id) => id.unwrap_or_default().to_string(),
    };

    let chunking = &state.settings.chunking;
    let mut results: Vec<Value> = Vec::new();

    for file in &payload.files {
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| file.to_string_lossy().to_string());

        let text = match load_document(file) {
            Ok(text) => text,
            Err(err) => {
                tracing::warn!("Failed to load {}: {}", file.display(), err);
                results.push(file_result(&name, "error", 0, &err.to_string()));
                continue;
            }
        };

        if text.trim().is_empty() {
            let err = ApiError::ExtractionEmpty(name.clone());
            results.push(file_result(&name, "skipped", 0, &err.to_string()));
            continue;
        }

        let chunks = match chunk_text(&text, &name, chunking.max_size, chunking.overlap) {
            Ok(chunks) => chunks,
            Err(err) => {
                tracing::warn!("Chunking failed for {}: {}", name, err);
                results.push(file_result(&name, "error", 0, &err.to_string()));
                continue;
            }
        };

        match state
            .indexes
            .ingest(&session_id, chunks, state.provider.as_ref())
            .await
        {
            Ok(count) => {
                tracing::info!("Indexed {} in {} chunks", name, count);
                results.push(file_result(&name, "indexed", count, ""));
            }
            Err(err) => {
                tracing::warn!("Indexing failed for {}: {}", name, err);
                results.push(file_result(&name, "error", 0, &err.to_string()));
            }
        }
    }

    Ok(Json(json!({"results": results})))
}

fn file_result(name: &str, status: &str, chunks: usize, message: &str) -> Value {
    json!({
        "file": name,
        "status": status,
        "chunks": chunks,
        "message": message,
    })
}

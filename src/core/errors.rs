use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unsupported file format: {0}")]
    UnsupportedFormat(String),
    #[error("no text extracted from {0}")]
    ExtractionEmpty(String),
    #[error("chunking produced no chunks")]
    ChunkingEmpty,
    #[error("embedding produced no vectors")]
    EmbeddingFailure,
    #[error("model call failed: {0}")]
    ModelCallFailure(String),
    #[error("session already exists: {0}")]
    DuplicateSession(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn internal<E: std::fmt::Display>(err: E) -> Self {
        ApiError::Internal(err.to_string())
    }

    pub fn model<E: std::fmt::Display>(err: E) -> Self {
        ApiError::ModelCallFailure(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            ApiError::UnsupportedFormat(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::ExtractionEmpty(_)
            | ApiError::ChunkingEmpty
            | ApiError::EmbeddingFailure => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::ModelCallFailure(_) => StatusCode::BAD_GATEWAY,
            ApiError::DuplicateSession(_) => StatusCode::CONFLICT,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

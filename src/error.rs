use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use photo_ingest::{PipelineError, QuotaExceeded, StoreError};
use serde_json::json;
use thiserror::Error;

/// Request-level failures, converted to a uniform JSON error envelope
/// at the response boundary.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("Invalid or missing admin credential")]
    Unauthorized,

    #[error("{0}")]
    NotFound(String),

    /// Record exists but the backing file is gone; distinct from NotFound
    /// so drift between database and content directory is visible.
    #[error("Photo file is missing from storage")]
    FileMissing,

    #[error("{0}")]
    StorageExceeded(String),

    /// Detail is logged, never sent to the client
    #[error("Internal server error")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) | ApiError::FileMissing => StatusCode::NOT_FOUND,
            ApiError::StorageExceeded(_) => StatusCode::INSUFFICIENT_STORAGE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        let message = match &self {
            ApiError::Internal(detail) => {
                log::error!("Internal error: {}", detail);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(json!({ "status": "error", "message": message }));
        (status, body).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(msg) => ApiError::NotFound(msg),
            StoreError::InvalidRecord(msg) => {
                ApiError::Internal(format!("Store rejected record: {}", msg))
            }
            StoreError::DuplicateFilename(name) => {
                ApiError::Internal(format!("Generated filename collided: {}", name))
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::InvalidFileType(msg) => ApiError::InvalidInput(msg),
            PipelineError::UnreadableDimensions(msg) => ApiError::InvalidInput(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<QuotaExceeded> for ApiError {
    fn from(err: QuotaExceeded) -> Self {
        ApiError::StorageExceeded(err.to_string())
    }
}

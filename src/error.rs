//! Error types for the Stash server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Application-wide result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Wire shape of every error body the server emits.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub generic: String,
    pub field: String,
    pub error: String,
}

impl ErrorBody {
    pub fn new(generic: &str, field: &str, error: impl Into<String>) -> Self {
        Self {
            generic: generic.to_string(),
            field: field.to_string(),
            error: error.into(),
        }
    }
}

/// Application error type for the outer shell (presentation, assets, media).
///
/// Engine errors live in [`crate::upload::UploadError`]; this type covers
/// everything around them. Both render the same [`ErrorBody`] wire shape,
/// and `IntoResponse` is the single catch point at the transport boundary:
/// internal faults become a generic 500 without leaking stream state.
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Upload(#[from] crate::upload::UploadError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            // engine errors carry their own status and wire code
            AppError::Upload(e) => return e.into_response(),
            AppError::NotFound(what) => (
                StatusCode::NOT_FOUND,
                ErrorBody::new("NOT_FOUND", "GENERIC", what),
            ),
            AppError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorBody::new("BAD_REQUEST", "GENERIC", msg),
            ),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody::new("INTERNAL_SERVER_ERROR", "GENERIC", "Internal server error"),
                )
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody::new("INTERNAL_SERVER_ERROR", "GENERIC", "Internal server error"),
                )
            }
            AppError::Io(e) => {
                tracing::error!("IO error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody::new("INTERNAL_SERVER_ERROR", "GENERIC", "Internal server error"),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

//! Error types and handling
//!
//! All errors surfaced to clients are converted to the wire format the
//! LexPortal frontend expects: a JSON body with a single `detail` field.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Application error types
#[derive(Debug, Error)]
pub enum AppError {
    /// Resource not found (404)
    #[error("{0}")]
    NotFound(String),

    /// Bad request - invalid input or a business-rule violation (400)
    #[error("{0}")]
    BadRequest(String),

    /// Unauthorized - authentication required (401)
    #[error("{0}")]
    Unauthorized(String),

    /// Forbidden - credentials present but not acceptable (403)
    #[error("{0}")]
    Forbidden(String),

    /// Too many requests - bans, violations, rate limits (429)
    #[error("{0}")]
    TooManyRequests(String),

    /// Internal server error (500)
    #[error("Internal error: {0}")]
    Internal(String),

    /// Database error (500)
    #[error("Database error: {0}")]
    Database(String),
}

/// Error response body
///
/// Matches the existing client contract: rejections carry a single
/// human-readable `detail` string stable enough for the UI to branch on.
#[derive(Serialize, Debug)]
pub struct ErrorDetail {
    pub detail: String,
}

impl ErrorDetail {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, should_log) = match &self {
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, false),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, false),
            AppError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, false),
            AppError::Forbidden(_) => (StatusCode::FORBIDDEN, false),
            AppError::TooManyRequests(_) => (StatusCode::TOO_MANY_REQUESTS, false),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, true),
            AppError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, true),
        };

        if should_log {
            error!(error = %self, "Request error");
        }

        // Internal faults never leak their message to the caller
        let detail = if status == StatusCode::INTERNAL_SERVER_ERROR {
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        (status, Json(ErrorDetail::new(detail))).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AppError::NotFound("Record not found".to_string()),
            _ => AppError::Database(err.to_string()),
        }
    }
}

/// Result type alias for handlers
pub type AppResult<T> = Result<T, AppError>;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::models::BookingStatus;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),

    #[error("{0}")]
    Validation(String),

    #[error("booking is {current}, cannot {action}")]
    StateConflict {
        current: BookingStatus,
        action: &'static str,
    },

    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("invalid {0}")]
    InvalidCode(&'static str),

    #[error("too many failed attempts, ask the provider to reissue the {0}")]
    CodeLocked(&'static str),

    #[error("{0} has expired, request a new one")]
    CodeExpired(&'static str),

    #[error("{0}")]
    TooManyRequests(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::StateConflict { .. } => StatusCode::CONFLICT,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::InvalidCode(_) => StatusCode::BAD_REQUEST,
            AppError::CodeLocked(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::CodeExpired(_) => StatusCode::BAD_REQUEST,
            AppError::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::AlreadyExists(_) => StatusCode::CONFLICT,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Storage details stay in the log.
        let message = match &self {
            AppError::Database(_) | AppError::Internal(_) => {
                tracing::error!(error = %self, "request failed");
                "internal server error".to_string()
            }
            _ => self.to_string(),
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

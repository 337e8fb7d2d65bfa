//! API error handling
//!
//! Every error leaves the service as `{"code": ..., "message": ...}`.
//! Internal details are logged, never echoed to the client.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use bookshelf_core::BookshelfError;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Message returned for every authentication failure
pub const UNAUTHORIZED_MESSAGE: &str = "Invalid or expired token";

/// Message returned when an authorization policy denies a request
pub const FORBIDDEN_MESSAGE: &str =
    "You don't have the necessary permissions to access this resource.";

/// API error response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// Error code
    pub code: String,
    /// Human-readable message
    pub message: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn not_found(resource: &str) -> Self {
        Self::new("NOT_FOUND", format!("{resource} not found"))
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new("BAD_REQUEST", message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden() -> Self {
        Self::new("FORBIDDEN", FORBIDDEN_MESSAGE)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    pub fn internal_error() -> Self {
        Self::new("INTERNAL_ERROR", "Internal server error")
    }
}

/// Application error type
#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    BadRequest(String),
    Unauthorized(String),
    Conflict(String),
    Internal(String),
    Database(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, ApiError::not_found(&msg)),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, ApiError::bad_request(msg)),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, ApiError::unauthorized(msg)),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, ApiError::conflict(msg)),
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, ApiError::internal_error())
            }
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiError::new("DATABASE_ERROR", "Database operation failed"),
                )
            }
        };

        (status, Json(error)).into_response()
    }
}

impl From<BookshelfError> for AppError {
    fn from(err: BookshelfError) -> Self {
        match err {
            BookshelfError::NotFound(msg) => AppError::NotFound(msg),
            BookshelfError::Conflict(msg) => AppError::Conflict(msg),
            BookshelfError::ValidationError(msg) => AppError::BadRequest(msg),
            BookshelfError::DatabaseError(msg) => AppError::Database(msg),
            BookshelfError::ConfigError(msg) => {
                AppError::Internal(format!("Configuration error: {msg}"))
            }
        }
    }
}

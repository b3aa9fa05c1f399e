//! Error types for the cache and budget layers
//!
//! Provides unified error handling using thiserror. Backend and store errors
//! never leave the public cache/budget surfaces; they are logged there and
//! turned into safe defaults. `AppError` is the HTTP-facing error.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// == Backend Error Enum ==
/// Errors raised by a key-value backend.
#[derive(Error, Debug)]
pub enum BackendError {
    /// Could not reach the backend
    #[error("Connection error: {0}")]
    Connection(String),

    /// The backend rejected or failed a command
    #[error("Command failed: {0}")]
    Command(String),

    /// A stored payload could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A key pattern could not be compiled
    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for BackendError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_connection_refusal() || err.is_connection_dropped() || err.is_timeout() {
            BackendError::Connection(err.to_string())
        } else {
            BackendError::Command(err.to_string())
        }
    }
}

// == Store Error Enum ==
/// Errors raised by a usage store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Database transport or query failure
    #[error("Database error: {0}")]
    Database(String),

    /// Budget configuration violates its invariants
    #[error("Invalid budget config: {0}")]
    InvalidConfig(String),
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::migrate::MigrateError> for StoreError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        StoreError::Database(err.to_string())
    }
}

// == App Error Enum ==
/// Error type for the operational HTTP surface.
#[derive(Error, Debug)]
pub enum AppError {
    /// Requested resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

// == IntoResponse Implementation ==
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

// == Result Type Aliases ==
/// Result type for key-value backend calls.
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Result type for usage store calls.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Result type for HTTP handlers.
pub type Result<T> = std::result::Result<T, AppError>;

//! Error types for invite-daemon

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use invite_tracker::TrackerError;
use serde::Serialize;
use thiserror::Error;

/// Daemon-level errors
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Server startup error
    #[error("Server error: {0}")]
    Server(String),

    /// Upstream client could not be built
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Tracker construction error
    #[error("Tracker error: {0}")]
    Tracker(#[from] TrackerError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// API-specific errors
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Missing or wrong API token
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The upstream platform could not be reached or refused the request
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// The service is shutting down
    #[error("Unavailable: {0}")]
    Unavailable(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<TrackerError> for ApiError {
    fn from(err: TrackerError) -> Self {
        match err {
            TrackerError::FetchFailed { .. } | TrackerError::Enumeration(_) => {
                ApiError::Upstream(err.to_string())
            }
            TrackerError::IngestorClosed(_) => ApiError::Unavailable(err.to_string()),
            TrackerError::Configuration(_) => ApiError::Internal(err.to_string()),
        }
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            ApiError::Upstream(_) => (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR"),
            ApiError::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        let body = ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for API operations
pub type ApiResult<T> = Result<T, ApiError>;

/// Result type alias for daemon operations
pub type DaemonResult<T> = Result<T, DaemonError>;

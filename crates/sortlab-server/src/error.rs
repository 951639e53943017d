//! Service error kinds and their HTTP mapping.

use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

/// Errors surfaced to HTTP callers. Every variant maps to exactly one
/// status code; bodies have the shape `{"error": "<message>"}`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed or out-of-bounds input. Never retried.
    #[error("{0}")]
    Validation(String),

    /// Missing or unrecognized API key. The body stays terse to avoid
    /// oracle side-channels.
    #[error("unauthorized")]
    Unauthorized,

    /// Token bucket empty; carries the refill hint in seconds.
    #[error("rate limited")]
    RateLimited { retry_after_secs: u64 },

    /// Too many jobs in `{pending, running}`.
    #[error("too many jobs")]
    Admission,

    /// The engine reported an internal failure.
    #[error("{0}")]
    Engine(String),

    /// Unknown job id.
    #[error("not found")]
    NotFound,

    /// The durable store is unavailable.
    #[error("storage error: {0}")]
    Storage(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Admission => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Engine(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::Storage(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({ "error": self.to_string() }));
        let mut response = (status, body).into_response();
        if let ApiError::RateLimited { retry_after_secs } = self {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

//! API error types and conversions

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::error::Error;
use crate::storage::StoreError;

/// API result type
pub type ApiResult<T> = Result<T, ApiError>;

/// Errors surfaced to API clients
#[derive(Debug)]
pub enum ApiError {
    /// Shared store unreachable or failing
    StoreUnavailable(String),

    /// Resource not found
    NotFound(String),

    /// Rate limiter refused the request
    TooManyRequests,

    /// Internal server error
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            ApiError::StoreUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::TooManyRequests => (
                StatusCode::TOO_MANY_REQUESTS,
                "rate limit exceeded".to_string(),
            ),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => ApiError::NotFound(what),
            other => ApiError::StoreUnavailable(other.to_string()),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        if let Some(Error::NotRunning(id)) = err.downcast_ref::<Error>() {
            return ApiError::NotFound(format!("no running alert loop for {id}"));
        }
        if err.downcast_ref::<StoreError>().is_some() {
            return ApiError::StoreUnavailable(err.to_string());
        }
        ApiError::Internal(err.to_string())
    }
}

//! Rate limiting middleware
//!
//! Keys every request by `[method, path, client ip]`. When the counter store
//! cannot be reached the request is let through and the failure logged.

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::api::{ApiError, ApiState};

pub async fn rate_limit_middleware(
    State(state): State<ApiState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let client = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let key = [
        request.method().as_str().to_string(),
        request.uri().path().to_string(),
        client,
    ];

    match state.limiter.accept_with(&key, &state.policy).await {
        Ok(true) => {}
        Ok(false) => return Err(ApiError::TooManyRequests),
        Err(e) => warn!("rate limiter unavailable, admitting request: {e}"),
    }

    Ok(next.run(request).await)
}

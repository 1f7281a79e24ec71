//! REST control surface of the hub
//!
//! Thin HTTP layer over the supervisor handle and the status store. Every
//! request passes the rate limiter first.
//!
//! ## Architecture
//!
//! - **Axum** web framework with Tower middleware
//! - **Supervisor handle** for reconcile and mute
//! - **Rate limiter** keyed by method, path and client address
//!
//! ## Endpoints
//!
//! - `GET /api/v1/health` - Health check
//! - `GET /api/v1/targets/:id/status` - Persisted status of one target
//! - `PUT /api/v1/targets/:id/mute` - Mute or unmute a running target
//! - `POST /api/v1/reconcile` - Reload configuration now

#[cfg(feature = "api")]
pub mod error;
#[cfg(feature = "api")]
pub mod middleware;
#[cfg(feature = "api")]
pub mod routes;
#[cfg(feature = "api")]
pub mod state;
#[cfg(feature = "api")]
pub mod types;

#[cfg(feature = "api")]
pub use error::{ApiError, ApiResult};
#[cfg(feature = "api")]
pub use state::ApiState;
#[cfg(feature = "api")]
pub use types::{HealthResponse, MuteRequest, MuteResponse, TargetStatusResponse};

#[cfg(feature = "api")]
use axum::{
    Router,
    routing::{get, post, put},
};
use serde::Deserialize;
use std::net::SocketAddr;
#[cfg(feature = "api")]
use tracing::info;

use crate::ratelimit::RateLimitPolicy;

/// API server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Bind address (e.g., "0.0.0.0:8080")
    #[serde(rename = "bind")]
    pub bind_addr: SocketAddr,

    /// Admission policy applied per method, path and client
    #[serde(default)]
    pub rate_limit: RateLimitPolicy,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            rate_limit: RateLimitPolicy::default(),
        }
    }
}

/// All routes, rate limited, with request tracing
#[cfg(feature = "api")]
pub fn router(state: ApiState) -> Router {
    use tower_http::trace::TraceLayer;

    Router::new()
        .route("/api/v1/health", get(routes::health::health_check))
        .route(
            "/api/v1/targets/:id/status",
            get(routes::targets::get_status),
        )
        .route("/api/v1/targets/:id/mute", put(routes::targets::set_mute))
        .route("/api/v1/reconcile", post(routes::reconcile::reconcile))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::rate_limit::rate_limit_middleware,
        ))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Spawn the API server
///
/// This starts an Axum HTTP server in a background task.
/// Returns the server's local address.
#[cfg(feature = "api")]
pub async fn spawn_api_server(config: ApiConfig, state: ApiState) -> anyhow::Result<SocketAddr> {
    info!("starting API server on {}", config.bind_addr);

    let app = router(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    let addr = listener.local_addr()?;

    info!("API server listening on {}", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        {
            tracing::error!("API server error: {}", e);
        }
    });

    Ok(addr)
}

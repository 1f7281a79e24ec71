//! Health check endpoint

use axum::Json;
use axum::extract::State;

use crate::api::{ApiResult, ApiState, HealthResponse};

/// GET /api/v1/health
///
/// Returns a simple health check response
pub async fn health_check(State(state): State<ApiState>) -> ApiResult<Json<HealthResponse>> {
    let running = state.supervisor.running().await?;
    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        targets: running.len(),
    }))
}

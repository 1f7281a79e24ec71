//! Per-target endpoints

use axum::Json;
use axum::extract::{Path, State};
use tracing::info;

use crate::api::{ApiResult, ApiState, MuteRequest, MuteResponse, TargetStatusResponse};
use crate::models::SerialNumber;

/// GET /api/v1/targets/:id/status
///
/// Unknown targets report `unknown`, like targets without data.
pub async fn get_status(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<Json<TargetStatusResponse>> {
    let id = SerialNumber::from(id);
    let status = state.status.get_status(&id).await;
    let running = state.supervisor.running().await?.contains(&id);
    let muted = running && state.supervisor.is_muted(id.clone()).await.unwrap_or(false);

    Ok(Json(TargetStatusResponse {
        id,
        status,
        running,
        muted,
    }))
}

/// PUT /api/v1/targets/:id/mute
pub async fn set_mute(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(request): Json<MuteRequest>,
) -> ApiResult<Json<MuteResponse>> {
    let id = SerialNumber::from(id);
    state.supervisor.mute(id.clone(), request.muted).await?;
    info!("target {id} muted: {}", request.muted);

    Ok(Json(MuteResponse {
        id,
        muted: request.muted,
    }))
}

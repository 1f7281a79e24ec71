use axum::Json;
use axum::extract::State;

use crate::actors::messages::ReconcileSummary;
use crate::api::{ApiResult, ApiState};

/// POST /api/v1/reconcile
///
/// Called by the control plane after every write to the configuration store.
pub async fn reconcile(State(state): State<ApiState>) -> ApiResult<Json<ReconcileSummary>> {
    let summary = state.supervisor.reconcile().await?;
    Ok(Json(summary))
}

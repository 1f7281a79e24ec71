//! API request and response bodies

use serde::{Deserialize, Serialize};

use crate::models::{HealthyStatus, SerialNumber};

/// Response for GET /api/v1/health
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,

    /// Targets with a running alert loop
    pub targets: usize,
}

/// Response for GET /api/v1/targets/:id/status
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TargetStatusResponse {
    pub id: SerialNumber,
    pub status: HealthyStatus,
    pub running: bool,

    /// Live mute flag, false when no loop runs
    pub muted: bool,
}

/// Body of PUT /api/v1/targets/:id/mute
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MuteRequest {
    pub muted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MuteResponse {
    pub id: SerialNumber,
    pub muted: bool,
}

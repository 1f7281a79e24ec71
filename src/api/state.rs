//! API shared state

use std::sync::Arc;

use crate::actors::supervisor::SupervisorHandle;
use crate::ratelimit::{RateLimitPolicy, RateLimiter};
use crate::storage::StatusStore;

/// Shared state passed to all API handlers
#[derive(Clone)]
pub struct ApiState {
    /// Handle to the supervisor for reconcile and mute
    pub supervisor: SupervisorHandle,

    /// Persisted per-target status
    pub status: Arc<dyn StatusStore>,

    pub limiter: RateLimiter,

    pub policy: RateLimitPolicy,
}

impl ApiState {
    pub fn new(
        supervisor: SupervisorHandle,
        status: Arc<dyn StatusStore>,
        limiter: RateLimiter,
        policy: RateLimitPolicy,
    ) -> Self {
        Self {
            supervisor,
            status,
            limiter,
            policy,
        }
    }
}

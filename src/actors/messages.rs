//! Message types for the supervisor actor
//!
//! Commands are sent over an mpsc channel and answered through a oneshot
//! channel carried in the command itself.

use serde::Serialize;
use tokio::sync::oneshot;

use crate::error::Result;
use crate::models::SerialNumber;
use crate::storage::StoreResult;

/// Commands that can be sent to the Supervisor
#[derive(Debug)]
pub enum SupervisorCommand {
    /// Load every target, diff against the known set and restart what changed
    Reconcile {
        respond_to: oneshot::Sender<StoreResult<ReconcileSummary>>,
    },

    /// Toggle notification dispatch of one running loop
    Mute {
        target: SerialNumber,
        muted: bool,
        respond_to: oneshot::Sender<Result<()>>,
    },

    /// Live mute flag of one running loop
    IsMuted {
        target: SerialNumber,
        respond_to: oneshot::Sender<Result<bool>>,
    },

    /// Ids of the targets with a running alert loop, sorted
    ListRunning {
        respond_to: oneshot::Sender<Vec<SerialNumber>>,
    },

    /// Stop every loop and exit
    ///
    /// Answered once all loops have fully stopped.
    Shutdown { respond_to: oneshot::Sender<()> },
}

/// What one reconcile pass did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileSummary {
    /// Loops started for new or changed targets
    pub started: Vec<SerialNumber>,

    /// Loops stopped for removed or changed targets
    pub stopped: Vec<SerialNumber>,

    /// Targets whose activation failed, with the reason; retried next pass
    pub failed: Vec<(SerialNumber, String)>,
}

impl ReconcileSummary {
    pub fn is_noop(&self) -> bool {
        self.started.is_empty() && self.stopped.is_empty() && self.failed.is_empty()
    }
}

//! Prober - Feeds the report store from a target's detector
//!
//! ```text
//! every interval ──► Detector::probe ──► Report::from_batch ──► ReportRecorder
//! ```
//!
//! The alert loop never talks to the prober; it only reads what the prober
//! (or any other producer) recorded.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::detectors::Detector;
use crate::models::{Report, SerialNumber};
use crate::storage::ReportRecorder;

struct ProberActor {
    target: SerialNumber,
    detector: Detector,
    recorder: Arc<dyn ReportRecorder>,
    interval: Duration,
    cancel: CancellationToken,
}

impl ProberActor {
    #[instrument(skip(self), fields(target = %self.target))]
    async fn run(self) {
        debug!("probing every {:?}", self.interval);

        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let batch = self.detector.probe(&self.cancel).await;
            if self.cancel.is_cancelled() {
                // outcomes of a cancelled batch say nothing about the target
                break;
            }

            let report = Report::from_batch(self.target.clone(), &batch, Utc::now());
            if let Err(e) = self.recorder.record_report(report).await {
                warn!("failed to record report: {e}");
            }
        }

        debug!("prober stopped");
    }
}

/// Handle for a running prober
pub struct ProberHandle {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl ProberHandle {
    pub fn spawn(
        target: SerialNumber,
        detector: Detector,
        recorder: Arc<dyn ReportRecorder>,
        interval: Duration,
        parent: &CancellationToken,
    ) -> Self {
        let cancel = parent.child_token();
        let actor = ProberActor {
            target,
            detector,
            recorder,
            interval,
            cancel: cancel.clone(),
        };

        Self {
            cancel,
            handle: tokio::spawn(actor.run()),
        }
    }

    /// Cancel in-flight probes and wait for the task to exit
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            warn!("prober ended abnormally: {e}");
        }
    }
}

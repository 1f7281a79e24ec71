//! Supervisor - Keeps one alert loop per configured target
//!
//! ## Reconcile
//!
//! ```text
//! fetch_all_targets ──► diff(known, newer) ──► stop changed/removed
//!                                                   │
//!                                    start added/changed ◄──┘
//! ```
//!
//! Every key is stopped (and awaited) before its replacement starts, so two
//! loops never write the same target's status. Targets that fail to activate
//! are dropped from the known set and retried on the next pass. A failed load
//! leaves everything running as it is.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use futures::future::join_all;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::alert::AlertLoop;
use super::messages::{ReconcileSummary, SupervisorCommand};
use super::prober::ProberHandle;
use crate::detectors::{Detector, DetectorRegistry};
use crate::error::{Error, Result};
use crate::models::{ConfigSet, SerialNumber, Target};
use crate::notifiers::NotifierRegistry;
use crate::storage::{ConfigStore, ReportFeed, ReportRecorder, StatusStore, StoreResult};

/// Collaborators shared by every loop
#[derive(Clone)]
pub struct Stores {
    pub config: Arc<dyn ConfigStore>,
    pub reports: Arc<dyn ReportFeed>,
    pub status: Arc<dyn StatusStore>,

    /// Where probers record their reports; no probers run when `None`
    pub recorder: Option<Arc<dyn ReportRecorder>>,
}

/// One activated target
struct Active {
    alert: AlertLoop,
    prober: Option<ProberHandle>,
}

impl Active {
    async fn stop(self) {
        if let Some(prober) = self.prober {
            prober.stop().await;
        }
        self.alert.turn_off().await;
    }
}

pub struct Supervisor {
    stores: Stores,
    detectors: DetectorRegistry,
    notifiers: NotifierRegistry,

    /// Last loaded snapshot, minus targets that failed activation
    known: ConfigSet,

    loops: HashMap<SerialNumber, Active>,

    command_rx: mpsc::Receiver<SupervisorCommand>,

    reconcile_interval: Duration,

    /// Parent of every loop's cancellation
    shutdown: CancellationToken,
}

impl Supervisor {
    pub fn new(
        stores: Stores,
        detectors: DetectorRegistry,
        notifiers: NotifierRegistry,
        command_rx: mpsc::Receiver<SupervisorCommand>,
        reconcile_interval: Duration,
    ) -> Self {
        Self {
            stores,
            detectors,
            notifiers,
            known: ConfigSet::new(),
            loops: HashMap::new(),
            command_rx,
            reconcile_interval,
            shutdown: CancellationToken::new(),
        }
    }

    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting supervisor");

        let mut ticker = interval_at(
            Instant::now() + self.reconcile_interval,
            self.reconcile_interval,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.reconcile().await {
                        warn!("periodic reconcile failed: {e}");
                    }
                }

                cmd = self.command_rx.recv() => {
                    let Some(cmd) = cmd else {
                        warn!("command channel closed, shutting down");
                        self.stop_all().await;
                        break;
                    };

                    match cmd {
                        SupervisorCommand::Reconcile { respond_to } => {
                            let _ = respond_to.send(self.reconcile().await);
                        }

                        SupervisorCommand::Mute { target, muted, respond_to } => {
                            let _ = respond_to.send(self.mute(&target, muted));
                        }

                        SupervisorCommand::IsMuted { target, respond_to } => {
                            let muted = self
                                .loops
                                .get(&target)
                                .map(|active| active.alert.is_muted())
                                .ok_or(Error::NotRunning(target));
                            let _ = respond_to.send(muted);
                        }

                        SupervisorCommand::ListRunning { respond_to } => {
                            let mut ids: Vec<_> = self.loops.keys().cloned().collect();
                            ids.sort();
                            let _ = respond_to.send(ids);
                        }

                        SupervisorCommand::Shutdown { respond_to } => {
                            debug!("received shutdown command");
                            self.stop_all().await;
                            let _ = respond_to.send(());
                            break;
                        }
                    }
                }
            }
        }

        debug!("supervisor stopped");
    }

    #[instrument(skip(self))]
    async fn reconcile(&mut self) -> StoreResult<ReconcileSummary> {
        let newer = self.stores.config.fetch_all_targets().await?;
        let changed = self.known.diff(&newer);
        let mut summary = ReconcileSummary::default();

        if changed.is_empty() {
            debug!("configuration unchanged ({} targets)", newer.len());
            return Ok(summary);
        }

        // live mute of each stopped loop, next to the stored flag it started from
        let mut mutes = HashMap::new();
        for id in &changed {
            if let Some(active) = self.loops.remove(id) {
                mutes.insert(id.clone(), (active.alert.target().mute, active.alert.is_muted()));
                active.stop().await;
                summary.stopped.push(id.clone());
            }
        }

        let mut known = newer;
        for id in &changed {
            let Some(target) = known.get(id).cloned() else {
                continue;
            };
            let stored_mute = target.mute;
            match self.activate(target).await {
                Ok(active) => {
                    // an operator toggle survives restarts until the stored flag changes
                    if let Some(&(previous, live)) = mutes.get(id) {
                        if previous == stored_mute && live != stored_mute {
                            active.alert.mute(live);
                        }
                    }
                    self.loops.insert(id.clone(), active);
                    summary.started.push(id.clone());
                }
                Err(e) => {
                    error!("failed to activate target {id}: {e}");
                    known.remove(id);
                    summary.failed.push((id.clone(), e.to_string()));
                }
            }
        }
        self.known = known;

        info!(
            "reconciled: {} started, {} stopped, {} failed",
            summary.started.len(),
            summary.stopped.len(),
            summary.failed.len()
        );
        Ok(summary)
    }

    async fn activate(&self, target: Target) -> Result<Active> {
        target.validate()?;

        let prober = match &self.stores.recorder {
            Some(recorder) => {
                let detector =
                    Detector::build(&self.detectors, self.stores.config.as_ref(), &target).await?;
                Some((detector, recorder.clone()))
            }
            None if self.detectors.contains(&target.kind) => None,
            None => return Err(Error::UnknownCheckKind(target.kind.to_string())),
        };

        let alert = AlertLoop::build(
            target,
            &self.notifiers,
            self.stores.config.as_ref(),
            self.stores.reports.clone(),
            self.stores.status.clone(),
            &self.shutdown,
        )
        .await?;
        alert.turn_on().await?;

        let target = alert.target();
        let prober = prober.map(|(detector, recorder)| {
            ProberHandle::spawn(
                target.id.clone(),
                detector,
                recorder,
                target.interval,
                &self.shutdown,
            )
        });

        Ok(Active { alert, prober })
    }

    fn mute(&self, target: &SerialNumber, muted: bool) -> Result<()> {
        let active = self
            .loops
            .get(target)
            .ok_or_else(|| Error::NotRunning(target.clone()))?;
        active.alert.mute(muted);
        Ok(())
    }

    async fn stop_all(&mut self) {
        self.shutdown.cancel();
        let stops = self.loops.drain().map(|(_, active)| active.stop());
        join_all(stops).await;
        self.known = ConfigSet::new();
        info!("all alert loops stopped");
    }
}

/// Handle for controlling the Supervisor
#[derive(Clone)]
pub struct SupervisorHandle {
    sender: mpsc::Sender<SupervisorCommand>,
}

impl SupervisorHandle {
    /// Spawn the supervisor; nothing runs until the first reconcile
    pub fn spawn(
        stores: Stores,
        detectors: DetectorRegistry,
        notifiers: NotifierRegistry,
        reconcile_interval: Duration,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let actor = Supervisor::new(stores, detectors, notifiers, cmd_rx, reconcile_interval);
        tokio::spawn(actor.run());
        Self { sender: cmd_tx }
    }

    /// Reconcile now; fails when the configuration could not be loaded
    pub async fn reconcile(&self) -> anyhow::Result<ReconcileSummary> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SupervisorCommand::Reconcile { respond_to: tx })
            .await
            .context("supervisor is gone")?;
        Ok(rx.await.context("supervisor dropped the request")??)
    }

    /// Mute or unmute a running target
    ///
    /// Fails with [`Error::NotRunning`] when no loop runs for `target`.
    pub async fn mute(&self, target: SerialNumber, muted: bool) -> anyhow::Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SupervisorCommand::Mute {
                target,
                muted,
                respond_to: tx,
            })
            .await
            .context("supervisor is gone")?;
        Ok(rx.await.context("supervisor dropped the request")??)
    }

    /// Whether dispatch of a running target is muted right now
    pub async fn is_muted(&self, target: SerialNumber) -> anyhow::Result<bool> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SupervisorCommand::IsMuted {
                target,
                respond_to: tx,
            })
            .await
            .context("supervisor is gone")?;
        Ok(rx.await.context("supervisor dropped the request")??)
    }

    pub async fn running(&self) -> anyhow::Result<Vec<SerialNumber>> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SupervisorCommand::ListRunning { respond_to: tx })
            .await
            .context("supervisor is gone")?;
        rx.await.context("supervisor dropped the request")
    }

    /// Stop every loop and wait until they have all exited
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        if self
            .sender
            .send(SupervisorCommand::Shutdown { respond_to: tx })
            .await
            .is_ok()
        {
            let _ = rx.await;
        }
    }
}

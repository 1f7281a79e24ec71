//! AlertLoop - Classifies one target's health on a timer
//!
//! ## Lifecycle
//!
//! ```text
//! Idle ──turn_on──► Running ──turn_off──► Stopped
//!   │                  │ turn_on                │ turn_on
//!   │                  ▼                        ▼
//!   │           AlreadyRunning            AlreadyStopped
//!   └──turn_off──► Stopped
//! ```
//!
//! ## Per tick
//!
//! Every `interval * (threshold + 1)`:
//!
//! 1. fetch the reports whose window ended between the previous tick and this one
//! 2. none, or the fetch failed: status `unknown`
//! 3. otherwise classify (first red wins, any weak report makes it yellow,
//!    green by default)
//! 4. persist the status
//! 5. red and not muted: deliver the red report to every notifier
//!
//! Nothing in a tick is fatal to the loop. Cancellation interrupts the wait
//! between ticks; a tick already in progress runs to completion.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

use crate::error::{Error, Result};
use crate::models::{HealthyStatus, Report, Target};
use crate::notifiers::{AlertEvent, Notifier, NotifierRegistry, resolve_notifiers};
use crate::storage::{ConfigStore, ReportFeed, StatusStore};

/// Classify one tick's reports
///
/// Returns the status and, when red, the first report that reached the
/// unhealthy threshold. Callers handle the empty case themselves.
pub fn classify(
    reports: &[Report],
    healthy_threshold: u32,
    unhealthy_threshold: u32,
) -> (HealthyStatus, Option<&Report>) {
    let mut status = HealthyStatus::Green;
    for report in reports {
        if report.failed >= unhealthy_threshold {
            return (HealthyStatus::Red, Some(report));
        }
        if report.success < healthy_threshold {
            status = HealthyStatus::Yellow;
        }
    }
    (status, None)
}

enum LoopState {
    Idle,
    Running(JoinHandle<()>),
    Stopped,
}

/// Everything the spawned task needs
struct Sampler {
    target: Target,
    notifiers: Vec<Arc<dyn Notifier>>,
    feed: Arc<dyn ReportFeed>,
    status: Arc<dyn StatusStore>,
    muted: Arc<AtomicBool>,
}

pub struct AlertLoop {
    sampler: Arc<Sampler>,
    cancel: CancellationToken,
    state: Mutex<LoopState>,
}

impl AlertLoop {
    /// Loop over already resolved notifiers
    ///
    /// `parent` cancels this loop together with its siblings.
    pub fn new(
        target: Target,
        notifiers: Vec<Arc<dyn Notifier>>,
        feed: Arc<dyn ReportFeed>,
        status: Arc<dyn StatusStore>,
        parent: &CancellationToken,
    ) -> Self {
        let muted = Arc::new(AtomicBool::new(target.mute));
        Self {
            sampler: Arc::new(Sampler {
                target,
                notifiers,
                feed,
                status,
                muted,
            }),
            cancel: parent.child_token(),
            state: Mutex::new(LoopState::Idle),
        }
    }

    /// Validate `target` and resolve its notifiers from `store`
    pub async fn build(
        target: Target,
        registry: &NotifierRegistry,
        store: &dyn ConfigStore,
        feed: Arc<dyn ReportFeed>,
        status: Arc<dyn StatusStore>,
        parent: &CancellationToken,
    ) -> Result<Self> {
        target.validate()?;
        let notifiers = resolve_notifiers(registry, store, &target).await;
        Ok(Self::new(target, notifiers, feed, status, parent))
    }

    pub fn target(&self) -> &Target {
        &self.sampler.target
    }

    /// Start the loop task
    ///
    /// Fails without side effects if the loop is running or was turned off.
    pub async fn turn_on(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        match *state {
            LoopState::Running(_) => Err(Error::AlreadyRunning(self.sampler.target.id.clone())),
            LoopState::Stopped => Err(Error::AlreadyStopped(self.sampler.target.id.clone())),
            LoopState::Idle => {
                let handle = tokio::spawn(self.sampler.clone().run(self.cancel.clone()));
                *state = LoopState::Running(handle);
                info!("alert loop for {} started", self.sampler.target.id);
                Ok(())
            }
        }
    }

    /// Cancel the loop and wait until its task has exited
    pub async fn turn_off(&self) {
        let mut state = self.state.lock().await;
        if let LoopState::Running(handle) = std::mem::replace(&mut *state, LoopState::Stopped) {
            self.cancel.cancel();
            if let Err(e) = handle.await {
                warn!("alert loop for {} ended abnormally: {e}", self.sampler.target.id);
            }
            info!("alert loop for {} stopped", self.sampler.target.id);
        }
    }

    /// False once the task has exited, including after a parent cancel
    pub async fn is_running(&self) -> bool {
        matches!(&*self.state.lock().await, LoopState::Running(handle) if !handle.is_finished())
    }

    /// Toggle notification dispatch; read at every red tick
    pub fn mute(&self, muted: bool) {
        self.sampler.muted.store(muted, Ordering::SeqCst);
        debug!("target {} muted: {muted}", self.sampler.target.id);
    }

    pub fn is_muted(&self) -> bool {
        self.sampler.muted.load(Ordering::SeqCst)
    }

    /// Run one tick against the reports of the window `(since, until]`
    pub async fn sample(&self, since: DateTime<Utc>, until: DateTime<Utc>) -> HealthyStatus {
        self.sampler.sample(since, until).await
    }
}

impl Sampler {
    #[instrument(skip_all, fields(target = %self.target.id))]
    async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let period = self.target.sample_interval();
        debug!("sampling every {period:?}");

        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut since = Utc::now();

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            // window always advances, even when this tick's fetch fails
            let until = Utc::now();
            let window_start = std::mem::replace(&mut since, until);
            self.sample(window_start, until).await;
        }

        debug!("alert loop exited");
    }

    async fn sample(&self, since: DateTime<Utc>, until: DateTime<Utc>) -> HealthyStatus {
        let id = &self.target.id;

        let reports = match self.feed.fetch_reports(id, since, until).await {
            Ok(reports) if !reports.is_empty() => reports,
            Ok(_) => {
                debug!("no reports for {id} since {since}");
                self.persist(HealthyStatus::Unknown).await;
                return HealthyStatus::Unknown;
            }
            Err(e) => {
                warn!("failed to fetch reports for {id}: {e}");
                self.persist(HealthyStatus::Unknown).await;
                return HealthyStatus::Unknown;
            }
        };

        let (status, red) = classify(
            &reports,
            self.target.healthy_threshold,
            self.target.unhealthy_threshold,
        );
        trace!("{} reports classified {status}", reports.len());
        self.persist(status).await;

        if let Some(report) = red {
            if self.muted.load(Ordering::SeqCst) {
                debug!("target {id} is red but muted");
            } else {
                self.dispatch(AlertEvent::new(&self.target, status, report.clone()))
                    .await;
            }
        }

        status
    }

    async fn persist(&self, status: HealthyStatus) {
        if let Err(e) = self.status.set_status(&self.target.id, status).await {
            warn!("failed to persist status {status} for {}: {e}", self.target.id);
        }
    }

    async fn dispatch(&self, event: AlertEvent) {
        let deliveries = self.notifiers.iter().map(|notifier| {
            let event = &event;
            async move { (notifier.id(), notifier.deliver(event).await) }
        });

        for (notifier, result) in join_all(deliveries).await {
            if let Err(e) = result {
                warn!("notifier {notifier} failed for {}: {e:#}", event.target);
            }
        }
    }
}

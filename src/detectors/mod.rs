//! Probing engine
//!
//! A [`Detector`] is built once per target: it resolves the target's groups
//! into socket addresses and picks a [`ProbeRunner`] from the
//! [`DetectorRegistry`] by check kind. Each call to [`Detector::probe`] checks
//! every address concurrently and returns one outcome per address.
//!
//! ```text
//! Target ──► groups ──► unfold / exclude ──► host:port ──► resolve ──► [addr; ≤255]
//!                                                                        │
//!                         probe(): one task per addr, timeout ∧ cancel ◄─┘
//!                                                                        │
//!                                         join barrier ──► ProbeBatch ◄──┘
//! ```

pub mod http;
pub mod tcp;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use tokio::net::lookup_host;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace, warn};

use crate::error::{Error, Result};
use crate::models::{CheckKind, ProbeBatch, ProbeOutcome, SerialNumber, Target};
use crate::storage::{ConfigStore, fetch_target_groups};

/// Endpoint lists of this size or larger are truncated to `MAX_ENDPOINTS - 1`
pub const MAX_ENDPOINTS: usize = 256;

/// One network check of one resolved address
///
/// Returns the response text on success. Runners never retry; the next
/// sampling tick does.
#[async_trait]
pub trait ProbeRunner: Send + Sync {
    async fn run(&self, addr: SocketAddr) -> anyhow::Result<String>;
}

/// Builds the runner for a target of one check kind
pub type ProbeCreator = fn(&Target) -> Result<Arc<dyn ProbeRunner>>;

/// Check kinds known to this process
///
/// Built once at startup and handed to whatever constructs detectors.
#[derive(Clone)]
pub struct DetectorRegistry {
    creators: HashMap<String, ProbeCreator>,
}

impl DetectorRegistry {
    /// Registry without any kind
    pub fn empty() -> Self {
        Self {
            creators: HashMap::new(),
        }
    }

    /// Registry with the built-in `tcp` and `http` kinds
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(CheckKind::TCP, tcp::create);
        registry.register(CheckKind::HTTP, http::create);
        registry
    }

    pub fn register(&mut self, kind: impl Into<String>, creator: ProbeCreator) {
        self.creators.insert(kind.into(), creator);
    }

    pub fn contains(&self, kind: &CheckKind) -> bool {
        self.creators.contains_key(kind.as_str())
    }

    pub fn create(&self, target: &Target) -> Result<Arc<dyn ProbeRunner>> {
        let creator = self
            .creators
            .get(target.kind.as_str())
            .ok_or_else(|| Error::UnknownCheckKind(target.kind.to_string()))?;
        creator(target)
    }
}

impl Default for DetectorRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

pub struct Detector {
    target: SerialNumber,
    timeout: Duration,
    runner: Arc<dyn ProbeRunner>,
    addresses: Vec<SocketAddr>,
}

impl Detector {
    /// Resolve `target`'s groups and pick its runner
    ///
    /// Missing groups and unknown check kinds fail the build; endpoints that
    /// do not resolve are skipped with a warning.
    #[instrument(skip_all, fields(target = %target.id))]
    pub async fn build(
        registry: &DetectorRegistry,
        store: &dyn ConfigStore,
        target: &Target,
    ) -> Result<Self> {
        target.validate()?;
        let runner = registry.create(target)?;
        let groups = fetch_target_groups(store, target).await?;

        let mut addresses = Vec::new();
        for group in &groups {
            for endpoint in group.resolve_endpoints() {
                let host_port = endpoint.with_port(target.socket_port());
                match lookup_host(&host_port).await {
                    Ok(mut resolved) => match resolved.next() {
                        Some(addr) => addresses.push(addr),
                        None => warn!("endpoint {host_port} resolved to no address, ignored"),
                    },
                    Err(e) => warn!("endpoint {host_port} ignored: {e}"),
                }
            }
        }

        debug!("resolved {} endpoints", addresses.len());
        Ok(Self::from_addresses(target, runner, addresses))
    }

    /// Detector over already resolved addresses
    pub fn from_addresses(
        target: &Target,
        runner: Arc<dyn ProbeRunner>,
        mut addresses: Vec<SocketAddr>,
    ) -> Self {
        if addresses.len() >= MAX_ENDPOINTS {
            warn!(
                "target {} has {} endpoints, probing the first {}",
                target.id,
                addresses.len(),
                MAX_ENDPOINTS - 1
            );
            addresses.truncate(MAX_ENDPOINTS - 1);
        }

        Self {
            target: target.id.clone(),
            timeout: target.timeout,
            runner,
            addresses,
        }
    }

    pub fn addresses(&self) -> &[SocketAddr] {
        &self.addresses
    }

    /// Probe every address concurrently and wait for all of them
    ///
    /// Each probe ends at its own timeout or when `cancel` fires, whichever
    /// comes first. The batch has exactly one outcome per address.
    #[instrument(skip_all, fields(target = %self.target))]
    pub async fn probe(&self, cancel: &CancellationToken) -> ProbeBatch {
        let handles: Vec<_> = self
            .addresses
            .iter()
            .map(|&addr| {
                tokio::spawn(probe_one(
                    self.target.clone(),
                    addr,
                    self.timeout,
                    self.runner.clone(),
                    cancel.child_token(),
                ))
            })
            .collect();

        // one slot per task, merged after the barrier
        let joined = join_all(handles).await;

        let batch: ProbeBatch = joined
            .into_iter()
            .zip(&self.addresses)
            .map(|(joined, addr)| {
                joined.unwrap_or_else(|e| {
                    ProbeOutcome::failed(
                        self.target.clone(),
                        addr.to_string(),
                        Utc::now(),
                        Duration::ZERO,
                        format!("probe task failed: {e}"),
                    )
                })
            })
            .collect();

        trace!(
            "probed {} endpoints, {} succeeded",
            batch.len(),
            batch.iter().filter(|o| o.is_success()).count()
        );
        batch
    }
}

async fn probe_one(
    target: SerialNumber,
    addr: SocketAddr,
    timeout: Duration,
    runner: Arc<dyn ProbeRunner>,
    cancel: CancellationToken,
) -> ProbeOutcome {
    let timestamp = Utc::now();
    let started = Instant::now();

    let result = tokio::select! {
        _ = cancel.cancelled() => Err("probe cancelled".to_string()),
        res = tokio::time::timeout(timeout, runner.run(addr)) => match res {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(format!("{e:#}")),
            Err(_) => Err(format!("probe timed out after {timeout:?}")),
        },
    };

    let elapsed = started.elapsed();
    match result {
        Ok(response) => {
            ProbeOutcome::succeeded(target, addr.to_string(), timestamp, elapsed, response)
        }
        Err(error) => ProbeOutcome::failed(target, addr.to_string(), timestamp, elapsed, error),
    }
}

//! In-memory store (no persistence)
//!
//! Holds configuration records, reports and statuses behind Tokio locks.
//! It's useful for:
//! - Testing without a Redis instance
//! - Single-process deployments seeded from the config file
//!
//! The mutators (`put_*`, `delete_*`) mirror what the control plane does
//! against the shared store: every save bumps the record's own version.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, trace};

use super::backend::{ConfigStore, ReportFeed, ReportRecorder, StatusStore};
use super::error::{StoreError, StoreResult};
use crate::models::{
    ConfigSet, Group, HealthyStatus, NotifierRef, Report, SerialNumber, Target, effective_version,
};

/// Maximum reports kept in memory per target
const MAX_REPORTS_PER_TARGET: usize = 1024;

#[derive(Default)]
pub struct MemoryStore {
    targets: RwLock<HashMap<SerialNumber, Target>>,
    groups: RwLock<HashMap<SerialNumber, Group>>,
    notifiers: RwLock<HashMap<SerialNumber, NotifierRef>>,
    reports: RwLock<HashMap<SerialNumber, Vec<Report>>>,
    statuses: RwLock<HashMap<SerialNumber, HealthyStatus>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with records as-is (versions taken from the records)
    pub fn with_records(
        targets: Vec<Target>,
        groups: Vec<Group>,
        notifiers: Vec<NotifierRef>,
    ) -> Self {
        Self {
            targets: RwLock::new(targets.into_iter().map(|t| (t.id.clone(), t)).collect()),
            groups: RwLock::new(groups.into_iter().map(|g| (g.id.clone(), g)).collect()),
            notifiers: RwLock::new(notifiers.into_iter().map(|n| (n.id.clone(), n)).collect()),
            ..Self::default()
        }
    }

    pub async fn put_target(&self, mut target: Target) {
        let mut targets = self.targets.write().await;
        target.version = targets.get(&target.id).map_or(0, |t| t.version) + 1;
        debug!("saving target {} (version {})", target.id, target.version);
        targets.insert(target.id.clone(), target);
    }

    pub async fn delete_target(&self, id: &SerialNumber) -> bool {
        self.targets.write().await.remove(id).is_some()
    }

    pub async fn put_group(&self, mut group: Group) {
        let mut groups = self.groups.write().await;
        group.version = groups.get(&group.id).map_or(0, |g| g.version) + 1;
        groups.insert(group.id.clone(), group);
    }

    pub async fn delete_group(&self, id: &SerialNumber) -> bool {
        self.groups.write().await.remove(id).is_some()
    }

    pub async fn put_notifier(&self, mut notifier: NotifierRef) {
        let mut notifiers = self.notifiers.write().await;
        notifier.version = notifiers.get(&notifier.id).map_or(0, |n| n.version) + 1;
        notifiers.insert(notifier.id.clone(), notifier);
    }

    pub async fn delete_notifier(&self, id: &SerialNumber) -> bool {
        self.notifiers.write().await.remove(id).is_some()
    }

    /// Own version plus the versions of every resolvable group and notifier
    async fn with_effective_version(&self, mut target: Target) -> Target {
        let groups: Vec<Group> = {
            let groups = self.groups.read().await;
            target.groups.iter().filter_map(|id| groups.get(id).cloned()).collect()
        };
        let notifiers: Vec<NotifierRef> = {
            let notifiers = self.notifiers.read().await;
            target.notifiers.iter().filter_map(|id| notifiers.get(id).cloned()).collect()
        };
        target.version = effective_version(target.version, &groups, &notifiers);
        target
    }
}

#[async_trait]
impl ConfigStore for MemoryStore {
    async fn fetch_target(&self, id: &SerialNumber) -> StoreResult<Target> {
        let target = self
            .targets
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("target {id}")))?;
        Ok(self.with_effective_version(target).await)
    }

    async fn fetch_all_targets(&self) -> StoreResult<ConfigSet> {
        let targets: Vec<Target> = self.targets.read().await.values().cloned().collect();
        let mut set = ConfigSet::new();
        for target in targets {
            set.insert(self.with_effective_version(target).await);
        }
        trace!("loaded {} targets from memory", set.len());
        Ok(set)
    }

    async fn fetch_group(&self, id: &SerialNumber) -> StoreResult<Group> {
        self.groups
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("group {id}")))
    }

    async fn fetch_notifier(&self, id: &SerialNumber) -> StoreResult<NotifierRef> {
        self.notifiers
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("notifier {id}")))
    }
}

#[async_trait]
impl ReportFeed for MemoryStore {
    async fn fetch_reports(
        &self,
        target: &SerialNumber,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> StoreResult<Vec<Report>> {
        // same millisecond granularity as the redis scores
        let (since, until) = (since.timestamp_millis(), until.timestamp_millis());
        let reports = self
            .reports
            .read()
            .await
            .get(target)
            .map(|reports| {
                reports
                    .iter()
                    .filter(|r| {
                        let at = r.timestamp.timestamp_millis();
                        since < at && at <= until
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(reports)
    }
}

#[async_trait]
impl ReportRecorder for MemoryStore {
    async fn record_report(&self, report: Report) -> StoreResult<()> {
        let mut reports = self.reports.write().await;
        let entry = reports.entry(report.target.clone()).or_default();
        entry.push(report);
        if entry.len() > MAX_REPORTS_PER_TARGET {
            let overflow = entry.len() - MAX_REPORTS_PER_TARGET;
            entry.drain(..overflow);
        }
        Ok(())
    }
}

#[async_trait]
impl StatusStore for MemoryStore {
    async fn set_status(&self, target: &SerialNumber, status: HealthyStatus) -> StoreResult<()> {
        self.statuses.write().await.insert(target.clone(), status);
        Ok(())
    }

    async fn get_status(&self, target: &SerialNumber) -> HealthyStatus {
        self.statuses
            .read()
            .await
            .get(target)
            .copied()
            .unwrap_or_default()
    }
}

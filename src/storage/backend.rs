//! Collaborator traits the core consumes
//!
//! The control plane owns the records; the core only reads snapshots, pulls
//! aggregated reports and writes back one health status per target.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::warn;

use super::error::StoreResult;
use crate::models::{ConfigSet, Group, HealthyStatus, NotifierRef, Report, SerialNumber, Target};

/// Versioned configuration records
///
/// `fetch_target` and `fetch_all_targets` report the effective version
/// (own counter plus referenced groups and notifiers), see
/// [`crate::models::effective_version`].
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn fetch_target(&self, id: &SerialNumber) -> StoreResult<Target>;

    /// Every loadable target. Records that fail to load are skipped.
    async fn fetch_all_targets(&self) -> StoreResult<ConfigSet>;

    async fn fetch_group(&self, id: &SerialNumber) -> StoreResult<Group>;

    async fn fetch_notifier(&self, id: &SerialNumber) -> StoreResult<NotifierRef>;
}

/// Source of aggregated reports
#[async_trait]
pub trait ReportFeed: Send + Sync {
    /// Reports of `target` whose window ended in `(since, until]`, compared
    /// at millisecond precision.
    ///
    /// Passing each call's `until` as the next call's `since` never returns
    /// the same report twice.
    async fn fetch_reports(
        &self,
        target: &SerialNumber,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> StoreResult<Vec<Report>>;
}

/// Sink for reports built from probe batches
#[async_trait]
pub trait ReportRecorder: Send + Sync {
    async fn record_report(&self, report: Report) -> StoreResult<()>;
}

/// Per-target health status, read by dashboards
#[async_trait]
pub trait StatusStore: Send + Sync {
    async fn set_status(&self, target: &SerialNumber, status: HealthyStatus) -> StoreResult<()>;

    /// Current status, [`HealthyStatus::Unknown`] on any read failure
    async fn get_status(&self, target: &SerialNumber) -> HealthyStatus;
}

/// All groups referenced by `target`. Any missing group fails the lookup.
pub async fn fetch_target_groups(
    store: &dyn ConfigStore,
    target: &Target,
) -> StoreResult<Vec<Group>> {
    let mut groups = Vec::with_capacity(target.groups.len());
    for id in &target.groups {
        groups.push(store.fetch_group(id).await?);
    }
    Ok(groups)
}

/// Notifier references of `target` that can be loaded; the rest are skipped.
pub async fn fetch_target_notifiers(store: &dyn ConfigStore, target: &Target) -> Vec<NotifierRef> {
    let mut notifiers = Vec::with_capacity(target.notifiers.len());
    for id in &target.notifiers {
        match store.fetch_notifier(id).await {
            Ok(notifier) => notifiers.push(notifier),
            Err(e) => warn!("target {}: skipping notifier {id}: {e}", target.id),
        }
    }
    notifiers
}

//! Alert sinks
//!
//! A target's notifier references are resolved into live [`Notifier`]s once,
//! when its alert loop is built. Unknown kinds and broken configurations are
//! skipped with a warning so one bad sink never blocks the others.

pub mod discord;
pub mod webhook;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::models::{HealthyStatus, NotifierRef, Report, SerialNumber, Target};
use crate::storage::{ConfigStore, fetch_target_notifiers};

/// What a sink is told when a target turns red
#[derive(Debug, Clone)]
pub struct AlertEvent {
    pub target: SerialNumber,
    pub target_name: String,
    pub status: HealthyStatus,
    pub report: Report,
}

impl AlertEvent {
    pub fn new(target: &Target, status: HealthyStatus, report: Report) -> Self {
        Self {
            target: target.id.clone(),
            target_name: target.display_name().to_string(),
            status,
            report,
        }
    }

    /// One-line human readable summary
    pub fn summary(&self) -> String {
        format!(
            "🔴 **Target {}**: `{}` is {} ({} failed / {} succeeded)",
            self.status.as_str().to_uppercase(),
            self.target_name,
            self.status,
            self.report.failed,
            self.report.success
        )
    }
}

/// One delivery attempt; sinks may retry internally, callers never do
#[async_trait]
pub trait Notifier: Send + Sync {
    fn id(&self) -> &SerialNumber;

    async fn deliver(&self, event: &AlertEvent) -> anyhow::Result<()>;
}

pub type NotifierCreator = fn(&NotifierRef) -> Result<Arc<dyn Notifier>>;

/// Notifier kinds known to this process
#[derive(Clone)]
pub struct NotifierRegistry {
    creators: HashMap<String, NotifierCreator>,
}

impl NotifierRegistry {
    pub fn empty() -> Self {
        Self {
            creators: HashMap::new(),
        }
    }

    /// Registry with the `webhook` and `discord` kinds
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(webhook::KIND, webhook::create);
        registry.register(discord::KIND, discord::create);
        registry
    }

    pub fn register(&mut self, kind: impl Into<String>, creator: NotifierCreator) {
        self.creators.insert(kind.into(), creator);
    }

    pub fn create(&self, notifier: &NotifierRef) -> Result<Arc<dyn Notifier>> {
        let creator = self
            .creators
            .get(&notifier.kind)
            .ok_or_else(|| Error::UnknownNotifierKind(notifier.kind.clone()))?;
        creator(notifier)
    }
}

impl Default for NotifierRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Live sinks for every notifier of `target` that loads and builds
pub async fn resolve_notifiers(
    registry: &NotifierRegistry,
    store: &dyn ConfigStore,
    target: &Target,
) -> Vec<Arc<dyn Notifier>> {
    let mut notifiers = Vec::new();
    for notifier in fetch_target_notifiers(store, target).await {
        match registry.create(&notifier) {
            Ok(sink) => notifiers.push(sink),
            Err(e) => warn!("target {}: skipping notifier {}: {e}", target.id, notifier.id),
        }
    }
    debug!("target {} has {} notifiers", target.id, notifiers.len());
    notifiers
}

/// `url` entry of a notifier configuration
fn required_url(notifier: &NotifierRef) -> Result<String> {
    match notifier.config_str("url") {
        Some(url) if !url.is_empty() => Ok(url.to_string()),
        _ => Err(Error::InvalidNotifier {
            id: notifier.id.clone(),
            reason: "missing 'url'".to_string(),
        }),
    }
}

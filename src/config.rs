use std::time::Duration;

use tracing::trace;

use crate::api::ApiConfig;
use crate::models::{Group, NotifierRef, Target};
use crate::storage::DEFAULT_PREFIX;

/// Where targets, reports and statuses live
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StoreConfig {
    /// In-process store seeded from this file (no persistence)
    Memory {
        #[serde(default)]
        targets: Vec<Target>,

        #[serde(default)]
        groups: Vec<Group>,

        #[serde(default)]
        notifiers: Vec<NotifierRef>,
    },

    /// Redis shared with the control plane and other hubs
    Redis {
        url: String,

        #[serde(default = "default_prefix")]
        prefix: String,
    },
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::Memory {
            targets: vec![],
            groups: vec![],
            notifiers: vec![],
        }
    }
}

fn default_prefix() -> String {
    DEFAULT_PREFIX.to_string()
}

fn default_probe() -> bool {
    true
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    /// Store configuration (optional - defaults to an empty in-memory store)
    #[serde(default)]
    pub store: StoreConfig,

    /// Seconds between periodic reconciles
    #[serde(default = "crate::util::get_default_reconcile_interval")]
    pub reconcile_interval: u64,

    /// Run a prober per target next to its alert loop
    #[serde(default = "default_probe")]
    pub probe: bool,

    /// Control surface (optional - no API when absent)
    pub api: Option<ApiConfig>,
}

impl Config {
    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval.max(1))
    }
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;
    serde_json::from_str(&file_content)
        .map_err(|e| anyhow::anyhow!("Invalid configuration file provided: {e}"))
        .inspect(|config| trace!("loaded config: {config:?}"))
}

//! Records read from the configuration store and values produced per tick
//!
//! Targets, groups and notifier references are snapshots owned by the
//! control plane; the core only reads them. Probe outcomes and reports are
//! produced and consumed within one sampling tick.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::net::Ipv6Addr;
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Error;
use crate::util::duration_ms;

/// Upper bound on the number of entries one endpoint pattern may unfold to
const MAX_UNFOLDED: usize = 4096;

/// `None` only if the pattern fails to compile, in which case nothing unfolds
static RANGE_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\[(\d+)-(\d+)\]").ok());

/// Opaque identifier of a stored record
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SerialNumber(String);

impl SerialNumber {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for SerialNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SerialNumber {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for SerialNumber {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Kind of health check performed against every endpoint of a target
///
/// The set is open: any string is accepted here and looked up in the
/// detector registry when the target is activated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CheckKind(String);

impl CheckKind {
    pub const TCP: &'static str = "tcp";
    pub const HTTP: &'static str = "http";

    pub fn new(kind: impl Into<String>) -> Self {
        Self(kind.into())
    }

    pub fn tcp() -> Self {
        Self::new(Self::TCP)
    }

    pub fn http() -> Self {
        Self::new(Self::HTTP)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A monitored entity (a group of game server processes sharing one check)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub id: SerialNumber,

    #[serde(default)]
    pub name: String,

    #[serde(rename = "type")]
    pub kind: CheckKind,

    /// Port substituted into every endpoint of every group
    pub port: u32,

    /// Accepted HTTP status codes (any 2xx when empty)
    #[serde(default, rename = "accept_code", skip_serializing_if = "Vec::is_empty")]
    pub accept_codes: Vec<u16>,

    /// Host header sent with HTTP checks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// Request path of HTTP checks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    /// Deadline of a single probe
    #[serde(with = "duration_ms")]
    pub timeout: Duration,

    /// Probing interval
    #[serde(with = "duration_ms")]
    pub interval: Duration,

    pub healthy_threshold: u32,

    pub unhealthy_threshold: u32,

    #[serde(default)]
    pub groups: Vec<SerialNumber>,

    #[serde(default)]
    pub notifiers: Vec<SerialNumber>,

    #[serde(default)]
    pub version: u64,

    #[serde(default)]
    pub mute: bool,
}

impl Target {
    pub fn validate(&self) -> Result<(), Error> {
        if self.id.is_empty() {
            return Err(Error::InvalidTarget("empty id".to_string()));
        }
        if self.port == 0 || self.port >= 65536 {
            return Err(Error::InvalidTarget(format!(
                "{}: port must be > 0 and < 65536, got {}",
                self.id, self.port
            )));
        }
        if self.healthy_threshold == 0 || self.unhealthy_threshold == 0 {
            return Err(Error::InvalidTarget(format!(
                "{}: thresholds must be > 0",
                self.id
            )));
        }
        if self.interval.is_zero() || self.timeout.is_zero() {
            return Err(Error::InvalidTarget(format!(
                "{}: interval and timeout must be > 0",
                self.id
            )));
        }
        Ok(())
    }

    /// Port as a socket port. Only meaningful after [`Target::validate`].
    pub fn socket_port(&self) -> u16 {
        self.port as u16
    }

    /// Larger of the two sample thresholds
    pub fn threshold(&self) -> u32 {
        self.healthy_threshold.max(self.unhealthy_threshold)
    }

    /// Cadence of the alert loop: `interval * (threshold + 1)`, so at least
    /// `threshold` reports have accumulated before each classification.
    pub fn sample_interval(&self) -> Duration {
        self.interval.saturating_mul(self.threshold().saturating_add(1))
    }

    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            self.id.as_str()
        } else {
            &self.name
        }
    }
}

/// Effective configuration version of a target: its own counter plus the
/// counters of every group and notifier it references.
pub fn effective_version(base: u64, groups: &[Group], notifiers: &[NotifierRef]) -> u64 {
    let groups: u64 = groups.iter().map(|g| g.version).sum();
    let notifiers: u64 = notifiers.iter().map(|n| n.version).sum();
    base + groups + notifiers
}

/// A resolvable host (or address) before port substitution
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint(String);

impl Endpoint {
    pub fn new(host: impl Into<String>) -> Self {
        Self(host.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `host:port` form ready for address resolution
    pub fn with_port(&self, port: u16) -> String {
        if self.0.parse::<Ipv6Addr>().is_ok() {
            format!("[{}]:{}", self.0, port)
        } else {
            format!("{}:{}", self.0, port)
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A named set of endpoints with exclusions
///
/// Entries may contain numeric ranges like `game-[01-12].internal` or
/// `10.0.[0-1].[1-254]`; every range is expanded and the results combined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: SerialNumber,

    #[serde(default)]
    pub name: String,

    pub endpoints: Vec<String>,

    #[serde(default)]
    pub excluded: Vec<String>,

    #[serde(default)]
    pub version: u64,
}

impl Group {
    /// Unfolded endpoints minus unfolded exclusions, in declaration order
    pub fn resolve_endpoints(&self) -> Vec<Endpoint> {
        let excluded: HashSet<String> = self
            .excluded
            .iter()
            .flat_map(|pattern| unfold_pattern(pattern))
            .collect();

        self.endpoints
            .iter()
            .flat_map(|pattern| unfold_pattern(pattern))
            .filter(|entry| !excluded.contains(entry))
            .map(Endpoint::new)
            .collect()
    }
}

/// Expand every `[a-b]` range of a pattern. Ranges starting with a leading
/// zero keep their width (`[01-03]` gives `01`, `02`, `03`).
pub fn unfold_pattern(pattern: &str) -> Vec<String> {
    let mut out = Vec::new();
    unfold_into(pattern, String::new(), &mut out);
    if out.len() >= MAX_UNFOLDED {
        warn!("endpoint pattern {pattern} truncated at {MAX_UNFOLDED} entries");
    }
    out
}

fn unfold_into(rest: &str, prefix: String, out: &mut Vec<String>) {
    if out.len() >= MAX_UNFOLDED {
        return;
    }

    let Some(caps) = RANGE_PATTERN.as_ref().and_then(|re| re.captures(rest)) else {
        out.push(prefix + rest);
        return;
    };
    let (Some(whole), Some(lo), Some(hi)) = (caps.get(0), caps.get(1), caps.get(2)) else {
        out.push(prefix + rest);
        return;
    };
    let (Ok(start), Ok(end)) = (lo.as_str().parse::<u64>(), hi.as_str().parse::<u64>()) else {
        out.push(prefix + rest);
        return;
    };

    let width = if lo.as_str().len() > 1 && lo.as_str().starts_with('0') {
        lo.as_str().len()
    } else {
        0
    };
    let head = &rest[..whole.start()];
    let tail = &rest[whole.end()..];

    for n in start.min(end)..=start.max(end) {
        if out.len() >= MAX_UNFOLDED {
            return;
        }
        let next = format!("{prefix}{head}{n:0width$}");
        unfold_into(tail, next, out);
    }
}

/// Reference to a notification sink, resolved when an alert loop is built
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifierRef {
    pub id: SerialNumber,

    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default)]
    pub config: serde_json::Map<String, serde_json::Value>,

    #[serde(default)]
    pub version: u64,
}

impl NotifierRef {
    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(|v| v.as_str())
    }
}

/// Health classification persisted per target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthyStatus {
    /// No usable data this cycle
    #[default]
    Unknown,
    Green,
    Yellow,
    Red,
}

impl HealthyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthyStatus::Unknown => "unknown",
            HealthyStatus::Green => "green",
            HealthyStatus::Yellow => "yellow",
            HealthyStatus::Red => "red",
        }
    }
}

impl fmt::Display for HealthyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HealthyStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unknown" => Ok(HealthyStatus::Unknown),
            "green" => Ok(HealthyStatus::Green),
            "yellow" => Ok(HealthyStatus::Yellow),
            "red" => Ok(HealthyStatus::Red),
            other => Err(format!("unknown healthy status '{other}'")),
        }
    }
}

/// Result of probing one endpoint once
///
/// `success` and `failed` are mutually exclusive; both are zero only when
/// the probe was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeOutcome {
    pub target: SerialNumber,
    pub address: String,
    pub timestamp: DateTime<Utc>,
    #[serde(with = "duration_ms")]
    pub elapsed: Duration,
    pub success: u32,
    pub failed: u32,
    pub response: String,
}

impl ProbeOutcome {
    pub fn succeeded(
        target: SerialNumber,
        address: String,
        timestamp: DateTime<Utc>,
        elapsed: Duration,
        response: String,
    ) -> Self {
        Self {
            target,
            address,
            timestamp,
            elapsed,
            success: 1,
            failed: 0,
            response,
        }
    }

    pub fn failed(
        target: SerialNumber,
        address: String,
        timestamp: DateTime<Utc>,
        elapsed: Duration,
        error: String,
    ) -> Self {
        Self {
            target,
            address,
            timestamp,
            elapsed,
            success: 0,
            failed: 1,
            response: error,
        }
    }

    pub fn is_success(&self) -> bool {
        self.success == 1
    }

    pub fn is_skipped(&self) -> bool {
        self.success == 0 && self.failed == 0
    }
}

/// Outcomes of one sampling tick, one per probed address
pub type ProbeBatch = Vec<ProbeOutcome>;

/// Aggregated probe results of one target over one sampling window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub target: SerialNumber,

    /// End of the window this report covers
    pub timestamp: DateTime<Utc>,

    pub success: u32,

    pub failed: u32,
}

impl Report {
    pub fn new(target: SerialNumber, timestamp: DateTime<Utc>, success: u32, failed: u32) -> Self {
        Self {
            target,
            timestamp,
            success,
            failed,
        }
    }

    /// Fold a probe batch into a single report
    pub fn from_batch(target: SerialNumber, batch: &[ProbeOutcome], at: DateTime<Utc>) -> Self {
        let success = batch.iter().map(|o| o.success).sum();
        let failed = batch.iter().map(|o| o.failed).sum();
        Self::new(target, at, success, failed)
    }
}

/// Target snapshots keyed by id, used for diffing configuration loads
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigSet(HashMap<SerialNumber, Target>);

impl ConfigSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, target: Target) -> Option<Target> {
        self.0.insert(target.id.clone(), target)
    }

    pub fn remove(&mut self, id: &SerialNumber) -> Option<Target> {
        self.0.remove(id)
    }

    pub fn get(&self, id: &SerialNumber) -> Option<&Target> {
        self.0.get(id)
    }

    pub fn contains(&self, id: &SerialNumber) -> bool {
        self.0.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SerialNumber, &Target)> {
        self.0.iter()
    }

    /// Keys that were removed, changed (any field) or added going from
    /// `self` to `newer`.
    pub fn diff(&self, newer: &ConfigSet) -> BTreeSet<SerialNumber> {
        let mut keys = BTreeSet::new();

        for (key, old) in &self.0 {
            match newer.0.get(key) {
                Some(new) if new == old => {}
                _ => {
                    keys.insert(key.clone());
                }
            }
        }

        for key in newer.0.keys() {
            if !self.0.contains_key(key) {
                keys.insert(key.clone());
            }
        }

        keys
    }
}

impl FromIterator<Target> for ConfigSet {
    fn from_iter<I: IntoIterator<Item = Target>>(iter: I) -> Self {
        Self(iter.into_iter().map(|t| (t.id.clone(), t)).collect())
    }
}

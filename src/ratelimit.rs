//! Fixed-window admission control over a shared counter store
//!
//! Every call increments the counter of its key; the call that creates the
//! counter also sets its expiry to the window. A call is admitted while the
//! post-increment count stays within the limit. All calls between the first
//! use and the expiry share one bucket, so up to twice the limit can pass
//! around a window edge.
//!
//! Correctness across processes rests entirely on
//! [`CounterStore::incr_with_expiry`] being a single atomic operation on the
//! store; the limiter never reads and writes the counter in two round trips.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::storage::StoreResult;
use crate::util::duration_ms;

/// Separator between key parts
const KEY_SEPARATOR: &str = ":";

/// Store holding the per-key counters
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomically increment `key` and, only if this created the counter,
    /// expire it after `window`. Returns the post-increment count.
    async fn incr_with_expiry(&self, key: &str, window: Duration) -> StoreResult<u64>;
}

/// Window and permit count applied to every key of one surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    #[serde(rename = "window_ms", with = "duration_ms", default = "default_window")]
    pub window: Duration,

    #[serde(default = "default_limit")]
    pub limit: u64,
}

fn default_window() -> Duration {
    Duration::from_millis(1000)
}

fn default_limit() -> u64 {
    20
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            window: default_window(),
            limit: default_limit(),
        }
    }
}

#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self { store }
    }

    /// Admit one call for the composite key `parts` if fewer than `limit`
    /// calls were admitted in the current window.
    pub async fn accept<S: AsRef<str>>(
        &self,
        parts: &[S],
        window: Duration,
        limit: u64,
    ) -> StoreResult<bool> {
        let key = join_key(parts);
        let count = self.store.incr_with_expiry(&key, window).await?;
        let allowed = count <= limit;
        if allowed {
            trace!("rate limit {key}: {count}/{limit}");
        } else {
            debug!("rate limit {key} exceeded: {count}/{limit}");
        }
        Ok(allowed)
    }

    pub async fn accept_with<S: AsRef<str>>(
        &self,
        parts: &[S],
        policy: &RateLimitPolicy,
    ) -> StoreResult<bool> {
        self.accept(parts, policy.window, policy.limit).await
    }
}

pub fn join_key<S: AsRef<str>>(parts: &[S]) -> String {
    parts
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(KEY_SEPARATOR)
}

/// Process-local counter store
///
/// Atomic within one process only; use the Redis store to share limits
/// between processes.
#[derive(Default)]
pub struct MemoryCounterStore {
    counters: Mutex<HashMap<String, (u64, Instant)>>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn incr_with_expiry(&self, key: &str, window: Duration) -> StoreResult<u64> {
        let now = Instant::now();
        let mut counters = self.counters.lock().await;
        counters.retain(|_, (_, expires_at)| *expires_at > now);

        let (count, _) = counters
            .entry(key.to_string())
            .or_insert_with(|| (0, now + window));
        *count += 1;
        Ok(*count)
    }
}

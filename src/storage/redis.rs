//! Redis-backed shared store
//!
//! ## Key scheme
//!
//! ```text
//! <prefix>_heapster_<id>    hash  meta (JSON target), version, status
//! <prefix>_group_<id>       hash  meta (JSON group), version
//! <prefix>_notifier_<id>    hash  meta (JSON notifier), version
//! <prefix>_report_<id>      zset  JSON reports scored by window end (ms)
//! <prefix>_ratelimit_<key>  string counter with expiry
//! ```
//!
//! Saves write `meta` and bump `version` in one MULTI/EXEC, so the version
//! observed next to a `meta` value is never older than that value.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, trace, warn};

use super::backend::{ConfigStore, ReportFeed, ReportRecorder, StatusStore};
use super::error::{StoreError, StoreResult};
use crate::models::{
    ConfigSet, Group, HealthyStatus, NotifierRef, Report, SerialNumber, Target, effective_version,
};
use crate::ratelimit::CounterStore;
use crate::util::window_millis;

/// Reports older than this are trimmed whenever a new one is recorded
const REPORT_RETENTION: Duration = Duration::from_secs(3600);

/// Increment a counter and arm its expiry only when this call created it.
///
/// Runs server-side as one unit, so two first callers can never both see
/// a count of 1.
static INCR_WITH_EXPIRY: LazyLock<redis::Script> = LazyLock::new(|| {
    redis::Script::new(
        r"
        local count = redis.call('INCR', KEYS[1])
        if count == 1 then
            redis.call('PEXPIRE', KEYS[1], ARGV[1])
        end
        return count
        ",
    )
});

pub struct RedisStore {
    client: redis::Client,
    prefix: String,
}

impl RedisStore {
    pub fn new(url: &str, prefix: impl Into<String>) -> StoreResult<Self> {
        let client =
            redis::Client::open(url).map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;
        Ok(Self {
            client,
            prefix: prefix.into(),
        })
    }

    async fn connection(&self) -> StoreResult<MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))
    }

    fn target_key(&self, id: &SerialNumber) -> String {
        format!("{}_heapster_{}", self.prefix, id)
    }

    fn group_key(&self, id: &SerialNumber) -> String {
        format!("{}_group_{}", self.prefix, id)
    }

    fn notifier_key(&self, id: &SerialNumber) -> String {
        format!("{}_notifier_{}", self.prefix, id)
    }

    fn report_key(&self, id: &SerialNumber) -> String {
        format!("{}_report_{}", self.prefix, id)
    }

    fn counter_key(&self, key: &str) -> String {
        format!("{}_ratelimit_{}", self.prefix, key)
    }

    /// Read `meta` and `version` of one record hash
    async fn read_record<T: DeserializeOwned>(
        &self,
        conn: &mut MultiplexedConnection,
        key: &str,
        what: &str,
    ) -> StoreResult<(T, u64)> {
        let (meta, version): (Option<String>, Option<u64>) = redis::cmd("HMGET")
            .arg(key)
            .arg("meta")
            .arg("version")
            .query_async(conn)
            .await?;
        let meta = meta.ok_or_else(|| StoreError::NotFound(what.to_string()))?;
        Ok((serde_json::from_str(&meta)?, version.unwrap_or(0)))
    }

    async fn write_record<T: Serialize>(&self, key: &str, record: &T) -> StoreResult<()> {
        let data = serde_json::to_string(record)?;
        let mut conn = self.connection().await?;
        redis::pipe()
            .atomic()
            .hset(key, "meta", data)
            .ignore()
            .hincr(key, "version", 1)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn load_target(
        &self,
        conn: &mut MultiplexedConnection,
        id: &SerialNumber,
    ) -> StoreResult<Target> {
        let (mut target, version): (Target, u64) = self
            .read_record(conn, &self.target_key(id), &format!("target {id}"))
            .await?;

        let mut groups = Vec::with_capacity(target.groups.len());
        for gid in &target.groups {
            if let Ok((group, version)) = self
                .read_record::<Group>(conn, &self.group_key(gid), "group")
                .await
            {
                groups.push(Group { version, ..group });
            }
        }
        let mut notifiers = Vec::with_capacity(target.notifiers.len());
        for nid in &target.notifiers {
            if let Ok((notifier, version)) = self
                .read_record::<NotifierRef>(conn, &self.notifier_key(nid), "notifier")
                .await
            {
                notifiers.push(NotifierRef { version, ..notifier });
            }
        }

        target.id = id.clone();
        target.version = effective_version(version, &groups, &notifiers);
        Ok(target)
    }

    pub async fn save_target(&self, target: &Target) -> StoreResult<()> {
        target
            .validate()
            .map_err(|e| StoreError::SerializationError(e.to_string()))?;
        self.write_record(&self.target_key(&target.id), target).await
    }

    pub async fn save_group(&self, group: &Group) -> StoreResult<()> {
        self.write_record(&self.group_key(&group.id), group).await
    }

    pub async fn save_notifier(&self, notifier: &NotifierRef) -> StoreResult<()> {
        self.write_record(&self.notifier_key(&notifier.id), notifier)
            .await
    }

    pub async fn delete_target(&self, id: &SerialNumber) -> StoreResult<()> {
        let mut conn = self.connection().await?;
        let _: () = conn.del(self.target_key(id)).await?;
        Ok(())
    }
}

#[async_trait]
impl ConfigStore for RedisStore {
    async fn fetch_target(&self, id: &SerialNumber) -> StoreResult<Target> {
        let mut conn = self.connection().await?;
        self.load_target(&mut conn, id).await
    }

    #[instrument(skip(self))]
    async fn fetch_all_targets(&self) -> StoreResult<ConfigSet> {
        let mut conn = self.connection().await?;
        let pattern = format!("{}_heapster_*", self.prefix);
        let keys: Vec<String> = conn.keys(&pattern).await?;
        let key_prefix = format!("{}_heapster_", self.prefix);

        let mut set = ConfigSet::new();
        for key in keys {
            let Some(id) = key.strip_prefix(&key_prefix) else {
                continue;
            };
            match self.load_target(&mut conn, &SerialNumber::from(id)).await {
                Ok(target) => {
                    set.insert(target);
                }
                Err(e) => warn!("skipping target {id}: {e}"),
            }
        }
        trace!("loaded {} targets from redis", set.len());
        Ok(set)
    }

    async fn fetch_group(&self, id: &SerialNumber) -> StoreResult<Group> {
        let mut conn = self.connection().await?;
        let (group, version): (Group, u64) = self
            .read_record(&mut conn, &self.group_key(id), &format!("group {id}"))
            .await?;
        Ok(Group {
            id: id.clone(),
            version,
            ..group
        })
    }

    async fn fetch_notifier(&self, id: &SerialNumber) -> StoreResult<NotifierRef> {
        let mut conn = self.connection().await?;
        let (notifier, version): (NotifierRef, u64) = self
            .read_record(&mut conn, &self.notifier_key(id), &format!("notifier {id}"))
            .await?;
        Ok(NotifierRef {
            id: id.clone(),
            version,
            ..notifier
        })
    }
}

#[async_trait]
impl ReportFeed for RedisStore {
    async fn fetch_reports(
        &self,
        target: &SerialNumber,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> StoreResult<Vec<Report>> {
        let mut conn = self.connection().await?;
        let raw: Vec<String> = redis::cmd("ZRANGEBYSCORE")
            .arg(self.report_key(target))
            .arg(format!("({}", since.timestamp_millis()))
            .arg(until.timestamp_millis())
            .query_async(&mut conn)
            .await?;

        raw.iter()
            .map(|entry| serde_json::from_str(entry).map_err(StoreError::from))
            .collect()
    }
}

#[async_trait]
impl ReportRecorder for RedisStore {
    async fn record_report(&self, report: Report) -> StoreResult<()> {
        let key = self.report_key(&report.target);
        let score = report.timestamp.timestamp_millis();
        let cutoff = score - REPORT_RETENTION.as_millis() as i64;
        let data = serde_json::to_string(&report)?;

        let mut conn = self.connection().await?;
        redis::pipe()
            .atomic()
            .zadd(&key, data, score)
            .ignore()
            .zrembyscore(&key, "-inf", cutoff)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl StatusStore for RedisStore {
    async fn set_status(&self, target: &SerialNumber, status: HealthyStatus) -> StoreResult<()> {
        let mut conn = self.connection().await?;
        let _: () = conn
            .hset(self.target_key(target), "status", status.as_str())
            .await?;
        Ok(())
    }

    async fn get_status(&self, target: &SerialNumber) -> HealthyStatus {
        let Ok(mut conn) = self.connection().await else {
            return HealthyStatus::Unknown;
        };
        let raw: Option<String> = conn
            .hget(self.target_key(target), "status")
            .await
            .unwrap_or_default();
        raw.and_then(|s| s.parse().ok()).unwrap_or_default()
    }
}

#[async_trait]
impl CounterStore for RedisStore {
    async fn incr_with_expiry(&self, key: &str, window: Duration) -> StoreResult<u64> {
        let mut conn = self.connection().await?;
        let count: u64 = INCR_WITH_EXPIRY
            .key(self.counter_key(key))
            .arg(window_millis(window))
            .invoke_async(&mut conn)
            .await?;
        debug!("rate limit counter {key} at {count}");
        Ok(count)
    }
}

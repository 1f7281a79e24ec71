use std::time::Duration;

const DEFAULT_RECONCILE_INTERVAL: u64 = 30;

pub fn get_default_reconcile_interval() -> u64 {
    DEFAULT_RECONCILE_INTERVAL
}

/// (De)serialize a [`Duration`] as an integer amount of milliseconds.
pub mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Milliseconds of a duration, clamped to at least one.
///
/// Redis rejects a zero `PEXPIRE`.
pub fn window_millis(window: Duration) -> u64 {
    (window.as_millis() as u64).max(1)
}

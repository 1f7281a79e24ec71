//! Shared stores backing configuration, reports and health status
//!
//! ## Design
//!
//! - **Trait-based**: the core depends on [`ConfigStore`], [`ReportFeed`],
//!   [`ReportRecorder`] and [`StatusStore`] only
//! - **Async**: every operation is async for use from Tokio tasks
//!
//! ## Backends
//!
//! - **Memory**: single process, used by tests and static deployments
//! - **Redis** (feature `redis-store`): shared between hub processes; also
//!   serves as the rate limiter's counter store
//!
//! ## Usage
//!
//! ```no_run
//! use game_health::storage::{StatusStore, memory::MemoryStore};
//! use game_health::models::{HealthyStatus, SerialNumber};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = MemoryStore::new();
//!     store.set_status(&SerialNumber::from("lobby"), HealthyStatus::Green).await?;
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod error;
pub mod memory;
#[cfg(feature = "redis-store")]
pub mod redis;

pub use backend::{
    ConfigStore, ReportFeed, ReportRecorder, StatusStore, fetch_target_groups,
    fetch_target_notifiers,
};
pub use error::{StoreError, StoreResult};

/// Key prefix of every record in a shared store
pub const DEFAULT_PREFIX: &str = "gamehealthy";

pub mod actors;
pub mod api;
pub mod config;
pub mod detectors;
pub mod error;
pub mod models;
pub mod notifiers;
pub mod ratelimit;
pub mod storage;
pub mod util;

pub use error::{Error, Result};

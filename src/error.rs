//! Error types for activating and controlling monitored targets
//!
//! Only construction-time and start/stop contract violations surface as
//! [`Error`]. Transient I/O failures inside a running loop are logged where
//! they happen and never reach the caller.

use std::fmt;

use crate::models::SerialNumber;
use crate::storage::StoreError;

/// Result type alias for activation and loop control
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    /// Target failed validation (empty id, port out of range, ...)
    InvalidTarget(String),

    /// No detector is registered for the target's check kind
    UnknownCheckKind(String),

    /// No notifier is registered for this kind
    UnknownNotifierKind(String),

    /// Notifier record is present but its configuration is unusable
    InvalidNotifier { id: SerialNumber, reason: String },

    /// `turn_on` was called on a loop that is already running
    AlreadyRunning(SerialNumber),

    /// `turn_on` was called on a loop that has been turned off
    AlreadyStopped(SerialNumber),

    /// No running loop exists for this target
    NotRunning(SerialNumber),

    /// Configuration store lookup failed during activation
    Store(StoreError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidTarget(msg) => write!(f, "invalid target: {}", msg),
            Error::UnknownCheckKind(kind) => write!(f, "unknown check kind '{}'", kind),
            Error::UnknownNotifierKind(kind) => write!(f, "unknown notifier kind '{}'", kind),
            Error::InvalidNotifier { id, reason } => {
                write!(f, "invalid notifier {}: {}", id, reason)
            }
            Error::AlreadyRunning(id) => write!(f, "alert loop for {} already running", id),
            Error::AlreadyStopped(id) => write!(f, "alert loop for {} already stopped", id),
            Error::NotRunning(id) => write!(f, "no running alert loop for {}", id),
            Error::Store(err) => write!(f, "configuration store error: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        Error::Store(err)
    }
}

//! Error taxonomy for the resilience core.
//!
//! Configuration errors are fatal at construction time. Transient
//! connection errors are absorbed and retried internally. Exceeding a
//! retry ceiling is surfaced as an event to the caller, never as a crash.

use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WardenError {
    /// Invalid configuration (empty endpoint set, missing executable path).
    /// Fatal at construction time.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A connection-level failure that is retried per the backoff policy.
    #[error("transient connection error: {0}")]
    Transient(#[from] io::Error),

    /// A logical connection gave up after the configured number of
    /// consecutive failures. Callers may re-issue `connect` to restart.
    #[error("retry ceiling of {ceiling} reached for service '{service}'")]
    RetryCeilingExceeded { service: String, ceiling: u32 },
}

pub type Result<T> = std::result::Result<T, WardenError>;

//! Warden — resilience core
//!
//! Two subsystems that solve the same general problem: keeping a
//! dependent connection or process alive despite unreliable externals.
//!
//! ## Core Modules
//! - `resilience`: backoff policy and endpoint rotation (pure leaves)
//! - `conn`: connection session and multi-endpoint connection manager
//! - `watchdog`: process supervisor with restart throttling and a
//!   liveness probe
//! - `config`: serde-backed runtime configuration
//!
//! The core does not interpret payloads flowing over its connections,
//! does not implement the remote service's wire protocol, and does not
//! persist connection state across process restarts.

pub mod config;
pub mod conn;
pub mod error;
pub mod resilience;
pub mod watchdog;

pub use conn::{
    ConnState, ConnectionManager, Dialer, ManagerConfig, ManagerEvent, ServiceStatus, Session,
    SessionEvent, TcpDialer,
};
pub use error::WardenError;
pub use resilience::{BackoffPolicy, EndpointRotator};
pub use watchdog::{Watchdog, WatchdogConfig};

//! Resilient multi-endpoint connection management:
//! - Session: exclusive owner of one transport connection
//! - Manager: per-service state machine over rotator + backoff + session

pub mod manager;
pub mod session;

pub use manager::{ConnState, ConnectionManager, ManagerConfig, ManagerEvent, ServiceStatus};
pub use session::{Dialer, Session, SessionEvent, TcpDialer};

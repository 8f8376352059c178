//! Resilience primitives shared by the connection manager and watchdog:
//! - Exponential backoff between retries
//! - Endpoint rotation across backend nodes

pub mod backoff;
pub mod rotator;

pub use backoff::BackoffPolicy;
pub use rotator::EndpointRotator;

//! Process supervision: keep one worker process alive across crashes,
//! throttle restarts, detect silent deaths, shut down cleanly on signals.

pub mod log;
pub mod supervisor;

pub use log::EventLog;
pub use supervisor::{Watchdog, WatchdogConfig};

//! Runtime configuration loaded from JSON files
//!
//! Settings structs mirror the core config types with flat integer
//! durations so files stay editable by hand; `into_config` converts into
//! the typed forms.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::conn::ManagerConfig;
use crate::error::WardenError;
use crate::resilience::BackoffPolicy;
use crate::watchdog::WatchdogConfig;

/// Connection manager settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerSettings {
    /// Candidate backend endpoints, tried in order with rotation
    pub endpoints: Vec<String>,

    /// Per-attempt connection timeout (seconds)
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Consecutive failures before a logical connection gives up
    #[serde(default = "default_retry_ceiling")]
    pub retry_ceiling: u32,

    /// Initial backoff delay (milliseconds)
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Backoff cap (seconds)
    #[serde(default = "default_backoff_max_secs")]
    pub backoff_max_secs: u64,

    /// Backoff growth factor
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
}

impl ManagerSettings {
    pub fn into_config(self) -> ManagerConfig {
        ManagerConfig {
            endpoints: self.endpoints,
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            backoff: BackoffPolicy {
                base: Duration::from_millis(self.backoff_base_ms),
                max: Duration::from_secs(self.backoff_max_secs),
                factor: self.backoff_factor,
            },
            retry_ceiling: self.retry_ceiling,
        }
    }
}

/// Watchdog settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchdogSettings {
    /// Worker executable path
    pub command: PathBuf,

    /// Worker argument list
    #[serde(default)]
    pub args: Vec<String>,

    /// Fixed delay before each restart (seconds)
    #[serde(default = "default_restart_delay_secs")]
    pub restart_delay_secs: u64,

    /// Liveness probe interval (seconds)
    #[serde(default = "default_liveness_interval_secs")]
    pub liveness_interval_secs: u64,

    /// Restarts allowed within one reset window
    #[serde(default = "default_max_restarts")]
    pub max_restarts: u32,

    /// Rolling restart window (seconds)
    #[serde(default = "default_reset_window_secs")]
    pub reset_window_secs: u64,

    /// Exit codes treated as intentional shutdown
    #[serde(default = "default_clean_exit_codes")]
    pub clean_exit_codes: Vec<i32>,

    /// Append-only event log path
    #[serde(default = "default_log_path")]
    pub log_path: PathBuf,
}

impl WatchdogSettings {
    /// Settings for a worker given on the command line, with defaults
    /// everywhere else.
    pub fn for_command(command: PathBuf, args: Vec<String>) -> Self {
        Self {
            command,
            args,
            restart_delay_secs: default_restart_delay_secs(),
            liveness_interval_secs: default_liveness_interval_secs(),
            max_restarts: default_max_restarts(),
            reset_window_secs: default_reset_window_secs(),
            clean_exit_codes: default_clean_exit_codes(),
            log_path: default_log_path(),
        }
    }

    pub fn load(path: &Path) -> Result<Self, WardenError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            WardenError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        serde_json::from_str(&contents).map_err(|e| {
            WardenError::Configuration(format!("invalid config {}: {e}", path.display()))
        })
    }

    pub fn into_config(self) -> WatchdogConfig {
        WatchdogConfig {
            command: self.command,
            args: self.args,
            restart_delay: Duration::from_secs(self.restart_delay_secs),
            liveness_interval: Duration::from_secs(self.liveness_interval_secs),
            max_restarts: self.max_restarts,
            reset_window: Duration::from_secs(self.reset_window_secs),
            clean_exit_codes: self.clean_exit_codes,
            log_path: self.log_path,
        }
    }
}

// Default value functions

fn default_connect_timeout_secs() -> u64 {
    5
}

fn default_retry_ceiling() -> u32 {
    10
}

fn default_backoff_base_ms() -> u64 {
    500
}

fn default_backoff_max_secs() -> u64 {
    30
}

fn default_backoff_factor() -> f64 {
    2.0
}

fn default_restart_delay_secs() -> u64 {
    5
}

fn default_liveness_interval_secs() -> u64 {
    30
}

fn default_max_restarts() -> u32 {
    10
}

fn default_reset_window_secs() -> u64 {
    3600
}

fn default_clean_exit_codes() -> Vec<i32> {
    vec![0]
}

fn default_log_path() -> PathBuf {
    PathBuf::from("watchdog.log")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watchdog_settings_defaults() {
        let settings: WatchdogSettings =
            serde_json::from_str(r#"{ "command": "/usr/bin/worker" }"#).unwrap();

        assert_eq!(settings.restart_delay_secs, 5);
        assert_eq!(settings.max_restarts, 10);
        assert_eq!(settings.reset_window_secs, 3600);
        assert_eq!(settings.clean_exit_codes, vec![0]);

        let config = settings.into_config();
        assert_eq!(config.restart_delay, Duration::from_secs(5));
        assert_eq!(config.reset_window, Duration::from_secs(3600));
    }

    #[test]
    fn test_manager_settings_roundtrip() {
        let settings: ManagerSettings = serde_json::from_str(
            r#"{
                "endpoints": ["a:7000", "b:7000"],
                "backoff_base_ms": 250,
                "retry_ceiling": 4
            }"#,
        )
        .unwrap();

        let config = settings.into_config();
        assert_eq!(config.endpoints.len(), 2);
        assert_eq!(config.backoff.base, Duration::from_millis(250));
        assert_eq!(config.retry_ceiling, 4);
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_load_missing_file_is_configuration_error() {
        let err = WatchdogSettings::load(Path::new("/no/such/config.json")).unwrap_err();
        assert!(matches!(err, WardenError::Configuration(_)));
    }
}

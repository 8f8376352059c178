//! Process supervisor (watchdog)
//!
//! Keeps exactly one externally-specified worker process alive across
//! crashes while bounding restart frequency with a rolling window. A
//! periodic liveness probe checks OS-level process existence only — it is
//! a redundancy against races with the exit handler, not an
//! application-level health check. Operator-initiated shutdown forwards
//! the termination to the child and exits without scheduling a restart.

use std::future::Future;
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::time::Instant;
use tracing::warn;

use crate::error::WardenError;
use crate::watchdog::log::EventLog;

/// Grace period between SIGTERM and SIGKILL during shutdown.
const TERM_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct WatchdogConfig {
    /// Worker executable path
    pub command: PathBuf,
    /// Worker argument list
    pub args: Vec<String>,
    /// Fixed delay before each restart
    pub restart_delay: Duration,
    /// Interval of the OS-level liveness probe
    pub liveness_interval: Duration,
    /// Restarts allowed within one reset window
    pub max_restarts: u32,
    /// Rolling window after which the restart counter resets
    pub reset_window: Duration,
    /// Exit codes that stop the supervisor instead of restarting
    pub clean_exit_codes: Vec<i32>,
    /// Append-only event log path
    pub log_path: PathBuf,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            command: PathBuf::new(),
            args: Vec::new(),
            restart_delay: Duration::from_secs(5),
            liveness_interval: Duration::from_secs(30),
            max_restarts: 10,
            reset_window: Duration::from_secs(3600),
            clean_exit_codes: vec![0],
            log_path: PathBuf::from("watchdog.log"),
        }
    }
}

/// Supervises one child process for the lifetime of the program run.
///
/// One instance per program; constructed explicitly and handed to the
/// entrypoint rather than living in a global.
#[derive(Debug)]
pub struct Watchdog {
    config: WatchdogConfig,
    log: EventLog,
    restart_count: u32,
    window_start: Instant,
    last_liveness_at: Instant,
}

impl Watchdog {
    pub fn new(config: WatchdogConfig) -> Result<Self, WardenError> {
        if config.command.as_os_str().is_empty() {
            return Err(WardenError::Configuration(
                "worker executable path is empty".to_string(),
            ));
        }
        let log = EventLog::open(&config.log_path).map_err(|e| {
            WardenError::Configuration(format!(
                "cannot open watchdog log {}: {e}",
                config.log_path.display()
            ))
        })?;

        let now = Instant::now();
        Ok(Self {
            config,
            log,
            restart_count: 0,
            window_start: now,
            last_liveness_at: now,
        })
    }

    /// Timestamp of the last successful liveness probe.
    pub fn last_liveness_at(&self) -> Instant {
        self.last_liveness_at
    }

    /// Supervise the worker until it exits cleanly or `shutdown`
    /// resolves. Returns the supervisor's own exit code.
    pub async fn run(&mut self, shutdown: impl Future<Output = ()>) -> Result<i32, WardenError> {
        tokio::pin!(shutdown);

        self.window_start = Instant::now();
        self.restart_count = 0;

        let mut child = self.spawn_child()?;
        let mut probe = tokio::time::interval(self.config.liveness_interval);
        probe.reset();

        loop {
            let status = tokio::select! {
                res = child.wait() => match res {
                    Ok(status) => status,
                    Err(e) => {
                        self.log.record(&format!("failed to reap child: {e}"));
                        return Err(WardenError::Transient(e));
                    }
                },
                _ = probe.tick() => {
                    match child.try_wait() {
                        Ok(None) => {
                            self.last_liveness_at = Instant::now();
                            continue;
                        }
                        Ok(Some(status)) => {
                            self.log.record("liveness probe found child gone");
                            status
                        }
                        Err(e) => {
                            warn!(error = %e, "liveness probe failed");
                            continue;
                        }
                    }
                },
                _ = &mut shutdown => {
                    self.log.record("termination requested, stopping child");
                    self.terminate_child(&mut child).await;
                    self.log.record("supervisor exiting (code 0)");
                    return Ok(0);
                },
            };

            if self.is_clean_exit(&status) {
                self.log.record(&format!(
                    "child exited cleanly ({}), not restarting",
                    describe_exit(&status)
                ));
                return Ok(0);
            }

            self.log
                .record(&format!("child crashed ({})", describe_exit(&status)));

            if !self.throttle(&mut shutdown).await {
                self.log.record("supervisor exiting (code 0)");
                return Ok(0);
            }
            child = self.spawn_child()?;
        }
    }

    fn spawn_child(&mut self) -> Result<Child, WardenError> {
        let mut command = Command::new(&self.config.command);
        command
            .args(&self.config.args)
            // Environment passes through unmodified, plus richer crash
            // diagnostics for the worker
            .env("RUST_BACKTRACE", "full")
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let child = command.spawn().map_err(|e| {
            WardenError::Configuration(format!(
                "cannot launch worker {}: {e}",
                self.config.command.display()
            ))
        })?;

        self.log.record(&format!(
            "started worker {} (pid {})",
            self.config.command.display(),
            child.id().map_or_else(|| "?".to_string(), |p| p.to_string())
        ));
        Ok(child)
    }

    /// Restart throttling: a rolling counter gates whether the restart
    /// happens after the fixed delay or waits out the rest of the window.
    ///
    /// Returns `false` if a termination request arrived while waiting.
    async fn throttle<F>(&mut self, shutdown: &mut Pin<&mut F>) -> bool
    where
        F: Future<Output = ()>,
    {
        let now = Instant::now();
        if now.duration_since(self.window_start) > self.config.reset_window {
            self.window_start = now;
            self.restart_count = 0;
        }

        if self.restart_count >= self.config.max_restarts {
            let remaining = self
                .config
                .reset_window
                .saturating_sub(now.duration_since(self.window_start));
            self.log.record(&format!(
                "restart ceiling of {} reached, cooling down for {}s",
                self.config.max_restarts,
                remaining.as_secs()
            ));

            tokio::select! {
                _ = tokio::time::sleep(remaining) => {}
                _ = shutdown.as_mut() => {
                    self.log.record("termination requested during cooldown");
                    return false;
                }
            }
            self.window_start = Instant::now();
            self.restart_count = 0;
        }

        self.log.record(&format!(
            "restarting worker in {}ms (restart {} of {} in window)",
            self.config.restart_delay.as_millis(),
            self.restart_count + 1,
            self.config.max_restarts
        ));

        tokio::select! {
            _ = tokio::time::sleep(self.config.restart_delay) => {}
            _ = shutdown.as_mut() => {
                self.log.record("termination requested during restart delay");
                return false;
            }
        }

        self.restart_count += 1;
        true
    }

    /// Forward SIGTERM to the child, escalate to SIGKILL if it does not
    /// exit within the grace period.
    async fn terminate_child(&mut self, child: &mut Child) {
        if let Some(pid) = child.id() {
            // SAFETY: plain kill(2) on the child's pid
            unsafe {
                libc::kill(pid as libc::pid_t, libc::SIGTERM);
            }
        }

        match tokio::time::timeout(TERM_GRACE, child.wait()).await {
            Ok(Ok(status)) => {
                self.log
                    .record(&format!("child stopped ({})", describe_exit(&status)));
            }
            _ => {
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "failed to kill unresponsive child");
                }
                self.log.record("child killed after grace period");
            }
        }
    }

    fn is_clean_exit(&self, status: &ExitStatus) -> bool {
        status
            .code()
            .is_some_and(|code| self.config.clean_exit_codes.contains(&code))
    }
}

fn describe_exit(status: &ExitStatus) -> String {
    match (status.code(), status.signal()) {
        (Some(code), _) => format!("exit code {code}"),
        (None, Some(sig)) => format!("signal {sig}"),
        (None, None) => "unknown exit".to_string(),
    }
}

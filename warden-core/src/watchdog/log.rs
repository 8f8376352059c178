//! Append-only watchdog event log
//!
//! One line per event, `[<ISO-8601 timestamp>] WATCHDOG: <message>`,
//! mirrored to the console via `tracing`. The file survives supervisor
//! restarts, so restart/crash history is available for post-mortems.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use chrono::{SecondsFormat, Utc};
use tracing::{info, warn};

#[derive(Debug)]
pub struct EventLog {
    file: File,
}

impl EventLog {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file })
    }

    /// Append one event line and mirror it to the console.
    pub fn record(&mut self, message: &str) {
        info!(target: "watchdog", "{message}");

        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        if let Err(e) = writeln!(self.file, "[{timestamp}] WATCHDOG: {message}") {
            warn!(error = %e, "failed to append to watchdog log");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    #[test]
    fn test_lines_carry_prefix_and_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("watchdog.log");

        let mut log = EventLog::open(&path).unwrap();
        log.record("child started");
        log.record("child crashed (exit code 1)");

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        for line in &lines {
            let close = line.find(']').unwrap();
            let timestamp = &line[1..close];
            DateTime::parse_from_rfc3339(timestamp).unwrap();
            assert!(line[close..].starts_with("] WATCHDOG: "));
        }
        assert!(lines[0].ends_with("child started"));
        assert!(lines[1].ends_with("child crashed (exit code 1)"));
    }

    #[test]
    fn test_reopen_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("watchdog.log");

        EventLog::open(&path).unwrap().record("first run");
        EventLog::open(&path).unwrap().record("second run");

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }
}

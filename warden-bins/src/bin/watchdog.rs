//! Watchdog binary
//!
//! Supervises one worker process: restarts it on crashes (throttled by a
//! rolling window), probes for silent deaths, and shuts down cleanly on
//! SIGINT/SIGTERM. Exits 0 after a clean child exit or an
//! operator-initiated shutdown.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use warden_bins::common::init_logging;
use warden_core::config::WatchdogSettings;
use warden_core::Watchdog;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// JSON configuration file with watchdog settings
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Worker executable to supervise (when no config file is given)
    #[arg(required_unless_present = "config")]
    command: Option<PathBuf>,

    /// Arguments passed through to the worker
    #[arg(trailing_var_arg = true)]
    worker_args: Vec<String>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level)?;

    let settings = match args.config {
        Some(path) => WatchdogSettings::load(&path)?,
        None => WatchdogSettings::for_command(
            args.command.unwrap_or_default(),
            args.worker_args.clone(),
        ),
    };

    let config = settings.into_config();
    tracing::info!(
        worker = %config.command.display(),
        log = %config.log_path.display(),
        "starting watchdog"
    );
    let mut watchdog = Watchdog::new(config)?;

    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let shutdown = async move {
        tokio::select! {
            _ = sigterm.recv() => {}
            _ = sigint.recv() => {}
        }
    };

    let code = watchdog.run(shutdown).await?;
    std::process::exit(code);
}

mod config;
mod csv;
mod describe;
mod events;
mod format;
mod hooks;
mod host;
mod resolver;
mod session;
mod ticket;

use clap::Parser;
use std::path::PathBuf;
use tokio::io::AsyncBufReadExt;

use crate::config::TimeTrackingConfig;
use crate::events::HostEvent;
use crate::hooks::Tracker;
use crate::host::StorageHost;

/// A hook shim for an AI coding-agent host: reads lifecycle and tool-usage
/// events as JSON lines on stdin, aggregates per-session usage, and appends
/// a time entry to a CSV log when a session goes idle. Toast requests go
/// out as JSON lines on stdout; diagnostics go to stderr.
#[derive(Parser, Debug)]
#[command(name = "timesmith", version, about)]
struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "time-tracking.json")]
    config: PathBuf,

    /// Project root for relative CSV paths and .env lookup (default: cwd)
    #[arg(long)]
    project_root: Option<PathBuf>,

    /// Host storage directory (default: ~/.local/share/opencode/storage)
    #[arg(long)]
    storage: Option<PathBuf>,

    /// Validate config and print resolved settings, don't run
    #[arg(long)]
    dry_run: bool,

    /// Extra logging (event dispatch, extraction attempts)
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let project_root = cli
        .project_root
        .clone()
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));

    // A missing or invalid config means the tracker stays inactive; the
    // host keeps running without us.
    let config = match TimeTrackingConfig::load(&cli.config, &project_root) {
        Ok(config) => config,
        Err(e) => {
            tracing::info!(error = %e, "no usable config, time tracking inactive");
            return;
        }
    };

    if cli.dry_run {
        let csv_path = crate::csv::resolve_csv_path(&config.csv_file, &project_root);
        println!("timesmith v{}", env!("CARGO_PKG_VERSION"));
        println!("Config file: {}", cli.config.display());
        println!("CSV file:    {}", csv_path.display());
        println!("User:        {}", config.user_email);
        println!("Dry run mode — config validated, not running.");
        return;
    }

    let storage_root = cli.storage.clone().unwrap_or_else(StorageHost::default_root);
    let mut tracker = Tracker::new(config, StorageHost::new(storage_root), &project_root);
    tracker.activate();

    let stdin = tokio::io::stdin();
    let mut lines = tokio::io::BufReader::new(stdin).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<HostEvent>(line) {
                    Ok(event) => {
                        tracing::debug!(session_id = event.session_id(), "event received");
                        tracker.handle_event(event);
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, "skipping unrecognized event line");
                    }
                }
            }
            // EOF: the host closed our stdin, nothing more will arrive.
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "stdin read failed, shutting down");
                break;
            }
        }
    }
    tracing::info!("event stream closed, exiting");
}

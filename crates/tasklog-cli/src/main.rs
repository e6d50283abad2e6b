use std::fs::File;
use std::io::{self, BufReader};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tasklog_core::config::ConfigOverrides;
use tasklog_core::impls::{JsonFileStore, JsonLinesSource};
use tasklog_core::{MonitorConfig, StatsSnapshot, TaskMonitor};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Persist task lifecycle events into a result store, in batches.
#[derive(Debug, Parser)]
#[command(name = "tasklog", version)]
struct Args {
    /// Line-delimited JSON events to read (stdin when omitted).
    #[arg(short, long)]
    events: Option<PathBuf>,

    /// JSON result store file.
    #[arg(short, long, default_value = "tasklog.json")]
    store: PathBuf,

    /// Flush once this many records are buffered (overrides TASKLOG_BATCH_SIZE).
    #[arg(long)]
    batch_size: Option<usize>,

    /// Flush buffered records at least this often, in seconds
    /// (overrides TASKLOG_FLUSH_INTERVAL_SECS).
    #[arg(long)]
    flush_interval: Option<u64>,
}

fn load_config(args: &Args) -> Result<MonitorConfig> {
    let overrides = ConfigOverrides {
        batch_size: args.batch_size,
        flush_interval_secs: args.flush_interval,
    };
    MonitorConfig::from_env(overrides).context("invalid monitor configuration")
}

/// Runs on a blocking thread: `start` does not return until the source ends
/// or the monitor is stopped.
fn capture_events(mut monitor: TaskMonitor, events: Option<PathBuf>) -> Result<()> {
    match events {
        Some(path) => {
            let file = File::open(&path)
                .with_context(|| format!("opening events file {}", path.display()))?;
            monitor.start(&mut JsonLinesSource::new(BufReader::new(file)))?;
        }
        None => monitor.start(&mut JsonLinesSource::new(io::stdin().lock()))?,
    }
    Ok(())
}

async fn run(args: Args) -> Result<StatsSnapshot> {
    let config = load_config(&args)?;
    let store = JsonFileStore::new(&args.store);
    info!(store = %store.path().display(), "using result store");

    let monitor = TaskMonitor::new(config, store);
    let handle = monitor.handle();

    let mut capture = tokio::task::spawn_blocking(move || capture_events(monitor, args.events));

    tokio::select! {
        joined = &mut capture => {
            joined.context("capture thread panicked")??;
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("listening for ctrl-c")?;
            info!("interrupt received, flushing buffered records");
            let stopper = handle.clone();
            tokio::task::spawn_blocking(move || stopper.stop())
                .await
                .context("stop panicked")?;
        }
    }

    Ok(handle.stats())
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;

    let result = runtime.block_on(run(args));
    // A capture blocked on stdin may never return after ctrl-c; the monitor
    // has already flushed by then, so don't wait on it.
    runtime.shutdown_timeout(Duration::from_secs(1));

    let stats = result?;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

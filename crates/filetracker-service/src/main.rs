use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use filetracker_core::{
    approve, load_baseline, prepare_baseline, ApprovalOutcome, AuditSink, BaselineStore,
    DirectoryWatchManager, Monitor, NotifyBackend, TracingAuditSink, TrackerConfig, WatchedSet,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

mod logging;
mod privilege;

#[derive(Parser, Debug)]
#[command(author, version, about = "Filetracker host file integrity monitor", long_about = None)]
struct Cli {
    /// Approve the current content of a file and update the baseline
    #[arg(long, value_name = "PATH")]
    approve: Option<PathBuf>,

    /// JSON configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override the baseline snapshot location
    #[arg(long, value_name = "FILE")]
    baseline: Option<PathBuf>,

    /// Override the log file location
    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,

    /// Log to stderr instead of the log file
    #[arg(long)]
    stderr: bool,

    /// Print the effective configuration as JSON and exit
    #[arg(long)]
    show_config: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match resolve_config(&cli) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("filetracker: {err:#}");
            std::process::exit(2);
        }
    };

    if cli.show_config {
        match serde_json::to_string_pretty(&config) {
            Ok(json) => println!("{json}"),
            Err(err) => {
                eprintln!("filetracker: {err}");
                std::process::exit(1);
            }
        }
        return;
    }

    if let Err(err) = logging::init(&config.log_file, cli.stderr) {
        eprintln!("filetracker: cannot set up logging: {err:#}");
        std::process::exit(1);
    }

    let result = match &cli.approve {
        Some(path) => approve_command(&config, path),
        None => run_command(&config).await,
    };
    if let Err(err) = result {
        error!("fatal: {err:#}");
        std::process::exit(1);
    }
}

fn resolve_config(cli: &Cli) -> Result<TrackerConfig> {
    let mut config = match &cli.config {
        Some(path) => TrackerConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => TrackerConfig::default(),
    };
    if let Some(baseline) = &cli.baseline {
        config.baseline_path = baseline.clone();
    }
    if let Some(log_file) = &cli.log_file {
        config.log_file = log_file.clone();
    }
    config.validate()?;
    Ok(config)
}

fn approve_command(config: &TrackerConfig, path: &Path) -> Result<()> {
    if !privilege::is_elevated() {
        bail!("approval requires root privileges");
    }

    let audit = TracingAuditSink;
    let mut store = BaselineStore::new(&config.baseline_path);
    load_baseline(&mut store, &audit);

    match approve(&mut store, path, &audit).context("approving file")? {
        ApprovalOutcome::Approved(entry) => {
            println!("approved {} ({})", entry.path.display(), entry.hash);
            Ok(())
        }
        ApprovalOutcome::Rejected { path, reason } => Err(anyhow!(
            "approval rejected for {}: {reason}",
            path.display()
        )),
    }
}

async fn run_command(config: &TrackerConfig) -> Result<()> {
    let audit: Arc<dyn AuditSink> = Arc::new(TracingAuditSink);
    let ignore = config.ignore_rules();

    let mut store = BaselineStore::new(&config.baseline_path);
    if let Err(err) = prepare_baseline(&mut store, &config.roots, &ignore, audit.as_ref()) {
        // the in-memory baseline is still usable; only persistence failed
        error!(error = %err, "baseline could not be persisted");
    }

    let (backend, streams) =
        NotifyBackend::new(config.event_capacity).context("creating file watcher")?;
    let watches = DirectoryWatchManager::new(backend, Arc::new(WatchedSet::new()));
    let mut monitor = Monitor::new(store, ignore, config.debounce(), watches, audit);
    monitor.watch_roots(&config.roots);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_shutdown().await;
        info!("service stopping");
        let _ = shutdown_tx.send(true);
    });

    info!(roots = config.roots.len(), "service started");
    monitor.run(streams.events, streams.errors, shutdown_rx).await;
    Ok(())
}

/// Waits for SIGINT or SIGTERM.
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(error = %err, "cannot listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

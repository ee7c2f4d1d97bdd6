use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, warn, LevelFilter};
use recflow::{
    config::DEFAULT_CONFIG_PATH, Config, Dispatcher, FfmpegTools, IngestServer, JobStore, NotificationHandler,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Recording post-processing daemon
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (JSON or TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logger - use RUST_LOG env var or default to info level
    let mut logger = env_logger::Builder::from_default_env();
    logger.format_timestamp_secs();
    if args.verbose {
        logger.filter_level(LevelFilter::Debug);
    } else if std::env::var_os("RUST_LOG").is_none() {
        logger.filter_level(LevelFilter::Info);
    }
    logger.init();

    let config_path = args.config.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let cfg = Config::load_config(Some(&config_path)).context("Failed to load configuration")?;

    info!("recflowd starting");
    info!("Configuration loaded from {}:", config_path.display());
    info!("  Socket: {}", cfg.socket_path.display());
    info!("  State file: {}", cfg.state_path.display());
    info!("  ffmpeg: {}", cfg.transcoding.ffmpeg_bin.display());
    info!("  Only SD: {}", cfg.transcoding.only_sd);
    info!(
        "  Notifications: {}",
        if cfg.notifications.pushover.is_some() { "pushover" } else { "none" }
    );

    if let Some(parent) = cfg.state_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create state directory: {}", parent.display()))?;
    }

    // Pending jobs from the last run are replayed before anything new is accepted
    let (store, queue) = JobStore::open(&cfg.state_path)
        .await
        .with_context(|| format!("Failed to open job store: {}", cfg.state_path.display()))?;
    let store = Arc::new(store);

    let server = IngestServer::bind(&cfg.socket_path, store.clone())?;

    let tools = Arc::new(FfmpegTools::new(&cfg.transcoding));
    let (config_tx, config_rx) = watch::channel(Arc::new(cfg));
    let notifier = Arc::new(NotificationHandler::new(config_rx.clone()));
    let dispatcher = Dispatcher::new(store, queue, tools, notifier, config_rx);

    let cancel = CancellationToken::new();
    let ingest_handle = tokio::spawn(server.run(cancel.clone()));
    let dispatch_handle = tokio::spawn(dispatcher.run(cancel.clone()));
    let reload_handle = tokio::spawn(reload_on_hangup(config_path, config_tx, cancel.clone()));

    wait_for_shutdown().await?;
    info!("Shutdown requested, waiting for the current job to finish");
    cancel.cancel();

    if let Err(e) = ingest_handle.await {
        error!("Ingestion task failed: {}", e);
    }
    if let Err(e) = dispatch_handle.await {
        error!("Dispatch task failed: {}", e);
    }
    if let Err(e) = reload_handle.await {
        error!("Reload task failed: {}", e);
    }

    info!("recflowd stopped");
    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    let mut terminate = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res.context("Failed to listen for SIGINT")?,
        _ = terminate.recv() => {}
    }
    Ok(())
}

/// Re-read the configuration on SIGHUP. Jobs already running keep their snapshot.
async fn reload_on_hangup(path: PathBuf, tx: watch::Sender<Arc<Config>>, cancel: CancellationToken) {
    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(s) => s,
        Err(e) => {
            warn!("Config reload disabled, failed to install SIGHUP handler: {}", e);
            return;
        }
    };

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            received = hangup.recv() => {
                if received.is_none() {
                    break;
                }
                reload(&path, &tx);
            }
        }
    }
}

fn reload(path: &Path, tx: &watch::Sender<Arc<Config>>) {
    let current = tx.borrow().clone();
    match Config::load_config(Some(path)) {
        Ok(cfg) => {
            if cfg.socket_path != current.socket_path || cfg.state_path != current.state_path {
                warn!("Socket and state paths only change on restart");
            }
            info!("Configuration reloaded from {}", path.display());
            tx.send_replace(Arc::new(cfg));
        }
        Err(e) => error!("Failed to reload configuration, keeping the previous one: {:#}", e),
    }
}

/*
updeck - single-binary main.rs
This binary starts the Rocket HTTP server and runs the purge worker inside the same process.
*/

use anyhow::{Context, Result};
use clap::Parser;
use common::Config;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use updeck::ingestion::FeedFetcher;
use updeck::purge::{self, purge_prefix, run_purger};
use updeck::server::{launch_rocket, AppState};
use updeck::storage::{AzureBlobStore, BlobStore};

#[derive(Parser, Debug)]
#[command(name = "updeck", about = "Updeck single-binary server + purge worker")]
struct Args {
    /// Path to config.toml
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Disable the scheduled purge worker (run server only)
    #[arg(long)]
    no_purger: bool,

    /// Run a single purge and exit (do not bind HTTP server)
    #[arg(long)]
    purge_once: bool,

    /// Override log level (info, debug, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let config = Arc::new(load_config(args.config).await?);

    let store: Arc<dyn BlobStore> = Arc::new(
        AzureBlobStore::from_config(&config.storage).context("failed to initialize blob storage")?,
    );
    info!(store = %store.describe(), "blob storage ready");

    if args.purge_once {
        let prefix = purge_prefix(&config);
        let report = purge::run_once(store.as_ref(), &prefix).await?;
        if !report.is_clean() {
            anyhow::bail!("{} blob(s) could not be deleted", report.failed.len());
        }
        return Ok(());
    }

    let fetcher = Arc::new(FeedFetcher::from_config(&config.feed).context("failed to build feed client")?);

    // Prepare a shutdown notifier to signal the purge worker
    let shutdown_notify = Arc::new(Notify::new());

    let mut purger_handle = None;
    if args.no_purger {
        info!("Purge worker disabled via CLI (--no-purger)");
    } else if !config.purge_enabled() {
        info!("Purge worker disabled in configuration");
    } else {
        info!("Spawning purge worker task");
        let p_store = store.clone();
        let p_cfg = config.clone();
        let p_shutdown = shutdown_notify.clone();
        purger_handle = Some(tokio::spawn(async move {
            let res = run_purger(p_store, p_cfg, p_shutdown).await;
            if let Err(e) = &res {
                error!(%e, "purge worker failed");
            }
            res
        }));
    }

    let state = AppState::new(config.clone(), fetcher, store);

    // Rocket handles Ctrl-C itself and returns once it has shut down.
    info!("Launching Rocket HTTP server");
    if let Err(e) = launch_rocket(state).await {
        error!(%e, "Rocket server failed");
    }

    info!("HTTP server stopped; notifying purge worker to shutdown");
    shutdown_notify.notify_one();

    if let Some(handle) = purger_handle {
        match tokio::time::timeout(Duration::from_secs(20), handle).await {
            Ok(Ok(Ok(()))) => info!("purge worker exited cleanly"),
            Ok(Ok(Err(e))) => error!(%e, "purge worker returned an error"),
            Ok(Err(join_err)) => error!(%join_err, "purge worker task panicked"),
            Err(_) => info!("Timed out waiting for purge worker to exit; continuing shutdown"),
        }
    }

    info!("Shutdown complete");
    Ok(())
}

/// `config.default.toml` merged with `--config FILE` (or `./config.toml`), then `UPDECK_*`
/// environment overrides.
async fn load_config(explicit: Option<PathBuf>) -> Result<Config> {
    let default_path = PathBuf::from("config.default.toml");

    let override_path = if let Some(p) = explicit {
        if !p.exists() {
            error!(path = ?p, "specified config file not found");
            return Err(anyhow::anyhow!("Config file not found: {}", p.display()));
        }
        Some(p)
    } else {
        let p = PathBuf::from("config.toml");
        if p.exists() { Some(p) } else { None }
    };

    let mut config = match Config::load_with_defaults(
        if default_path.exists() { Some(&default_path) } else { None },
        override_path.as_deref(),
    )
    .await
    {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(%e, "failed to load configuration");
            return Err(e);
        }
    };

    config.apply_env_overrides();
    config.validate().context("invalid configuration")?;

    info!(default = ?default_path, override = ?override_path, "configuration loaded");
    Ok(config)
}

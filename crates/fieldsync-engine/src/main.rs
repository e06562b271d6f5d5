/*
[INPUT]:  CLI arguments, YAML configuration file, OS shutdown signals
[OUTPUT]: Running sync engine with graceful shutdown
[POS]:    Binary entry point
[UPDATE]: When changing CLI flags, startup flow, or shutdown handling
*/

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use fieldsync_api::{StaticTokenProvider, SyncClient};
use fieldsync_engine::{LogNotifier, SyncConfig, TaskManager, TaskStore};

#[derive(Parser, Debug)]
#[command(name = "fieldsync", version, about = "Offline-first field data sync engine")]
struct Cli {
    #[arg(long = "config", value_name = "PATH")]
    config_path: PathBuf,
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(&args.log_level)?;

    info!(
        config_path = %args.config_path.display(),
        "starting fieldsync"
    );

    let config = load_config(&args.config_path)?;
    info!(
        base_url = %config.base_url,
        project_id = %config.project_id,
        "configuration loaded"
    );

    let store = Arc::new(
        TaskStore::open(config.data_dir())
            .await
            .context("open task store")?,
    );
    let client = SyncClient::new(
        &config.base_url,
        Arc::new(StaticTokenProvider::new(&config.auth_token)),
    )
    .context("build sync client")?;

    let manager = TaskManager::spawn(
        store,
        client,
        config.timing,
        Arc::new(LogNotifier),
        &config.project_id,
        &config.client_id,
    );

    let shutdown = manager.shutdown_token();
    setup_signal_handlers(shutdown.clone());

    manager.start();
    info!("sync engine started");

    shutdown.cancelled().await;
    info!("shutdown signal received");

    manager.stop();
    info!("sync engine shutdown complete");

    Ok(())
}

fn init_tracing(log_level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(log_level).context("invalid log level")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|err| anyhow!(err))
        .context("initialize tracing subscriber")?;
    Ok(())
}

fn load_config(path: &PathBuf) -> Result<SyncConfig> {
    let path_str = path.to_str().context("config path must be valid utf-8")?;
    SyncConfig::from_file(path_str).context("load config")
}

fn setup_signal_handlers(shutdown: CancellationToken) {
    let shutdown_clone = shutdown.clone();
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to install SIGINT handler");
            return;
        }
        info!("received SIGINT");
        shutdown_clone.cancel();
    });

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let shutdown_clone = shutdown.clone();
        tokio::spawn(async move {
            match signal(SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                    info!("received SIGTERM");
                    shutdown_clone.cancel();
                }
                Err(err) => {
                    warn!(error = %err, "failed to install SIGTERM handler");
                }
            }
        });
    }
}

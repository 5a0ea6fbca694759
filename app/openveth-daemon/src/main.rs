//! openveth daemon: HTTP management surface for the topology
//! orchestrator.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use openveth_container::Manager;
use openveth_core::{MemoryRepository, Repository, SqlRepository, StoreConfig};
use openveth_daemon::{server, AppState};
use openveth_net::NetworkManager;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "openveth-daemon")]
#[command(author, version, about, long_about = None)]
struct DaemonArgs {
    /// Listen address for the management API.
    #[arg(long, default_value = "0.0.0.0:8080")]
    listen: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "openveth=info,openveth_daemon=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    run(DaemonArgs::parse()).await
}

async fn run(args: DaemonArgs) -> Result<()> {
    info!("Starting openveth daemon...");

    let manager = Arc::new(Manager::new().context("Failed to create engine client")?);
    if let Err(e) = manager.test_connection().await {
        warn!("Engine daemon not reachable yet: {e}");
    }

    let repo = init_repository().await;

    let state = AppState {
        manager,
        network: NetworkManager::new(),
        repo,
    };

    server::run(&args.listen, state, shutdown_signal()).await?;

    info!("openveth daemon stopped");
    Ok(())
}

/// Opens the configured SQL store, falling back to the in-memory store
/// when initialization fails.
async fn init_repository() -> Arc<dyn Repository> {
    let config = match StoreConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            warn!("Invalid store configuration, falling back to memory: {e}");
            return Arc::new(MemoryRepository::new());
        }
    };

    match SqlRepository::connect(&config).await {
        Ok(repo) => {
            info!(driver = ?config.driver, "Connected to database");
            Arc::new(repo)
        }
        Err(e) => {
            warn!("Failed to initialize database, falling back to memory: {e}");
            Arc::new(MemoryRepository::new())
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

//! HTTP server entry point.

use anyhow::{Context, Result};
use std::future::Future;
use tokio::net::TcpListener;
use tracing::info;

use crate::api::{create_router, AppState};

/// Binds the listen address and serves the management API until
/// `shutdown` resolves.
pub async fn run(
    addr: &str,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let app = create_router(state);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Management API listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("Server error")?;

    Ok(())
}

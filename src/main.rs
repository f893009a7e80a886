//! conveyor-bridge server entry point.
//!
//! Acquires the controller, starts the Axum server, and releases the
//! controller on shutdown.

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use conveyor_bridge::api;
use conveyor_bridge::app_state::AppState;
use conveyor_bridge::config::BridgeConfig;
use conveyor_bridge::device::{DeviceHandle, DeviceLocator, SerialLocator};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing (LOG_FORMAT=json for structured output)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    // Load configuration
    let config =
        BridgeConfig::from_env().map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;
    tracing::info!(addr = %config.listen_addr, "starting conveyor-bridge");

    // Startup hook: acquire the controller if it is already attached
    let locator: Arc<dyn DeviceLocator> = Arc::new(SerialLocator::new(config.locator.clone()));
    let device = DeviceHandle::new(locator);
    if let Err(err) = device.ensure_open().await {
        tracing::warn!(error = %err, "controller not found at startup; will retry on demand");
    }

    let app_state = AppState {
        device: device.clone(),
        timing: config.timing,
    };
    let app = api::build_app(app_state);

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Shutdown hook
    device.close().await;
    tracing::info!("shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}

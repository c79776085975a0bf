//! Storefront server binary.

use adspace_storefront::config::Config;
use adspace_storefront::metrics::register_business_metrics;
use adspace_storefront::server::{AppState, build_router, state::build_services};
use adspace_storefront::sweep::spawn_sweep;
use anyhow::Context;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level)),
        )
        .init();

    tracing::info!("Starting adspace storefront");

    let metrics_addr: SocketAddr = format!(
        "{}:{}",
        config.server.metrics_host, config.server.metrics_port
    )
    .parse()
    .context("invalid metrics listen address")?;
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .context("failed to install metrics exporter")?;
    register_business_metrics();
    tracing::info!(%metrics_addr, "Metrics exporter listening");

    let services = build_services(config.holds.clone());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweep_handle = spawn_sweep(
        services.clone(),
        config.holds.sweep_interval(),
        shutdown_rx,
    );

    let app = build_router(AppState::new(services));
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("invalid listen address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, "Storefront listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("Shutting down");
    shutdown_tx.send(true).ok();
    if tokio::time::timeout(
        std::time::Duration::from_secs(config.server.shutdown_timeout),
        sweep_handle,
    )
    .await
    .is_err()
    {
        tracing::warn!("Sweep did not stop within the shutdown timeout");
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}

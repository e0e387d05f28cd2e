//! Gamma Spectroscopy Detector Control Server
//!
//! Binds the configured detectors, keeps their connectivity current and
//! serves the control API.

use anyhow::{Context, Result};
use gsd_adapters::SimulatedAdapter;
use gsd_core::DetectorConfig;
use gsd_server::{api, config::ServerConfig, monitor, state::AppState};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Starting gamma spectroscopy detector server");

    let config = ServerConfig::from_env()?;
    info!("Writing spectra to {}", config.output_dir.display());

    // Create application state and bind detectors
    let state = AppState::default();
    for name in &config.detectors {
        let detector_config = DetectorConfig::new(name.as_str(), config.operator.as_str())
            .with_output_dir(&config.output_dir);
        let detector = state
            .register_detector(detector_config, Box::new(SimulatedAdapter::new()))
            .with_context(|| format!("Failed to register detector {}", name))?;
        info!("Detector {} registered ({})", name, detector.status());
    }

    // Build the router
    let app = api::create_router(state.clone());

    // Start connectivity monitor in background
    let cancel = CancellationToken::new();
    let monitor_task = tokio::spawn(monitor::run(
        state.clone(),
        config.monitor_interval,
        cancel.clone(),
    ));

    // Start server
    info!("Server listening on http://{}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    cancel.cancel();
    monitor_task.await?;

    // Leave instruments in a safe state
    for detector in state.registry.all() {
        detector.disconnect();
    }
    info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

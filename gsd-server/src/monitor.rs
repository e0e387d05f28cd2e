//! Background connectivity monitor
//!
//! This module handles:
//! - Polling every registered detector for instrument reachability
//! - Flipping detectors whose instrument went away to `Off`
//! - Noticing acquisitions that reached their preset
//! - Broadcasting status transitions to subscribers

use crate::state::AppState;
use anyhow::Result;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Main monitor loop, runs until `cancel` fires
pub async fn run(state: AppState, interval: Duration, cancel: CancellationToken) {
    info!(
        "Connectivity monitor started ({} detectors, every {:?})",
        state.registry.len(),
        interval
    );

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = sleep(interval) => {}
        }

        if let Err(e) = poll_cycle(&state).await {
            error!("Error in connectivity poll: {}", e);
        }
    }

    info!("Connectivity monitor stopped");
}

/// Refresh every detector once, returning how many changed
///
/// Refreshing talks to hardware and takes detector locks, so it runs on the
/// blocking pool along with publishing the results.
pub async fn poll_cycle(state: &AppState) -> Result<usize> {
    let state = state.clone();
    let changed = tokio::task::spawn_blocking(move || {
        state.registry.refresh_all();
        state
            .registry
            .all()
            .iter()
            .filter_map(|d| state.publish(d).map(|link| (d.name().to_string(), link)))
            .collect::<Vec<_>>()
    })
    .await?;

    for (name, link) in &changed {
        info!(
            "Detector {} is now {} (connected: {})",
            name, link.status, link.connected
        );
    }
    Ok(changed.len())
}

//! Application state management

use chrono::{DateTime, Utc};
use gsd_core::{Detector, DetectorConfig, DetectorRegistry, DetectorStatus, HardwareAdapter, Link};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// All detectors this server controls
    pub registry: Arc<DetectorRegistry>,

    /// Broadcast channel for status transitions
    /// Multiple consumers can subscribe to receive events
    pub events_tx: broadcast::Sender<StatusEvent>,

    /// Last link published per detector, so each transition is sent once
    last_links: Arc<Mutex<HashMap<String, Link>>>,
}

/// A detector changed status or connection state
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub detector: String,
    pub status: DetectorStatus,
    pub connected: bool,
    pub timestamp: DateTime<Utc>,
}

impl AppState {
    pub fn new(registry: DetectorRegistry) -> Self {
        // Create broadcast channel with capacity for 100 events
        let (events_tx, _) = broadcast::channel(100);

        let last_links = registry
            .all()
            .iter()
            .map(|d| (d.name().to_string(), d.link()))
            .collect();

        Self {
            registry: Arc::new(registry),
            events_tx,
            last_links: Arc::new(Mutex::new(last_links)),
        }
    }

    /// Bind and register a detector, remembering its initial link
    pub fn register_detector(
        &self,
        config: DetectorConfig,
        adapter: Box<dyn HardwareAdapter>,
    ) -> gsd_core::Result<Arc<Detector>> {
        let detector = self.registry.register(config, adapter)?;
        self.last_links
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(detector.name().to_string(), detector.link());
        Ok(detector)
    }

    /// Broadcast the detector's current link if it differs from the last one
    /// published, returning it when it changed
    ///
    /// The link is read and sent under the publication lock, so concurrent
    /// publishers never send an older link after a newer one.
    pub fn publish(&self, detector: &Detector) -> Option<Link> {
        let mut last = self
            .last_links
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let link = detector.link();
        if last.get(detector.name()) == Some(&link) {
            return None;
        }
        last.insert(detector.name().to_string(), link);

        // Ignore error if no receivers (they'll see the next snapshot)
        let _ = self.events_tx.send(StatusEvent {
            detector: detector.name().to_string(),
            status: link.status,
            connected: link.connected,
            timestamp: Utc::now(),
        });
        Some(link)
    }

    /// Subscribe to status transitions
    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.events_tx.subscribe()
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(DetectorRegistry::new())
    }
}

//! Registry of detectors keyed by instrument name
//!
//! The registry is passed explicitly to whatever needs to look detectors up;
//! there is no process-wide instrument table. Each instrument name can be
//! bound to one detector only.

use crate::adapter::HardwareAdapter;
use crate::detector::{Detector, DetectorConfig, Link};
use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Debug, Default)]
pub struct DetectorRegistry {
    detectors: RwLock<BTreeMap<String, Arc<Detector>>>,
}

impl DetectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `adapter` to the instrument named in `config` and register it
    ///
    /// The name is checked before the detector is built, so a second binding
    /// to an instrument never opens a session with it.
    pub fn register(
        &self,
        config: DetectorConfig,
        adapter: Box<dyn HardwareAdapter>,
    ) -> Result<Arc<Detector>> {
        let mut detectors = self
            .detectors
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if detectors.contains_key(&config.name) {
            return Err(Error::DuplicateDetector(config.name));
        }
        let detector = Arc::new(Detector::new(config, adapter));
        detectors.insert(detector.name().to_string(), detector.clone());
        Ok(detector)
    }

    /// Register an already built detector, refusing a second binding to the
    /// same instrument. A refused detector is disconnected.
    pub fn insert(&self, detector: Detector) -> Result<Arc<Detector>> {
        let mut detectors = self
            .detectors
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if detectors.contains_key(detector.name()) {
            detector.disconnect();
            return Err(Error::DuplicateDetector(detector.name().to_string()));
        }
        let detector = Arc::new(detector);
        detectors.insert(detector.name().to_string(), detector.clone());
        Ok(detector)
    }

    /// Unregister a detector, disconnecting it
    pub fn remove(&self, name: &str) -> Result<Arc<Detector>> {
        let removed = self
            .detectors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .ok_or_else(|| Error::UnknownDetector(name.to_string()))?;
        removed.disconnect();
        Ok(removed)
    }

    pub fn get(&self, name: &str) -> Result<Arc<Detector>> {
        self.detectors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownDetector(name.to_string()))
    }

    /// All detectors, ordered by name
    pub fn all(&self) -> Vec<Arc<Detector>> {
        self.detectors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.detectors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.detectors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Refresh every detector, returning the link each one ended up with
    ///
    /// Detectors are refreshed outside the registry lock so a slow
    /// instrument does not block lookups.
    pub fn refresh_all(&self) -> Vec<(String, Link)> {
        self.all()
            .into_iter()
            .map(|d| (d.name().to_string(), d.refresh()))
            .collect()
    }
}

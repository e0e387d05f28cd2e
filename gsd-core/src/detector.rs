//! Detector acquisition state machine
//!
//! A [`Detector`] binds one [`HardwareAdapter`] to a named instrument and is
//! the only place that decides whether a lifecycle operation is legal:
//!
//! ```text
//!            connect                 start
//!   Off ─────────────▶ Ready ◀──────────────▶ Busy
//!    ▲                   │      pause/stop     │
//!    └───── disconnect ──┴─────────────────────┘
//! ```
//!
//! All mutable state sits behind one mutex. Caller operations and the
//! background [`refresh`](Detector::refresh) take the same lock, so status and
//! connection flag always change together and concurrent saves through one
//! detector are serialized. Elapsed time is never simulated locally; it is
//! whatever the adapter last reported.

use crate::adapter::HardwareAdapter;
use crate::error::{Error, Result};
use crate::model::{DetectorStatus, MeasurementDescriptor, SampleId, SpectrumMetadata};
use crate::naming::{NamingPolicy, DEFAULT_EXTENSION};
use crate::units::Seconds;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Directory spectra are written to when none is configured
pub fn default_output_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("gamma-spectra")
}

/// Construction parameters for a [`Detector`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectorConfig {
    /// Instrument name the detector binds to
    pub name: String,
    /// Operator recorded in every saved spectrum
    pub operator: String,
    pub output_dir: PathBuf,
    pub extension: String,
}

impl DetectorConfig {
    pub fn new(name: impl Into<String>, operator: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            operator: operator.into(),
            output_dir: default_output_dir(),
            extension: DEFAULT_EXTENSION.to_string(),
        }
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }
}

/// Status and connection flag, always read and written together
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub status: DetectorStatus,
    pub connected: bool,
}

impl Link {
    pub const OFF: Link = Link {
        status: DetectorStatus::Off,
        connected: false,
    };
    pub const READY: Link = Link {
        status: DetectorStatus::Ready,
        connected: true,
    };
    pub const BUSY: Link = Link {
        status: DetectorStatus::Busy,
        connected: true,
    };
}

/// Point-in-time view of every read-only accessor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorSnapshot {
    pub name: String,
    pub operator: String,
    pub status: DetectorStatus,
    pub connected: bool,
    pub preset_real_time: Seconds,
    pub elapsed_real_time: Seconds,
    pub full_spectra_file_path: Option<PathBuf>,
    pub sample: Option<String>,
    pub spectrum_file: Option<String>,
    pub acquisition_finalized: bool,
}

struct Inner {
    adapter: Box<dyn HardwareAdapter>,
    link: Link,
    descriptor: Option<MeasurementDescriptor>,
    /// Set by stop, disconnect, connection loss or a completed preset
    finalized: bool,
    elapsed: Seconds,
    spectrum_path: Option<PathBuf>,
}

impl Inner {
    fn preset(&self) -> Seconds {
        self.descriptor
            .as_ref()
            .map(MeasurementDescriptor::preset)
            .unwrap_or(Seconds::ZERO)
    }

    /// Pull the adapter's elapsed time into the cache, keeping the cached
    /// value if the instrument does not answer.
    fn sync_elapsed(&mut self) -> Seconds {
        if self.link.connected {
            match self.adapter.read_elapsed() {
                Ok(elapsed) => self.elapsed = elapsed,
                Err(e) => debug!("Elapsed time read failed, keeping cached value: {:#}", e),
            }
        }
        self.elapsed
    }

    /// Finalize the loaded acquisition, if any
    fn finalize(&mut self) {
        if self.descriptor.is_some() {
            self.finalized = true;
        }
    }
}

fn push_measurement(
    adapter: &mut dyn HardwareAdapter,
    descriptor: &MeasurementDescriptor,
) -> anyhow::Result<()> {
    adapter.push_preset(descriptor.preset())?;
    adapter.push_sample_metadata(&descriptor.sample_metadata())?;
    Ok(())
}

/// One controllable gamma spectroscopy detector
pub struct Detector {
    name: String,
    operator: String,
    naming: NamingPolicy,
    inner: Mutex<Inner>,
}

impl Detector {
    /// Bind `adapter` to the instrument named in `config`
    ///
    /// The instrument is probed by connecting to it. An absent instrument
    /// does not fail construction; the detector starts out `Off`.
    pub fn new(config: DetectorConfig, mut adapter: Box<dyn HardwareAdapter>) -> Self {
        let link = match adapter.connect(&config.name) {
            Ok(()) => {
                info!(
                    "Detector {} connected via {} adapter",
                    config.name,
                    adapter.name()
                );
                Link::READY
            }
            Err(e) => {
                warn!("Detector {} not reachable, starting off: {:#}", config.name, e);
                Link::OFF
            }
        };

        Self {
            naming: NamingPolicy::with_extension(&config.output_dir, config.extension),
            name: config.name,
            operator: config.operator,
            inner: Mutex::new(Inner {
                adapter,
                link,
                descriptor: None,
                finalized: false,
                elapsed: Seconds::ZERO,
                spectrum_path: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn invalid(&self, operation: &'static str, inner: &Inner) -> Error {
        Error::InvalidState {
            detector: self.name.clone(),
            operation,
            status: inner.link.status,
            finalized: false,
        }
    }

    // === Lifecycle ===

    /// Open a session with the instrument
    pub fn connect(&self) -> Result<()> {
        let mut inner = self.lock();
        if inner.link.status != DetectorStatus::Off {
            return Err(self.invalid("connect", &inner));
        }

        inner
            .adapter
            .connect(&self.name)
            .map_err(|e| Error::hardware(&self.name, e))?;
        inner.link = Link::READY;
        info!("Detector {} connected", self.name);
        Ok(())
    }

    /// Close the session, stopping an active acquisition first
    ///
    /// Accumulated counts stay with the instrument. Disconnecting an `Off`
    /// detector does nothing.
    pub fn disconnect(&self) {
        let mut inner = self.lock();
        if inner.link.status == DetectorStatus::Off {
            debug!("Detector {} already off", self.name);
            return;
        }

        if inner.link.status == DetectorStatus::Busy {
            if let Err(e) = inner.adapter.stop_counting() {
                warn!("Detector {} failed to stop counting before disconnect: {:#}", self.name, e);
            }
        }
        inner.sync_elapsed();
        inner.finalize();

        if let Err(e) = inner.adapter.disconnect() {
            warn!("Detector {} adapter disconnect failed: {:#}", self.name, e);
        }
        inner.link = Link::OFF;
        info!("Detector {} disconnected", self.name);
    }

    /// Load a measurement: push preset and sample information to the
    /// instrument and start fresh timing and file bookkeeping
    pub fn load_measurement_info(&self, descriptor: MeasurementDescriptor) -> Result<()> {
        descriptor.validate()?;
        if let Some(target) = descriptor.detector.as_deref() {
            if target != self.name {
                return Err(Error::InvalidDescriptor(format!(
                    "measurement was prepared for detector {}, not {}",
                    target, self.name
                )));
            }
        }

        let mut inner = self.lock();
        if inner.link.status != DetectorStatus::Ready {
            return Err(self.invalid("load measurement info on", &inner));
        }

        // A rejected clear leaves the loaded measurement intact
        inner
            .adapter
            .clear()
            .map_err(|e| Error::hardware(&self.name, e))?;

        // The previous measurement is gone once the buffer is cleared
        inner.descriptor = None;
        inner.finalized = false;
        inner.elapsed = Seconds::ZERO;
        inner.spectrum_path = None;

        let preset = descriptor.preset();
        push_measurement(inner.adapter.as_mut(), &descriptor)
            .map_err(|e| Error::hardware(&self.name, e))?;

        match inner.adapter.read_preset() {
            Ok(reported) if reported != preset => warn!(
                "Detector {} reports preset {} after pushing {}",
                self.name, reported, preset
            ),
            Ok(_) => {}
            Err(e) => debug!("Detector {} preset read-back failed: {:#}", self.name, e),
        }

        info!(
            "Detector {} loaded measurement {} ({} preset, file {})",
            self.name, descriptor.sample, preset, descriptor.spectrum_file
        );
        inner.descriptor = Some(descriptor);
        Ok(())
    }

    /// Begin counting, or resume a paused acquisition
    pub fn start(&self) -> Result<()> {
        let mut inner = self.lock();
        if inner.link.status != DetectorStatus::Ready {
            return Err(self.invalid("start", &inner));
        }
        if inner.descriptor.is_none() {
            return Err(Error::NoDescriptorLoaded {
                detector: self.name.clone(),
            });
        }
        if inner.finalized {
            return Err(Error::InvalidState {
                detector: self.name.clone(),
                operation: "start",
                status: inner.link.status,
                finalized: true,
            });
        }

        inner
            .adapter
            .start_counting()
            .map_err(|e| Error::hardware(&self.name, e))?;
        inner.link = Link::BUSY;
        info!("Detector {} started counting at {}", self.name, inner.elapsed);
        Ok(())
    }

    /// Halt counting, keeping the accumulated elapsed time
    pub fn pause(&self) -> Result<()> {
        let mut inner = self.lock();
        if inner.link.status != DetectorStatus::Busy {
            return Err(self.invalid("pause", &inner));
        }

        inner
            .adapter
            .pause_counting()
            .map_err(|e| Error::hardware(&self.name, e))?;
        inner.link = Link::READY;
        let elapsed = inner.sync_elapsed();
        info!("Detector {} paused at {}", self.name, elapsed);
        Ok(())
    }

    /// Halt counting if active and finalize the acquisition
    ///
    /// Elapsed time stays readable and the spectrum can still be saved, but
    /// starting again requires loading a measurement.
    pub fn stop(&self) -> Result<()> {
        let mut inner = self.lock();
        match inner.link.status {
            DetectorStatus::Off => return Err(self.invalid("stop", &inner)),
            DetectorStatus::Busy => {
                inner
                    .adapter
                    .stop_counting()
                    .map_err(|e| Error::hardware(&self.name, e))?;
                inner.link = Link::READY;
            }
            DetectorStatus::Ready => {}
        }

        let elapsed = inner.sync_elapsed();
        inner.finalize();
        info!("Detector {} stopped at {}", self.name, elapsed);
        Ok(())
    }

    /// Persist the current spectrum under the first free file name derived
    /// from the loaded measurement, returning the path written
    pub fn save(&self) -> Result<PathBuf> {
        let mut inner = self.lock();
        let Some(descriptor) = inner.descriptor.clone() else {
            return Err(Error::NoDescriptorLoaded {
                detector: self.name.clone(),
            });
        };
        if !inner.link.connected {
            return Err(Error::HardwareUnavailable {
                detector: self.name.clone(),
                reason: "detector is off".to_string(),
            });
        }

        fs::create_dir_all(self.naming.directory()).map_err(|e| {
            Error::PersistenceFailure(format!(
                "cannot create output directory {}: {}",
                self.naming.directory().display(),
                e
            ))
        })?;
        let path = self.naming.next_available(&descriptor.spectrum_file)?;

        let metadata = SpectrumMetadata {
            detector: self.name.clone(),
            operator: self.operator.clone(),
            sample: descriptor.sample_metadata(),
            preset_real_time: descriptor.preset(),
            elapsed_real_time: inner.sync_elapsed(),
            saved_at: Utc::now(),
        };

        inner
            .adapter
            .persist(&path, &metadata)
            .map_err(|e| Error::PersistenceFailure(format!("{}: {:#}", path.display(), e)))?;

        info!("Detector {} saved spectrum to {}", self.name, path.display());
        inner.spectrum_path = Some(path.clone());
        Ok(path)
    }

    /// Reconcile cached state with the instrument
    ///
    /// Called from the background connectivity monitor. A connected detector
    /// whose instrument stopped answering goes `Off`; a busy detector whose
    /// acquisition reached its preset goes `Ready`.
    pub fn refresh(&self) -> Link {
        let mut inner = self.lock();
        if inner.link.status == DetectorStatus::Off {
            return inner.link;
        }

        if !inner.adapter.is_reachable() {
            warn!("Detector {} lost connection to instrument", self.name);
            inner.finalize();
            if let Err(e) = inner.adapter.disconnect() {
                debug!("Detector {} session cleanup failed: {:#}", self.name, e);
            }
            inner.link = Link::OFF;
            return inner.link;
        }

        if inner.link.status == DetectorStatus::Busy {
            let preset = inner.preset();
            let elapsed = inner.sync_elapsed();
            if preset > Seconds::ZERO && elapsed >= preset {
                info!("Detector {} reached preset {}", self.name, preset);
                inner.link = Link::READY;
                inner.finalize();
            }
        }
        inner.link
    }

    // === Accessors ===

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn operator(&self) -> &str {
        &self.operator
    }

    pub fn output_dir(&self) -> &Path {
        self.naming.directory()
    }

    pub fn link(&self) -> Link {
        self.lock().link
    }

    pub fn status(&self) -> DetectorStatus {
        self.link().status
    }

    pub fn is_connected(&self) -> bool {
        self.link().connected
    }

    /// Preset of the loaded measurement, zero before the first load
    pub fn preset_real_time(&self) -> Seconds {
        self.lock().preset()
    }

    /// Elapsed real time as last reported by the instrument
    pub fn elapsed_real_time(&self) -> Seconds {
        self.lock().sync_elapsed()
    }

    pub fn full_spectra_file_path(&self) -> Option<PathBuf> {
        self.lock().spectrum_path.clone()
    }

    pub fn current_sample(&self) -> Option<SampleId> {
        self.lock().descriptor.as_ref().map(|d| d.sample.clone())
    }

    pub fn current_descriptor(&self) -> Option<MeasurementDescriptor> {
        self.lock().descriptor.clone()
    }

    pub fn snapshot(&self) -> DetectorSnapshot {
        let mut inner = self.lock();
        let elapsed = inner.sync_elapsed();
        DetectorSnapshot {
            name: self.name.clone(),
            operator: self.operator.clone(),
            status: inner.link.status,
            connected: inner.link.connected,
            preset_real_time: inner.preset(),
            elapsed_real_time: elapsed,
            full_spectra_file_path: inner.spectrum_path.clone(),
            sample: inner.descriptor.as_ref().map(|d| d.sample.sample_key()),
            spectrum_file: inner.descriptor.as_ref().map(|d| d.spectrum_file.clone()),
            acquisition_finalized: inner.finalized,
        }
    }
}

impl fmt::Debug for Detector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("Detector")
            .field("name", &self.name)
            .field("adapter", &inner.adapter.name())
            .field("link", &inner.link)
            .field("finalized", &inner.finalized)
            .finish()
    }
}

impl Drop for Detector {
    /// Leave the instrument idle with its session closed
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SampleMetadata;
    use anyhow::{anyhow, bail};
    use std::sync::Arc;

    /// Scripted adapter whose instrument state the test drives directly
    #[derive(Default)]
    struct Instrument {
        reachable: bool,
        counting: bool,
        elapsed: f64,
        preset: f64,
        metadata: Option<SampleMetadata>,
        calls: Vec<&'static str>,
        fail_persist: bool,
    }

    struct ScriptedAdapter(Arc<Mutex<Instrument>>);

    impl ScriptedAdapter {
        fn state(&self) -> MutexGuard<'_, Instrument> {
            self.0.lock().unwrap()
        }
    }

    impl HardwareAdapter for ScriptedAdapter {
        fn name(&self) -> &str {
            "Scripted"
        }

        fn connect(&mut self, _instrument: &str) -> anyhow::Result<()> {
            let mut s = self.state();
            s.calls.push("connect");
            if !s.reachable {
                bail!("no answer from instrument");
            }
            Ok(())
        }

        fn disconnect(&mut self) -> anyhow::Result<()> {
            self.state().calls.push("disconnect");
            Ok(())
        }

        fn is_reachable(&self) -> bool {
            self.state().reachable
        }

        fn clear(&mut self) -> anyhow::Result<()> {
            let mut s = self.state();
            s.calls.push("clear");
            if !s.reachable {
                bail!("instrument unreachable");
            }
            s.elapsed = 0.0;
            Ok(())
        }

        fn push_preset(&mut self, preset: Seconds) -> anyhow::Result<()> {
            self.state().preset = preset.0;
            Ok(())
        }

        fn push_sample_metadata(&mut self, metadata: &SampleMetadata) -> anyhow::Result<()> {
            self.state().metadata = Some(metadata.clone());
            Ok(())
        }

        fn start_counting(&mut self) -> anyhow::Result<()> {
            let mut s = self.state();
            s.calls.push("start");
            s.counting = true;
            Ok(())
        }

        fn pause_counting(&mut self) -> anyhow::Result<()> {
            let mut s = self.state();
            s.calls.push("pause");
            s.counting = false;
            Ok(())
        }

        fn stop_counting(&mut self) -> anyhow::Result<()> {
            let mut s = self.state();
            s.calls.push("stop");
            s.counting = false;
            Ok(())
        }

        fn read_elapsed(&self) -> anyhow::Result<Seconds> {
            let s = self.state();
            if !s.reachable {
                return Err(anyhow!("instrument unreachable"));
            }
            Ok(Seconds(s.elapsed))
        }

        fn read_preset(&self) -> anyhow::Result<Seconds> {
            Ok(Seconds(self.state().preset))
        }

        fn persist(&mut self, path: &Path, metadata: &SpectrumMetadata) -> anyhow::Result<()> {
            if self.state().fail_persist {
                bail!("disk full");
            }
            let json = serde_json::to_vec(metadata)?;
            fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(path)
                .and_then(|mut f| std::io::Write::write_all(&mut f, &json))?;
            Ok(())
        }
    }

    fn sample() -> SampleId {
        SampleId {
            country_code: "RO".to_string(),
            client_number: "2".to_string(),
            year: "19".to_string(),
            set_number: "12".to_string(),
            set_index: "b".to_string(),
            sample_number: "2".to_string(),
        }
    }

    fn descriptor(preset: u32) -> MeasurementDescriptor {
        MeasurementDescriptor::builder(sample(), "testD1")
            .preset_seconds(preset)
            .detector("D1")
            .note("test")
            .build()
            .unwrap()
    }

    fn detector(reachable: bool) -> (Detector, Arc<Mutex<Instrument>>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let instrument = Arc::new(Mutex::new(Instrument {
            reachable,
            ..Default::default()
        }));
        let config = DetectorConfig::new("D1", "bdrum").with_output_dir(dir.path());
        let detector = Detector::new(config, Box::new(ScriptedAdapter(instrument.clone())));
        (detector, instrument, dir)
    }

    fn set_elapsed(instrument: &Arc<Mutex<Instrument>>, secs: f64) {
        instrument.lock().unwrap().elapsed = secs;
    }

    #[test]
    fn test_construction_probes_instrument() {
        let (d, _, _dir) = detector(true);
        assert_eq!(d.name(), "D1");
        assert_eq!(d.status(), DetectorStatus::Ready);
        assert!(d.is_connected());

        let (d, _, _dir) = detector(false);
        assert_eq!(d.status(), DetectorStatus::Off);
        assert!(!d.is_connected());
    }

    #[test]
    fn test_connect_requires_off() {
        let (d, _, _dir) = detector(true);
        let err = d.connect().unwrap_err();
        assert!(err.is_invalid_state());
    }

    #[test]
    fn test_connect_unreachable_is_hardware_unavailable() {
        let (d, _, _dir) = detector(false);
        let err = d.connect().unwrap_err();
        assert!(matches!(err, Error::HardwareUnavailable { .. }));
        assert_eq!(d.status(), DetectorStatus::Off);
    }

    #[test]
    fn test_connect_after_instrument_appears() {
        let (d, instrument, _dir) = detector(false);
        instrument.lock().unwrap().reachable = true;
        d.connect().unwrap();
        assert_eq!(d.link(), Link::READY);
    }

    #[test]
    fn test_load_sets_preset_and_resets_elapsed() {
        let (d, instrument, _dir) = detector(true);
        set_elapsed(&instrument, 42.0);

        d.load_measurement_info(descriptor(5)).unwrap();
        assert_eq!(d.preset_real_time(), Seconds(5.0));
        assert_eq!(d.elapsed_real_time(), Seconds::ZERO);
        assert_eq!(d.current_sample(), Some(sample()));
        assert!(d.full_spectra_file_path().is_none());

        let s = instrument.lock().unwrap();
        assert_eq!(s.preset, 5.0);
        assert_eq!(s.metadata.as_ref().map(|m| m.title.as_str()), Some("RO-2-19-12-b-2"));
    }

    #[test]
    fn test_load_rejects_descriptor_for_other_detector() {
        let (d, _, _dir) = detector(true);
        let other = MeasurementDescriptor::builder(sample(), "x")
            .preset_seconds(5)
            .detector("D2")
            .build()
            .unwrap();
        let err = d.load_measurement_info(other).unwrap_err();
        assert!(matches!(err, Error::InvalidDescriptor(_)));
        assert!(d.current_descriptor().is_none());
    }

    #[test]
    fn test_failed_load_keeps_previous_measurement() {
        let (d, instrument, dir) = detector(true);
        d.load_measurement_info(descriptor(5)).unwrap();
        d.start().unwrap();
        set_elapsed(&instrument, 2.0);
        d.pause().unwrap();

        instrument.lock().unwrap().reachable = false;
        let err = d.load_measurement_info(descriptor(10)).unwrap_err();
        assert!(matches!(err, Error::HardwareUnavailable { .. }));
        assert_eq!(d.preset_real_time(), Seconds(5.0));
        assert_eq!(d.current_descriptor(), Some(descriptor(5)));
        assert_eq!(d.elapsed_real_time(), Seconds(2.0));

        instrument.lock().unwrap().reachable = true;
        assert_eq!(d.save().unwrap(), dir.path().join("testD1.cnf"));
    }

    #[test]
    fn test_load_while_busy_is_invalid_state() {
        let (d, _, _dir) = detector(true);
        d.load_measurement_info(descriptor(5)).unwrap();
        d.start().unwrap();

        let err = d.load_measurement_info(descriptor(10)).unwrap_err();
        assert!(err.is_invalid_state());
        assert_eq!(d.preset_real_time(), Seconds(5.0));
    }

    #[test]
    fn test_start_without_descriptor() {
        let (d, _, _dir) = detector(true);
        let err = d.start().unwrap_err();
        assert!(matches!(err, Error::NoDescriptorLoaded { .. }));
        assert_eq!(d.status(), DetectorStatus::Ready);
    }

    #[test]
    fn test_second_start_is_rejected_without_touching_elapsed() {
        let (d, instrument, _dir) = detector(true);
        d.load_measurement_info(descriptor(5)).unwrap();
        d.start().unwrap();
        set_elapsed(&instrument, 1.5);

        let err = d.start().unwrap_err();
        assert!(err.is_invalid_state());
        assert_eq!(d.status(), DetectorStatus::Busy);
        assert_eq!(d.elapsed_real_time(), Seconds(1.5));
        let starts = instrument
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| **c == "start")
            .count();
        assert_eq!(starts, 1);
    }

    #[test]
    fn test_pause_keeps_elapsed_and_resume_continues() {
        let (d, instrument, _dir) = detector(true);
        d.load_measurement_info(descriptor(5)).unwrap();
        d.start().unwrap();
        set_elapsed(&instrument, 2.0);

        d.pause().unwrap();
        assert_eq!(d.status(), DetectorStatus::Ready);
        assert_eq!(d.elapsed_real_time(), Seconds(2.0));

        d.start().unwrap();
        set_elapsed(&instrument, 3.5);
        assert_eq!(d.status(), DetectorStatus::Busy);
        assert_eq!(d.elapsed_real_time(), Seconds(3.5));
    }

    #[test]
    fn test_pause_when_ready_is_invalid_state() {
        let (d, _, _dir) = detector(true);
        let err = d.pause().unwrap_err();
        assert!(err.is_invalid_state());
    }

    #[test]
    fn test_stop_finalizes_acquisition() {
        let (d, instrument, _dir) = detector(true);
        d.load_measurement_info(descriptor(5)).unwrap();
        d.start().unwrap();
        set_elapsed(&instrument, 1.0);

        d.stop().unwrap();
        assert_eq!(d.status(), DetectorStatus::Ready);
        assert_eq!(d.elapsed_real_time(), Seconds(1.0));

        match d.start().unwrap_err() {
            Error::InvalidState { finalized, .. } => assert!(finalized),
            other => panic!("unexpected error {:?}", other),
        }

        // A fresh load re-arms the detector
        d.load_measurement_info(descriptor(5)).unwrap();
        d.start().unwrap();
    }

    #[test]
    fn test_stop_when_idle_is_a_no_op() {
        let (d, instrument, _dir) = detector(true);
        d.stop().unwrap();
        assert_eq!(d.status(), DetectorStatus::Ready);
        assert!(!instrument.lock().unwrap().calls.contains(&"stop"));
    }

    #[test]
    fn test_disconnect_while_busy_stops_first() {
        let (d, instrument, _dir) = detector(true);
        d.load_measurement_info(descriptor(5)).unwrap();
        d.start().unwrap();

        d.disconnect();
        assert_eq!(d.link(), Link::OFF);

        let calls = instrument.lock().unwrap().calls.clone();
        let stop = calls.iter().position(|c| *c == "stop").unwrap();
        let disconnect = calls.iter().rposition(|c| *c == "disconnect").unwrap();
        assert!(stop < disconnect);
        assert!(!instrument.lock().unwrap().counting);
    }

    #[test]
    fn test_only_connect_succeeds_after_disconnect() {
        let (d, _, _dir) = detector(true);
        d.load_measurement_info(descriptor(5)).unwrap();
        d.disconnect();
        d.disconnect();

        assert!(d.start().unwrap_err().is_invalid_state());
        assert!(d.pause().unwrap_err().is_invalid_state());
        assert!(d.stop().unwrap_err().is_invalid_state());
        assert!(d.load_measurement_info(descriptor(5)).unwrap_err().is_invalid_state());
        assert!(matches!(
            d.save().unwrap_err(),
            Error::HardwareUnavailable { .. }
        ));

        d.connect().unwrap();
        assert_eq!(d.status(), DetectorStatus::Ready);
    }

    #[test]
    fn test_save_without_descriptor_creates_nothing() {
        let (d, _, dir) = detector(true);
        let err = d.save().unwrap_err();
        assert!(matches!(err, Error::NoDescriptorLoaded { .. }));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_consecutive_saves_never_overwrite() {
        let (d, _, dir) = detector(true);
        d.load_measurement_info(descriptor(5)).unwrap();

        let first = d.save().unwrap();
        let second = d.save().unwrap();
        let third = d.save().unwrap();

        assert_eq!(first, dir.path().join("testD1.cnf"));
        assert_eq!(second, dir.path().join("testD1(1).cnf"));
        assert_eq!(third, dir.path().join("testD1(2).cnf"));
        assert_eq!(d.full_spectra_file_path(), Some(third));
    }

    #[test]
    fn test_save_failure_is_persistence_failure() {
        let (d, instrument, _dir) = detector(true);
        d.load_measurement_info(descriptor(5)).unwrap();
        instrument.lock().unwrap().fail_persist = true;

        let err = d.save().unwrap_err();
        assert!(matches!(err, Error::PersistenceFailure(_)));
        assert!(d.full_spectra_file_path().is_none());
    }

    #[test]
    fn test_save_creates_missing_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("spectra").join("2021");
        let instrument = Arc::new(Mutex::new(Instrument {
            reachable: true,
            ..Default::default()
        }));
        let d = Detector::new(
            DetectorConfig::new("D1", "bdrum").with_output_dir(&nested),
            Box::new(ScriptedAdapter(instrument)),
        );
        d.load_measurement_info(descriptor(5)).unwrap();

        let path = d.save().unwrap();
        assert_eq!(path, nested.join("testD1.cnf"));
        assert!(path.exists());
    }

    #[test]
    fn test_refresh_detects_lost_instrument() {
        let (d, instrument, _dir) = detector(true);
        d.load_measurement_info(descriptor(5)).unwrap();
        d.start().unwrap();
        set_elapsed(&instrument, 1.25);
        assert_eq!(d.elapsed_real_time(), Seconds(1.25));

        instrument.lock().unwrap().reachable = false;
        assert_eq!(d.refresh(), Link::OFF);
        assert_eq!(d.status(), DetectorStatus::Off);
        assert!(!d.is_connected());
        // Last reported time survives the loss
        assert_eq!(d.elapsed_real_time(), Seconds(1.25));

        let err = d.start().unwrap_err();
        assert!(err.is_invalid_state());
    }

    #[test]
    fn test_refresh_marks_completed_preset_ready() {
        let (d, instrument, _dir) = detector(true);
        d.load_measurement_info(descriptor(5)).unwrap();
        d.start().unwrap();

        set_elapsed(&instrument, 4.0);
        assert_eq!(d.refresh(), Link::BUSY);

        set_elapsed(&instrument, 5.0);
        assert_eq!(d.refresh(), Link::READY);
        assert!(d.snapshot().acquisition_finalized);
    }

    #[test]
    fn test_snapshot_reflects_accessors() {
        let (d, _, _dir) = detector(true);
        d.load_measurement_info(descriptor(5)).unwrap();
        let path = d.save().unwrap();

        let snap = d.snapshot();
        assert_eq!(snap.name, "D1");
        assert_eq!(snap.operator, "bdrum");
        assert_eq!(snap.status, DetectorStatus::Ready);
        assert!(snap.connected);
        assert_eq!(snap.preset_real_time, Seconds(5.0));
        assert_eq!(snap.full_spectra_file_path, Some(path));
        assert_eq!(snap.sample.as_deref(), Some("RO-2-19-12-b-2"));
        assert_eq!(snap.spectrum_file.as_deref(), Some("testD1"));
        assert!(!snap.acquisition_finalized);
    }
}

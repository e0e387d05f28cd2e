//! Simulated detector that counts a synthetic spectrum
//!
//! Behaves like a real acquisition unit as far as the detector state machine
//! can tell: elapsed real time runs on a wall clock while counting, freezes
//! while paused and stops advancing once the preset is reached. The spectrum
//! is a background continuum with a few common gamma lines, scaled by live
//! time, so saved files look plausible without any hardware.
//!
//! The [`InstrumentHandle`] stays with the caller after the adapter is moved
//! into a detector and lets tests pull the plug or break the disk.

use crate::spectrum_file::SpectrumFile;
use anyhow::{bail, Result};
use gsd_core::{adapter::HardwareAdapter, model::*, units::*};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

const CHANNELS: usize = 1024;
const KEV_PER_CHANNEL: f64 = 3.0;

// =============================================================================
// Spectrum model: continuum plus gamma lines
// =============================================================================

#[derive(Clone, Copy)]
struct GammaLine {
    energy_kev: f64,
    /// Counts per second in the full-energy peak
    rate: f64,
    fwhm_kev: f64,
}

/// Lines from a typical environmental sample
fn demo_lines() -> Vec<GammaLine> {
    vec![
        // Pb-214 / Bi-214 daughters
        GammaLine { energy_kev: 351.9, rate: 1.8, fwhm_kev: 1.6 },
        GammaLine { energy_kev: 609.3, rate: 1.5, fwhm_kev: 1.8 },
        // Cs-137
        GammaLine { energy_kev: 661.7, rate: 4.0, fwhm_kev: 1.9 },
        // Co-60
        GammaLine { energy_kev: 1173.2, rate: 0.9, fwhm_kev: 2.2 },
        GammaLine { energy_kev: 1332.5, rate: 0.8, fwhm_kev: 2.3 },
        // K-40
        GammaLine { energy_kev: 1460.8, rate: 1.2, fwhm_kev: 2.4 },
    ]
}

/// Expected count rate in a channel, counts per second
fn channel_rate(lines: &[GammaLine], energy_kev: f64) -> f64 {
    // Falling Compton continuum
    let continuum = 0.6 * (-energy_kev / 700.0).exp() + 0.02;

    let peaks: f64 = lines
        .iter()
        .map(|line| {
            let sigma = line.fwhm_kev / 2.355;
            let z = (energy_kev - line.energy_kev) / sigma;
            line.rate * KEV_PER_CHANNEL / (sigma * (2.0 * std::f64::consts::PI).sqrt())
                * (-0.5 * z * z).exp()
        })
        .sum();

    continuum + peaks
}

/// Simple deterministic noise from a seed
fn noise(seed: f64) -> f64 {
    let x = (seed * 12.9898 + 78.233).sin() * 43_758.547;
    x - x.floor()
}

fn synthesize(lines: &[GammaLine], live_secs: f64) -> Vec<u32> {
    (0..CHANNELS)
        .map(|i| {
            let energy = (i as f64 + 0.5) * KEV_PER_CHANNEL;
            let expected = channel_rate(lines, energy) * live_secs;
            // Poisson-like spread around the expectation
            let spread = (noise(i as f64 + live_secs) - 0.5) * 2.0 * expected.sqrt();
            (expected + spread).round().max(0.0) as u32
        })
        .collect()
}

// =============================================================================
// InstrumentHandle: the physical side of the simulation
// =============================================================================

#[derive(Debug)]
struct Instrument {
    powered: bool,
    refuse_connections: bool,
    fail_writes: bool,
}

/// Caller-side control over the simulated instrument
#[derive(Debug, Clone)]
pub struct InstrumentHandle(Arc<Mutex<Instrument>>);

impl InstrumentHandle {
    fn lock(&self) -> MutexGuard<'_, Instrument> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cut power, as if the instrument was switched off or its cable pulled
    pub fn unplug(&self) {
        self.lock().powered = false;
    }

    pub fn plug_in(&self) {
        self.lock().powered = true;
    }

    pub fn is_powered(&self) -> bool {
        self.lock().powered
    }

    /// Make connection attempts fail even while powered
    pub fn refuse_connections(&self, refuse: bool) {
        self.lock().refuse_connections = refuse;
    }

    /// Make spectrum writes fail
    pub fn fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }
}

// =============================================================================
// SimulatedAdapter
// =============================================================================

pub struct SimulatedAdapter {
    instrument: InstrumentHandle,
    session: Option<String>,
    preset: Seconds,
    sample: Option<SampleMetadata>,
    accumulated: Duration,
    counting_since: Option<Instant>,
    lines: Vec<GammaLine>,
}

impl SimulatedAdapter {
    pub fn new() -> Self {
        Self {
            instrument: InstrumentHandle(Arc::new(Mutex::new(Instrument {
                powered: true,
                refuse_connections: false,
                fail_writes: false,
            }))),
            session: None,
            preset: Seconds::ZERO,
            sample: None,
            accumulated: Duration::ZERO,
            counting_since: None,
            lines: demo_lines(),
        }
    }

    /// Handle for driving the instrument from outside the detector
    pub fn handle(&self) -> InstrumentHandle {
        self.instrument.clone()
    }

    /// Name of the instrument the session is open with
    pub fn session(&self) -> Option<&str> {
        self.session.as_deref()
    }

    /// Sample information last pushed to the instrument
    pub fn sample(&self) -> Option<&SampleMetadata> {
        self.sample.as_ref()
    }

    /// Whether the clock is running and the preset not yet reached
    pub fn is_counting(&self) -> bool {
        self.counting_since.is_some() && !self.preset_reached()
    }

    fn preset_reached(&self) -> bool {
        self.preset > Seconds::ZERO && self.elapsed() >= self.preset
    }

    /// Elapsed real time, capped at the preset
    fn elapsed(&self) -> Seconds {
        let running = self
            .counting_since
            .map(|since| since.elapsed())
            .unwrap_or_default();
        let total = Seconds::from(self.accumulated + running);
        if self.preset > Seconds::ZERO && total > self.preset {
            self.preset
        } else {
            total
        }
    }

    /// Fold the running interval into the accumulated time
    fn halt(&mut self) {
        if let Some(since) = self.counting_since.take() {
            self.accumulated += since.elapsed();
            let preset = Duration::from_secs_f64(self.preset.as_secs_f64());
            if !preset.is_zero() && self.accumulated > preset {
                self.accumulated = preset;
            }
        }
    }

    /// Fail unless a session is open and the instrument answers
    fn ensure_session(&self) -> Result<()> {
        let Some(name) = &self.session else {
            bail!("No session open");
        };
        if !self.instrument.is_powered() {
            bail!("Instrument {} is not responding", name);
        }
        Ok(())
    }
}

impl Default for SimulatedAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl HardwareAdapter for SimulatedAdapter {
    fn name(&self) -> &str {
        "Simulated"
    }

    fn connect(&mut self, instrument: &str) -> Result<()> {
        {
            let state = self.instrument.lock();
            if !state.powered {
                bail!("Instrument {} is powered off", instrument);
            }
            if state.refuse_connections {
                bail!("Instrument {} refused the connection", instrument);
            }
        }
        debug!("Simulated instrument {} session opened", instrument);
        self.session = Some(instrument.to_string());
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        self.halt();
        if let Some(name) = self.session.take() {
            debug!("Simulated instrument {} session closed", name);
        }
        Ok(())
    }

    fn is_reachable(&self) -> bool {
        self.ensure_session().is_ok()
    }

    fn clear(&mut self) -> Result<()> {
        self.ensure_session()?;
        self.accumulated = Duration::ZERO;
        self.counting_since = None;
        Ok(())
    }

    fn push_preset(&mut self, preset: Seconds) -> Result<()> {
        self.ensure_session()?;
        self.preset = preset;
        Ok(())
    }

    fn push_sample_metadata(&mut self, metadata: &SampleMetadata) -> Result<()> {
        self.ensure_session()?;
        self.sample = Some(metadata.clone());
        Ok(())
    }

    fn start_counting(&mut self) -> Result<()> {
        self.ensure_session()?;
        if self.counting_since.is_none() {
            self.counting_since = Some(Instant::now());
        }
        Ok(())
    }

    fn pause_counting(&mut self) -> Result<()> {
        self.ensure_session()?;
        self.halt();
        Ok(())
    }

    fn stop_counting(&mut self) -> Result<()> {
        self.ensure_session()?;
        self.halt();
        Ok(())
    }

    fn read_elapsed(&self) -> Result<Seconds> {
        self.ensure_session()?;
        Ok(self.elapsed())
    }

    fn read_preset(&self) -> Result<Seconds> {
        self.ensure_session()?;
        Ok(self.preset)
    }

    fn persist(&mut self, path: &Path, metadata: &SpectrumMetadata) -> Result<()> {
        self.ensure_session()?;
        if self.instrument.lock().fail_writes {
            bail!("Write to {} failed: device buffer unavailable", path.display());
        }

        let channels = synthesize(&self.lines, self.elapsed().as_secs_f64());
        SpectrumFile::new(metadata.clone(), KEV_PER_CHANNEL, channels).write_new(path)
    }
}

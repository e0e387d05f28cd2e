//! Hardware adapter trait definition

use crate::model::{SampleMetadata, SpectrumMetadata};
use crate::units::Seconds;
use anyhow::Result;
use std::path::Path;

/// Trait for vendor-specific acquisition hardware
///
/// An adapter object is the session handle to one physical instrument and is
/// exclusively owned by a single [`Detector`](crate::Detector). The detector
/// only ever sequences these operations; how each maps onto a vendor API is
/// the adapter's business.
///
/// Counting commands are fire-and-confirm: they return once the instrument
/// has acknowledged them, within a bounded wait.
pub trait HardwareAdapter: Send {
    /// Get the name of this adapter (e.g., "Simulated", "Canberra")
    fn name(&self) -> &str;

    /// Open a session with the named instrument
    fn connect(&mut self, instrument: &str) -> Result<()>;

    /// Close the session. Must succeed when no session is open.
    fn disconnect(&mut self) -> Result<()>;

    /// Check whether the instrument still answers on the open session
    ///
    /// This should be a lightweight check; it is polled from the background
    /// connectivity monitor.
    fn is_reachable(&self) -> bool;

    /// Discard the acquisition buffer, resetting counts and elapsed time
    fn clear(&mut self) -> Result<()>;

    /// Configure the target real time of the acquisition
    fn push_preset(&mut self, preset: Seconds) -> Result<()>;

    /// Store sample information in the instrument's acquisition parameters
    fn push_sample_metadata(&mut self, metadata: &SampleMetadata) -> Result<()>;

    /// Begin counting, or resume after a pause
    fn start_counting(&mut self) -> Result<()>;

    /// Halt counting, keeping accumulated counts and elapsed time
    fn pause_counting(&mut self) -> Result<()>;

    /// Halt counting and end the acquisition
    fn stop_counting(&mut self) -> Result<()>;

    /// Live elapsed real time as reported by the instrument
    fn read_elapsed(&self) -> Result<Seconds>;

    /// Preset real time as configured on the instrument
    fn read_preset(&self) -> Result<Seconds>;

    /// Write the accumulated spectrum and its metadata to `path`
    ///
    /// Implementations must refuse to replace an existing file.
    fn persist(&mut self, path: &Path, metadata: &SpectrumMetadata) -> Result<()>;
}

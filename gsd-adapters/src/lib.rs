//! Hardware adapters for gamma spectroscopy detector control

pub mod simulated;
pub mod spectrum_file;

pub use simulated::{InstrumentHandle, SimulatedAdapter};
pub use spectrum_file::SpectrumFile;

//! Gamma Spectroscopy Detector Control Core Library
//!
//! This crate provides the measurement data model, the hardware adapter trait
//! and the acquisition state machine that sequences a detector through
//! connect, configure, acquire, pause/resume, save and disconnect.

pub mod adapter;
pub mod detector;
pub mod error;
pub mod model;
pub mod naming;
pub mod registry;
pub mod units;

pub use adapter::HardwareAdapter;
pub use detector::{default_output_dir, Detector, DetectorConfig, DetectorSnapshot, Link};
pub use error::{Error, Result};
pub use model::{
    DetectorStatus, MeasurementDescriptor, MeasurementKind, SampleId, SampleMetadata,
    SpectrumMetadata,
};
pub use naming::NamingPolicy;
pub use registry::DetectorRegistry;

//! Measurement data model
//!
//! Defines the descriptor a caller prepares for each measurement, the sample
//! identity it refers to, and the metadata records handed to the hardware
//! adapter on load and on save.

use crate::error::{Error, Result};
use crate::units::*;
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Detector status as seen by callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorStatus {
    /// Not connected to the instrument
    Off,
    /// Connected and idle, including paused acquisitions
    Ready,
    /// Connected and actively counting
    Busy,
}

impl fmt::Display for DetectorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DetectorStatus::Off => "off",
            DetectorStatus::Ready => "ready",
            DetectorStatus::Busy => "busy",
        };
        f.write_str(s)
    }
}

/// Classification of a measurement by the irradiation it follows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasurementKind {
    /// Short-lived isotopes, counted right after a short irradiation
    #[default]
    ShortLived,
    /// Long-lived isotopes, first count after decay
    LongLived1,
    /// Long-lived isotopes, second count
    LongLived2,
    /// Empty-container background
    Background,
}

impl MeasurementKind {
    /// Stable numeric code stored in spectrum headers
    pub fn code(&self) -> u8 {
        match self {
            MeasurementKind::ShortLived => 0,
            MeasurementKind::LongLived1 => 1,
            MeasurementKind::LongLived2 => 2,
            MeasurementKind::Background => 3,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(MeasurementKind::ShortLived),
            1 => Some(MeasurementKind::LongLived1),
            2 => Some(MeasurementKind::LongLived2),
            3 => Some(MeasurementKind::Background),
            _ => None,
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            MeasurementKind::ShortLived => "SLI",
            MeasurementKind::LongLived1 => "LLI-1",
            MeasurementKind::LongLived2 => "LLI-2",
            MeasurementKind::Background => "BCKG",
        }
    }
}

/// Identity of a sample within a client's sample set
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SampleId {
    pub country_code: String,
    pub client_number: String,
    pub year: String,
    pub set_number: String,
    pub set_index: String,
    pub sample_number: String,
}

impl SampleId {
    /// Key of the sample set, e.g. `RO-2-19-12-b`
    pub fn set_key(&self) -> String {
        format!(
            "{}-{}-{}-{}-{}",
            self.country_code, self.client_number, self.year, self.set_number, self.set_index
        )
    }

    /// Key of the sample, e.g. `RO-2-19-12-b-2`
    pub fn sample_key(&self) -> String {
        format!("{}-{}", self.set_key(), self.sample_number)
    }
}

impl fmt::Display for SampleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sample_key())
    }
}

/// Sample information pushed to the instrument when a measurement is loaded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleMetadata {
    /// Spectrum title, the sample key
    pub title: String,
    /// Sample code, the sample number within its set
    pub sample_code: String,
    /// Identifier of the assistant who prepared the measurement
    pub assistant: u32,
    pub note: String,
    pub weight: Grams,
    pub weight_unit: String,
    pub weight_error: f64,
    pub geometry_height: Centimeters,
    pub irradiation_start: Option<DateTime<Local>>,
    pub irradiation_finish: Option<DateTime<Local>>,
    pub kind: MeasurementKind,
}

/// Immutable description of one measurement
///
/// Built by the caller before loading it into a detector and never mutated
/// afterwards; the next load supersedes it wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementDescriptor {
    /// Target acquisition duration in whole seconds
    pub preset_seconds: u32,
    /// Base name of the spectrum file, without directory or extension
    pub spectrum_file: String,
    /// Name of the detector this measurement was prepared for
    #[serde(default)]
    pub detector: Option<String>,
    #[serde(default)]
    pub kind: MeasurementKind,
    pub sample: SampleId,
    #[serde(default)]
    pub weight: Grams,
    #[serde(default)]
    pub height: Centimeters,
    #[serde(default)]
    pub irradiation_start: Option<DateTime<Local>>,
    #[serde(default)]
    pub irradiation_finish: Option<DateTime<Local>>,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub assistant: u32,
}

impl MeasurementDescriptor {
    pub fn builder(sample: SampleId, spectrum_file: impl Into<String>) -> MeasurementDescriptorBuilder {
        MeasurementDescriptorBuilder::new(sample, spectrum_file)
    }

    pub fn preset(&self) -> Seconds {
        Seconds::from_secs(self.preset_seconds)
    }

    /// Check the descriptor can drive an acquisition and name a spectrum file
    pub fn validate(&self) -> Result<()> {
        if self.preset_seconds == 0 {
            return Err(Error::InvalidDescriptor(
                "preset duration must be positive".to_string(),
            ));
        }
        let base = self.spectrum_file.as_str();
        if base.trim().is_empty() {
            return Err(Error::InvalidDescriptor(
                "spectrum file base name is empty".to_string(),
            ));
        }
        if base.trim() != base {
            return Err(Error::InvalidDescriptor(format!(
                "spectrum file base name {:?} has surrounding whitespace",
                self.spectrum_file
            )));
        }
        if base.contains(['/', '\\']) || base == "." || base == ".." {
            return Err(Error::InvalidDescriptor(format!(
                "spectrum file base name {:?} must not contain a path",
                self.spectrum_file
            )));
        }
        if !self.weight.0.is_finite() || self.weight.0 < 0.0 {
            return Err(Error::InvalidDescriptor(format!(
                "sample weight {} is not a valid mass",
                self.weight.0
            )));
        }
        if !self.height.0.is_finite() || self.height.0 < 0.0 {
            return Err(Error::InvalidDescriptor(format!(
                "geometry height {} is not a valid height",
                self.height.0
            )));
        }
        if let (Some(start), Some(finish)) = (self.irradiation_start, self.irradiation_finish) {
            if finish < start {
                return Err(Error::InvalidDescriptor(
                    "irradiation finishes before it starts".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Sample information as pushed to the instrument
    pub fn sample_metadata(&self) -> SampleMetadata {
        SampleMetadata {
            title: self.sample.sample_key(),
            sample_code: self.sample.sample_number.clone(),
            assistant: self.assistant,
            note: self.note.clone(),
            weight: self.weight,
            weight_unit: Grams::UNIT.to_string(),
            weight_error: 0.0,
            geometry_height: self.height,
            irradiation_start: self.irradiation_start,
            irradiation_finish: self.irradiation_finish,
            kind: self.kind,
        }
    }
}

/// Builder for [`MeasurementDescriptor`]
#[derive(Debug, Clone)]
pub struct MeasurementDescriptorBuilder {
    descriptor: MeasurementDescriptor,
}

impl MeasurementDescriptorBuilder {
    fn new(sample: SampleId, spectrum_file: impl Into<String>) -> Self {
        Self {
            descriptor: MeasurementDescriptor {
                preset_seconds: 0,
                spectrum_file: spectrum_file.into(),
                detector: None,
                kind: MeasurementKind::default(),
                sample,
                weight: Grams::default(),
                height: Centimeters::default(),
                irradiation_start: None,
                irradiation_finish: None,
                note: String::new(),
                assistant: 0,
            },
        }
    }

    pub fn preset_seconds(mut self, secs: u32) -> Self {
        self.descriptor.preset_seconds = secs;
        self
    }

    pub fn detector(mut self, name: impl Into<String>) -> Self {
        self.descriptor.detector = Some(name.into());
        self
    }

    pub fn kind(mut self, kind: MeasurementKind) -> Self {
        self.descriptor.kind = kind;
        self
    }

    pub fn weight(mut self, weight: Grams) -> Self {
        self.descriptor.weight = weight;
        self
    }

    pub fn height(mut self, height: Centimeters) -> Self {
        self.descriptor.height = height;
        self
    }

    pub fn irradiation(mut self, start: DateTime<Local>, finish: DateTime<Local>) -> Self {
        self.descriptor.irradiation_start = Some(start);
        self.descriptor.irradiation_finish = Some(finish);
        self
    }

    pub fn note(mut self, note: impl Into<String>) -> Self {
        self.descriptor.note = note.into();
        self
    }

    pub fn assistant(mut self, assistant: u32) -> Self {
        self.descriptor.assistant = assistant;
        self
    }

    /// Finish the descriptor, validating it
    pub fn build(self) -> Result<MeasurementDescriptor> {
        self.descriptor.validate()?;
        Ok(self.descriptor)
    }
}

/// Everything persisted alongside the spectrum counts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectrumMetadata {
    pub detector: String,
    pub operator: String,
    #[serde(flatten)]
    pub sample: SampleMetadata,
    pub preset_real_time: Seconds,
    pub elapsed_real_time: Seconds,
    pub saved_at: DateTime<Utc>,
}

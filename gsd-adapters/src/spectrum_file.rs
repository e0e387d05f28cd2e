//! Spectrum file format written by the simulated adapter
//!
//! A JSON document holding the measurement metadata next to the channel
//! counts. Files are only ever created, never replaced.

use anyhow::{bail, Context, Result};
use gsd_core::SpectrumMetadata;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// Format tag stored in every file
pub const FORMAT: &str = "gsd-spectrum/1";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectrumFile {
    pub format: String,
    pub metadata: SpectrumMetadata,
    /// Linear energy calibration, keV per channel
    pub kev_per_channel: f64,
    pub channels: Vec<u32>,
}

impl SpectrumFile {
    pub fn new(metadata: SpectrumMetadata, kev_per_channel: f64, channels: Vec<u32>) -> Self {
        Self {
            format: FORMAT.to_string(),
            metadata,
            kev_per_channel,
            channels,
        }
    }

    /// Write to `path`, failing if the file already exists
    pub fn write_new(&self, path: &Path) -> Result<()> {
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .with_context(|| format!("Failed to create spectrum file {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)
            .with_context(|| format!("Failed to encode spectrum {}", path.display()))?;
        writer
            .flush()
            .with_context(|| format!("Failed to flush spectrum file {}", path.display()))?;
        Ok(())
    }

    pub fn read(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open spectrum file {}", path.display()))?;
        let spectrum: SpectrumFile = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse spectrum file {}", path.display()))?;
        if spectrum.format != FORMAT {
            bail!("Unsupported spectrum format: {}", spectrum.format);
        }
        Ok(spectrum)
    }

    pub fn total_counts(&self) -> u64 {
        self.channels.iter().map(|&c| u64::from(c)).sum()
    }

    /// Energy at the centre of channel `index`
    pub fn energy_kev(&self, index: usize) -> f64 {
        (index as f64 + 0.5) * self.kev_per_channel
    }
}

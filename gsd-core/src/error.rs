//! Error types for detector control
//!
//! Every detector operation reports failures synchronously through [`Error`].
//! Adapter implementations return `anyhow` errors; the detector folds them into
//! the variant that matches the failing operation, keeping the full context
//! chain in the message.

use crate::model::DetectorStatus;
use thiserror::Error;

/// Result type for detector operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// The instrument could not be reached, at connect time or mid-session.
    #[error("detector {detector} hardware unavailable: {reason}")]
    HardwareUnavailable { detector: String, reason: String },

    /// The operation is not legal in the detector's current status, or the
    /// loaded acquisition was already finalized by stop or disconnect.
    #[error("cannot {operation} detector {detector} while {status}{}", finalized_note(.finalized))]
    InvalidState {
        detector: String,
        operation: &'static str,
        status: DetectorStatus,
        finalized: bool,
    },

    /// Acquisition or save was requested before measurement info was loaded.
    #[error("no measurement loaded on detector {detector}")]
    NoDescriptorLoaded { detector: String },

    /// The descriptor failed validation on load.
    #[error("invalid measurement descriptor: {0}")]
    InvalidDescriptor(String),

    /// Probing the output directory or writing the spectrum failed.
    #[error("failed to persist spectrum: {0}")]
    PersistenceFailure(String),

    /// A detector with this instrument name is already registered.
    #[error("detector {0} is already registered")]
    DuplicateDetector(String),

    /// No detector with this name is registered.
    #[error("unknown detector {0}")]
    UnknownDetector(String),
}

fn finalized_note(finalized: &bool) -> &'static str {
    if *finalized {
        " (acquisition finalized, load measurement info first)"
    } else {
        ""
    }
}

impl Error {
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, Error::InvalidState { .. })
    }

    pub(crate) fn hardware(detector: &str, err: anyhow::Error) -> Self {
        Error::HardwareUnavailable {
            detector: detector.to_string(),
            reason: format!("{:#}", err),
        }
    }
}

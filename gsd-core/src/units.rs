//! Type-safe wrappers for physical units
//!
//! Newtype wrappers keep acquisition times, sample masses and geometry
//! heights from being mixed up at the adapter boundary.
//!
//! All unit types serialize with 4 decimal places to keep spectrum headers
//! and API payloads compact.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Round f64 to 4 decimal places for compact JSON serialization
fn round4<S: serde::Serializer>(val: &f64, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64((*val * 10000.0).round() / 10000.0)
}

/// Seconds (preset and elapsed real time)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Seconds(#[serde(serialize_with = "round4")] pub f64);

impl Seconds {
    pub const ZERO: Seconds = Seconds(0.0);

    /// Whole seconds, the resolution presets are configured in
    pub fn from_secs(secs: u32) -> Self {
        Self(f64::from(secs))
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.0
    }
}

impl From<Duration> for Seconds {
    fn from(d: Duration) -> Self {
        Self(d.as_secs_f64())
    }
}

impl fmt::Display for Seconds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}s", self.0)
    }
}

/// Grams (sample weight)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Grams(#[serde(serialize_with = "round4")] pub f64);

impl Grams {
    /// Unit label recorded alongside the quantity in spectrum files
    pub const UNIT: &'static str = "gram";
}

/// Centimeters (counting geometry height above the detector cap)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Centimeters(#[serde(serialize_with = "round4")] pub f64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seconds_rounds_when_serialized() {
        let json = serde_json::to_string(&Seconds(2.123456789)).unwrap();
        assert_eq!(json, "2.1235");
    }

    #[test]
    fn test_seconds_from_duration() {
        let s = Seconds::from(Duration::from_millis(1500));
        assert_eq!(s, Seconds(1.5));
        assert_eq!(s.to_string(), "1.5s");
    }
}

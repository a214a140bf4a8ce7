//! Satellite catalogue types and the pass prediction seam.
//!
//! Orbit propagation itself is done by an external predictor; this module
//! only describes what a pass window looks like and how one is requested.

mod predictor;

pub use predictor::{PassPredictor, PredictorError, ScheduledPass, ScheduledPasses};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Decode pipeline a satellite transmits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecoderMode {
    /// METEOR-M LRPT imagery (QPSK, 72 ksym/s).
    Lrpt,
    /// JY1SAT telemetry beacon (BPSK, 1200 baud).
    Jy1sat,
}

impl DecoderMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lrpt => "lrpt",
            Self::Jy1sat => "jy1sat",
        }
    }
}

impl fmt::Display for DecoderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-satellite overrides of the demodulator defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DemodParams {
    /// Sample rate of the recorded WAV, if it differs from the capture default.
    #[serde(default)]
    pub sample_rate: Option<u32>,
    /// Symbol rate of the downlink, if it differs from the mode default.
    #[serde(default)]
    pub baud_rate: Option<u32>,
}

/// A satellite the station listens to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SatelliteDescriptor {
    pub id: String,
    pub name: String,
    /// Downlink carrier frequency in Hz.
    pub frequency_hz: u64,
    pub mode: DecoderMode,
    #[serde(default)]
    pub demod: DemodParams,
}

/// Time interval during which a satellite is above the horizon.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PassWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Peak elevation in degrees.
    #[serde(default)]
    pub max_elevation: f64,
}

impl PassWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start,
            end,
            max_elevation: 0.0,
        }
    }

    pub fn duration(&self) -> chrono::Duration {
        self.end - self.start
    }

    /// Whether the window has fully elapsed at `now`.
    pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
        self.end <= now
    }
}

/// Geodetic position of the antenna.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ObserverLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude_m: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_decoder_mode_serde() {
        let mode: DecoderMode = serde_json::from_str("\"jy1sat\"").unwrap();
        assert_eq!(mode, DecoderMode::Jy1sat);
        assert_eq!(serde_json::to_string(&DecoderMode::Lrpt).unwrap(), "\"lrpt\"");
        assert_eq!(DecoderMode::Lrpt.to_string(), "lrpt");
    }

    #[test]
    fn test_pass_window_bounds() {
        let start = Utc.with_ymd_and_hms(2017, 9, 29, 17, 5, 58).unwrap();
        let end = Utc.with_ymd_and_hms(2017, 9, 29, 17, 17, 13).unwrap();
        let window = PassWindow::new(start, end);
        assert_eq!(window.duration().num_seconds(), 675);
        assert!(!window.has_ended(start));
        assert!(window.has_ended(end));
    }
}

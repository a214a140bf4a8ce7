//! Tuner capture chain.

use std::path::{Path, PathBuf};

use crate::config::CaptureConfig;
use crate::process::CommandSpec;
use crate::satellite::SatelliteDescriptor;

/// `rtl_sdr` streaming unsigned 8-bit IQ to stdout, piped into `sox`
/// resampling it into a WAV file at `wav_path`.
pub fn capture_commands(
    config: &CaptureConfig,
    satellite: &SatelliteDescriptor,
    wav_path: &Path,
) -> Vec<CommandSpec> {
    let input_rate = config.input_sample_rate.to_string();
    let output_rate = satellite
        .demod
        .sample_rate
        .unwrap_or(config.output_sample_rate)
        .to_string();

    let frequency = satellite.frequency_hz.to_string();
    let gain = config.gain.to_string();
    let ppm = config.ppm.to_string();

    let rtl_sdr = CommandSpec::new(&config.rtl_sdr_path)
        .args(["-f", frequency.as_str()])
        .args(["-s", input_rate.as_str()])
        .args(["-g", gain.as_str()])
        .args(["-p", ppm.as_str()])
        .arg("-");

    let sox = CommandSpec::new(&config.sox_path)
        .args(["--type", "raw"])
        .args(["--rate", input_rate.as_str()])
        .args(["--encoding", "unsigned-integer"])
        .args(["--bits", "8"])
        .args(["--channels", "2"])
        .arg("-")
        .arg(wav_path.to_string_lossy())
        .args(["rate", output_rate.as_str()]);

    vec![rtl_sdr, sox]
}

/// Allocate an empty file for the capture under `work_dir`.
pub fn allocate_raw_file(
    work_dir: &Path,
    satellite_id: &str,
    observation_id: &str,
) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(work_dir)?;
    let file = tempfile::Builder::new()
        .prefix(&format!("{}-{}-", satellite_id, observation_id))
        .suffix(".wav")
        .tempfile_in(work_dir)?;
    file.into_temp_path().keep().map_err(|e| e.error)
}

/// Whether the capture produced any bytes.
pub fn has_capture(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false)
}

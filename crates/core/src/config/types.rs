use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

use crate::satellite::{ObserverLocation, SatelliteDescriptor};

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub station: StationConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub predictor: PredictorConfig,
    #[serde(default)]
    pub dsp: DspConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub ddns: Option<DdnsConfig>,
    #[serde(default)]
    pub satellites: Vec<SatelliteDescriptor>,
}

/// Location of the receiving antenna.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StationConfig {
    /// Degrees north.
    #[serde(default)]
    pub latitude: f64,
    /// Degrees east.
    #[serde(default)]
    pub longitude: f64,
    #[serde(default)]
    pub altitude_m: f64,
}

impl StationConfig {
    pub fn observer(&self) -> ObserverLocation {
        ObserverLocation {
            latitude: self.latitude,
            longitude: self.longitude,
            altitude_m: self.altitude_m,
        }
    }
}

/// Tuner capture chain (rtl_sdr piped into sox).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CaptureConfig {
    #[serde(default = "default_rtl_sdr_path")]
    pub rtl_sdr_path: PathBuf,
    #[serde(default = "default_sox_path")]
    pub sox_path: PathBuf,
    /// Raw IQ rate requested from the tuner (Hz).
    #[serde(default = "default_input_sample_rate")]
    pub input_sample_rate: u32,
    /// Rate sox resamples the WAV file to (Hz).
    #[serde(default = "default_output_sample_rate")]
    pub output_sample_rate: u32,
    #[serde(default = "default_gain")]
    pub gain: u32,
    /// Tuner frequency correction in parts per million.
    #[serde(default)]
    pub ppm: i32,
    /// How long each child gets to exit after SIGTERM before it is killed.
    #[serde(default = "default_teardown_timeout")]
    pub teardown_timeout_secs: u64,
    /// Directory for in-flight raw captures.
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
}

fn default_rtl_sdr_path() -> PathBuf {
    PathBuf::from("rtl_sdr")
}

fn default_sox_path() -> PathBuf {
    PathBuf::from("sox")
}

fn default_input_sample_rate() -> u32 {
    1_440_000
}

fn default_output_sample_rate() -> u32 {
    150_000
}

fn default_gain() -> u32 {
    45
}

fn default_teardown_timeout() -> u64 {
    10
}

fn default_work_dir() -> PathBuf {
    std::env::temp_dir().join("groundstation")
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            rtl_sdr_path: default_rtl_sdr_path(),
            sox_path: default_sox_path(),
            input_sample_rate: default_input_sample_rate(),
            output_sample_rate: default_output_sample_rate(),
            gain: default_gain(),
            ppm: 0,
            teardown_timeout_secs: default_teardown_timeout(),
            work_dir: default_work_dir(),
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("groundstation.db")
}

/// Where captured and decoded artifacts are kept.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
        }
    }
}

fn default_base_dir() -> PathBuf {
    PathBuf::from("observations")
}

/// Periods of the background loops.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SchedulerConfig {
    /// How often the planner asks the predictor for upcoming passes.
    #[serde(default = "default_planner_interval")]
    pub planner_interval_secs: u64,
}

fn default_planner_interval() -> u64 {
    60
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            planner_interval_secs: default_planner_interval(),
        }
    }
}

/// Source of precomputed pass windows.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PredictorConfig {
    #[serde(default = "default_schedule_path")]
    pub schedule_path: PathBuf,
}

fn default_schedule_path() -> PathBuf {
    PathBuf::from("passes.json")
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            schedule_path: default_schedule_path(),
        }
    }
}

/// External decoder commands backing the sample pipelines.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DspConfig {
    /// Demodulates an LRPT recording into frames.
    #[serde(default)]
    pub lrpt: Option<DspCommand>,
    /// Demodulates a BPSK beacon recording into frames.
    #[serde(default)]
    pub bpsk: Option<DspCommand>,
    /// Renders LRPT frames into an encoded image.
    #[serde(default)]
    pub image: Option<DspCommand>,
    /// Limit on a single decoder or renderer run; the command is killed
    /// when it is exceeded.
    #[serde(default = "default_dsp_timeout")]
    pub timeout_secs: u64,
}

impl Default for DspConfig {
    fn default() -> Self {
        Self {
            lrpt: None,
            bpsk: None,
            image: None,
            timeout_secs: default_dsp_timeout(),
        }
    }
}

fn default_dsp_timeout() -> u64 {
    600
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DspCommand {
    pub program: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Status endpoint configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

/// No-IP dynamic DNS updater.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DdnsConfig {
    pub username: String,
    pub password: String,
    pub domain: String,
    #[serde(default = "default_update_url")]
    pub update_url: String,
    /// Plain-text endpoint answering with the caller's public IP.
    #[serde(default = "default_external_ip_url")]
    pub external_ip_url: String,
    #[serde(default = "default_ddns_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
}

fn default_update_url() -> String {
    "https://dynupdate.no-ip.com/nic/update".to_string()
}

fn default_external_ip_url() -> String {
    "https://checkip.amazonaws.com".to_string()
}

fn default_ddns_interval() -> u64 {
    3600
}

fn default_request_timeout() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::satellite::DecoderMode;

    #[test]
    fn test_deserialize_with_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.capture.input_sample_rate, 1_440_000);
        assert_eq!(config.capture.output_sample_rate, 150_000);
        assert_eq!(config.capture.gain, 45);
        assert_eq!(config.capture.ppm, 0);
        assert_eq!(config.scheduler.planner_interval_secs, 60);
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.database.path.to_str().unwrap(), "groundstation.db");
    }

    #[test]
    fn test_deserialize_ddns_defaults() {
        let toml = r#"
[ddns]
username = "user"
password = "secret"
domain = "station.ddns.net"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        let ddns = config.ddns.unwrap();
        assert_eq!(ddns.update_url, "https://dynupdate.no-ip.com/nic/update");
        assert_eq!(ddns.interval_secs, 3600);
        assert_eq!(ddns.timeout_secs, 30);
    }

    #[test]
    fn test_deserialize_ddns_missing_domain_fails() {
        let toml = r#"
[ddns]
username = "user"
password = "secret"
"#;
        let result: Result<Config, _> = toml::from_str(toml);
        assert!(result.is_err());
    }

    #[test]
    fn test_deserialize_satellites_and_dsp() {
        let toml = r#"
[dsp.lrpt]
program = "/opt/dsp/lrpt_demod"
args = ["--quiet"]

[[satellites]]
id = "40069"
name = "METEOR-M 2"
frequency_hz = 137100000
mode = "lrpt"

[[satellites]]
id = "43803"
name = "JY1SAT"
frequency_hz = 145840000
mode = "jy1sat"

[satellites.demod]
baud_rate = 1200
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.satellites.len(), 2);
        assert_eq!(config.satellites[1].mode, DecoderMode::Jy1sat);
        assert_eq!(config.satellites[1].demod.baud_rate, Some(1200));
        let lrpt = config.dsp.lrpt.unwrap();
        assert_eq!(lrpt.program.to_str().unwrap(), "/opt/dsp/lrpt_demod");
        assert_eq!(lrpt.args, vec!["--quiet".to_string()]);
        assert!(config.dsp.image.is_none());
        assert_eq!(config.dsp.timeout_secs, 600);
    }

    #[test]
    fn test_station_observer() {
        let station = StationConfig {
            latitude: 51.49,
            longitude: 0.01,
            altitude_m: 12.0,
        };
        let observer = station.observer();
        assert_eq!(observer.latitude, 51.49);
        assert_eq!(observer.altitude_m, 12.0);
    }
}

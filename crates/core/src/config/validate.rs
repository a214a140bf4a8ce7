use std::collections::HashSet;

use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Station coordinates are within range
/// - Capture rates, teardown and decoder timeouts, loop periods are not 0
/// - Satellite ids are unique and frequencies set
/// - DDNS credentials are present when the section exists
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if !(-90.0..=90.0).contains(&config.station.latitude) {
        return Err(invalid("station.latitude must be within [-90, 90]"));
    }
    if !(-180.0..=180.0).contains(&config.station.longitude) {
        return Err(invalid("station.longitude must be within [-180, 180]"));
    }

    let capture = &config.capture;
    if capture.input_sample_rate == 0 || capture.output_sample_rate == 0 {
        return Err(invalid("capture sample rates cannot be 0"));
    }
    if capture.teardown_timeout_secs == 0 {
        return Err(invalid("capture.teardown_timeout_secs cannot be 0"));
    }

    if config.dsp.timeout_secs == 0 {
        return Err(invalid("dsp.timeout_secs cannot be 0"));
    }

    if config.scheduler.planner_interval_secs == 0 {
        return Err(invalid("scheduler.planner_interval_secs cannot be 0"));
    }

    let mut seen = HashSet::new();
    for satellite in &config.satellites {
        if satellite.id.trim().is_empty() {
            return Err(invalid("satellite id cannot be empty"));
        }
        if !seen.insert(satellite.id.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "duplicate satellite id: {}",
                satellite.id
            )));
        }
        if satellite.frequency_hz == 0 {
            return Err(ConfigError::ValidationError(format!(
                "satellite {} has no frequency",
                satellite.id
            )));
        }
    }

    if let Some(ddns) = &config.ddns {
        for (name, value) in [
            ("ddns.username", &ddns.username),
            ("ddns.password", &ddns.password),
            ("ddns.domain", &ddns.domain),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "{} cannot be empty",
                    name
                )));
            }
        }
        if ddns.interval_secs == 0 {
            return Err(invalid("ddns.interval_secs cannot be 0"));
        }
    }

    Ok(())
}

fn invalid(reason: &str) -> ConfigError {
    ConfigError::ValidationError(reason.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config_from_str;

    const SATELLITES: &str = r#"
[[satellites]]
id = "40069"
name = "METEOR-M 2"
frequency_hz = 137100000
mode = "lrpt"
"#;

    #[test]
    fn test_validate_valid_config() {
        let config = load_config_from_str(SATELLITES).unwrap();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_duplicate_satellite_fails() {
        let toml = format!("{}{}", SATELLITES, SATELLITES);
        let config = load_config_from_str(&toml).unwrap();
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(ref m) if m.contains("40069")));
    }

    #[test]
    fn test_validate_zero_dsp_timeout_fails() {
        let mut config = load_config_from_str(SATELLITES).unwrap();
        config.dsp.timeout_secs = 0;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_validate_zero_planner_interval_fails() {
        let mut config = load_config_from_str(SATELLITES).unwrap();
        config.scheduler.planner_interval_secs = 0;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_validate_blank_ddns_credentials_fail() {
        let toml = r#"
[ddns]
username = "  "
password = "secret"
domain = "station.ddns.net"
"#;
        let config = load_config_from_str(toml).unwrap();
        let err = validate_config(&config).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Configuration validation failed: ddns.username cannot be empty"
        );
    }

    #[test]
    fn test_validate_latitude_out_of_range() {
        let mut config = load_config_from_str("").unwrap();
        config.station.latitude = 91.0;
        assert!(validate_config(&config).is_err());
    }
}

//! YAML configuration file, overridden by command-line flags.

use crate::error::CliError;
use nxt_link::{PollConfig, SessionConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Settings shared by every subcommand.
///
/// ```yaml
/// port: /dev/rfcomm0
/// baud_rate: 115200
/// reply_timeout_ms: 1000
/// lowspeed:
///   max_polls: 20
///   poll_interval_ms: 5
/// sequence: sensors.yaml
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Serial port name (e.g. `COM8`, `/dev/rfcomm0`).
    pub port: Option<String>,
    #[serde(flatten)]
    pub session: SessionConfig,
    /// Polling bound for low-speed exchanges.
    pub lowspeed: PollConfig,
    /// Sequence file used by `run` when none is given.
    pub sequence: Option<PathBuf>,
}

impl CliConfig {
    /// Load a configuration file; `None` yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<CliConfig, CliError> {
        let Some(path) = path else {
            return Ok(CliConfig::default());
        };
        let text = std::fs::read_to_string(path).map_err(|source| CliError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: CliConfig =
            serde_yaml::from_str(&text).map_err(|source| CliError::Yaml {
                path: path.to_path_buf(),
                source,
            })?;

        // Relative sequence paths are relative to the config file.
        if let (Some(sequence), Some(dir)) = (&config.sequence, path.parent()) {
            if sequence.is_relative() {
                config.sequence = Some(dir.join(sequence));
            }
        }
        Ok(config)
    }

    /// Apply command-line overrides.
    pub fn with_overrides(
        mut self,
        port: Option<String>,
        baud_rate: Option<u32>,
        timeout_ms: Option<u64>,
    ) -> CliConfig {
        if port.is_some() {
            self.port = port;
        }
        if let Some(baud_rate) = baud_rate {
            self.session.baud_rate = baud_rate;
        }
        if let Some(timeout_ms) = timeout_ms {
            self.session.reply_timeout_ms = timeout_ms;
        }
        self
    }

    pub fn port(&self) -> Result<&str, CliError> {
        self.port.as_deref().ok_or(CliError::NoPort)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let yaml = r#"
port: COM8
reply_timeout_ms: 800
lowspeed:
  max_polls: 25
sequence: seq.yaml
"#;
        let config: CliConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.port.as_deref(), Some("COM8"));
        assert_eq!(config.session.reply_timeout_ms, 800);
        assert_eq!(config.session.baud_rate, SessionConfig::default().baud_rate);
        assert_eq!(config.lowspeed.max_polls, 25);
        assert_eq!(config.lowspeed.poll_interval_ms, 10);
        assert_eq!(config.sequence, Some(PathBuf::from("seq.yaml")));
    }

    #[test]
    fn test_flags_override_file() {
        let config = CliConfig {
            port: Some("COM3".into()),
            ..CliConfig::default()
        }
        .with_overrides(Some("/dev/ttyACM0".into()), Some(57600), None);

        assert_eq!(config.port().unwrap(), "/dev/ttyACM0");
        assert_eq!(config.session.baud_rate, 57600);
        assert_eq!(config.session.reply_timeout_ms, 1500);
    }

    #[test]
    fn test_missing_port() {
        let config = CliConfig::default();
        assert!(matches!(config.port(), Err(CliError::NoPort)));
    }

    #[test]
    fn test_no_file_means_defaults() {
        assert_eq!(CliConfig::load(None).unwrap(), CliConfig::default());
    }
}

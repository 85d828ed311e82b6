//! Service configuration from the environment

use cellular_core::{ConfigError, DEFAULT_CONFIG_PATH};
use cellular_modem::{PipeConfig, SerialConfig};
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub serial: SerialConfig,
    pub pipes: PipeConfig,
    /// Mail configuration file
    pub mail_config: PathBuf,
    /// `AT` probes before giving up on the modem
    pub probe_attempts: u32,
    /// Expiry of incomplete concatenated messages, `None` keeps them forever
    pub segment_ttl: Option<chrono::Duration>,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let serial_defaults = SerialConfig::default();

        let ttl_secs: i64 = parse_or(&lookup, "SEGMENT_TTL_SECS", 86_400)?;
        if ttl_secs < 0 {
            return Err(ConfigError::Invalid {
                key: "SEGMENT_TTL_SECS".to_string(),
                reason: "must not be negative".to_string(),
            });
        }
        let segment_ttl = match ttl_secs {
            0 => None,
            secs => Some(chrono::Duration::try_seconds(secs).ok_or_else(|| {
                ConfigError::Invalid {
                    key: "SEGMENT_TTL_SECS".to_string(),
                    reason: format!("{} seconds is out of range", secs),
                }
            })?),
        };

        Ok(Self {
            serial: SerialConfig {
                path: lookup("SERIAL_PORT").unwrap_or(serial_defaults.path),
                baud_rate: parse_or(&lookup, "SERIAL_BAUD", serial_defaults.baud_rate)?,
                at_timeout_ms: parse_or(&lookup, "AT_TIMEOUT_MS", serial_defaults.at_timeout_ms)?,
                poll_interval_ms: serial_defaults.poll_interval_ms,
            },
            pipes: PipeConfig {
                dir: lookup("PIPE_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PipeConfig::default().dir),
            },
            mail_config: lookup("MAIL_CONFIG")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH)),
            probe_attempts: parse_or(&lookup, "PROBE_ATTEMPTS", 30)?,
            segment_ttl,
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key: key.to_string(),
            reason: format!("{:?}: {}", raw, e),
        }),
    }
}

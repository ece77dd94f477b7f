//! Configuration and settings management for gcodestream
//!
//! Supports JSON and TOML file formats. The default location lives in the
//! platform config directory (`<config>/gcodestream/config.toml`).
//!
//! Configuration is organized into logical sections:
//! - Connection settings (port, baud rate, receive poll bound)
//! - Streaming settings (settle delay, homing follow-up)
//! - Jog step distances per speed class

use crate::error::{SettingsError, SettingsResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// Serial port name (e.g., "/dev/ttyUSB0", "COM3")
    pub port: String,
    /// Baud rate for serial connections
    pub baud_rate: u32,
    /// Upper bound for a single receive poll in milliseconds
    pub read_timeout_ms: u64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: 9600,
            read_timeout_ms: 50,
        }
    }
}

/// Streaming settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingSettings {
    /// Minimum pause after each transmitted line in milliseconds
    pub settle_delay_ms: u64,
    /// Delay before the status query that follows a homing command
    pub home_status_delay_ms: u64,
}

impl Default for StreamingSettings {
    fn default() -> Self {
        Self {
            settle_delay_ms: 100,
            home_status_delay_ms: 1000,
        }
    }
}

/// Jog step distances per speed class, in machine units
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JogSettings {
    /// Slow step
    pub slow: f64,
    /// Medium step
    pub medium: f64,
    /// Fast step
    pub fast: f64,
}

impl Default for JogSettings {
    fn default() -> Self {
        Self {
            slow: 0.001,
            medium: 0.01,
            fast: 0.1,
        }
    }
}

/// Complete application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Connection settings
    pub connection: ConnectionSettings,
    /// Streaming settings
    pub streaming: StreamingSettings,
    /// Jog distances
    pub jog: JogSettings,
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Default config file location
    pub fn default_path() -> SettingsResult<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("gcodestream").join("config.toml"))
            .ok_or_else(|| {
                SettingsError::ConfigDirectory("no platform config directory".to_string())
            })
    }

    /// Load the config from the default location, falling back to defaults
    /// when no file exists there yet.
    pub fn load_or_default() -> SettingsResult<Self> {
        let path = Self::default_path()?;
        if path.exists() {
            Self::load_from_file(&path)
        } else {
            tracing::debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Load config from file (JSON or TOML)
    pub fn load_from_file(path: &Path) -> SettingsResult<Self> {
        let content = std::fs::read_to_string(path)?;

        let config: Self = match extension(path) {
            Some("json") => serde_json::from_str(&content)?,
            Some("toml") => toml::from_str(&content)?,
            _ => {
                return Err(SettingsError::UnsupportedFormat(
                    path.display().to_string(),
                ))
            }
        };

        config.validate()?;
        tracing::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Save config to file (JSON or TOML)
    pub fn save_to_file(&self, path: &Path) -> SettingsResult<()> {
        self.validate()?;

        let content = match extension(path) {
            Some("json") => serde_json::to_string_pretty(self)?,
            Some("toml") => toml::to_string_pretty(self)?,
            _ => {
                return Err(SettingsError::UnsupportedFormat(
                    path.display().to_string(),
                ))
            }
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> SettingsResult<()> {
        if self.connection.baud_rate == 0 {
            return Err(SettingsError::invalid("connection.baud_rate", "must be > 0"));
        }

        if self.connection.read_timeout_ms == 0 {
            return Err(SettingsError::invalid(
                "connection.read_timeout_ms",
                "must be > 0",
            ));
        }

        if self.streaming.settle_delay_ms == 0 {
            return Err(SettingsError::invalid(
                "streaming.settle_delay_ms",
                "must be > 0",
            ));
        }

        let jog = &self.jog;
        if jog.slow <= 0.0 || jog.medium <= 0.0 || jog.fast <= 0.0 {
            return Err(SettingsError::invalid("jog", "distances must be > 0"));
        }

        if !(jog.slow < jog.medium && jog.medium < jog.fast) {
            return Err(SettingsError::invalid(
                "jog",
                "distances must increase from slow to fast",
            ));
        }

        Ok(())
    }
}

fn extension(path: &Path) -> Option<&str> {
    path.extension().and_then(|ext| ext.to_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::new();
        assert!(config.validate().is_ok());
        assert_eq!(config.connection.baud_rate, 9600);
        assert_eq!(config.streaming.settle_delay_ms, 100);
        assert_eq!(config.jog.medium, 0.01);
    }

    #[test]
    fn test_rejects_zero_settle_delay() {
        let mut config = Config::new();
        config.streaming.settle_delay_ms = 0;
        assert!(matches!(
            config.validate(),
            Err(SettingsError::InvalidSetting { .. })
        ));
    }

    #[test]
    fn test_rejects_non_increasing_jog() {
        let mut config = Config::new();
        config.jog.fast = 0.005;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str("[connection]\nport = \"/dev/ttyACM0\"\n").unwrap();
        assert_eq!(config.connection.port, "/dev/ttyACM0");
        assert_eq!(config.connection.baud_rate, 9600);
        assert_eq!(config.streaming, StreamingSettings::default());
    }
}

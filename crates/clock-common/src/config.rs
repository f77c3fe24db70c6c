//! Configuration structures for the bridge and its command-line front end.
//!
//! Supports TOML deserialization with sensible defaults so an empty file
//! (or no file at all) yields a working simulated setup.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default capacity of a per-clock event channel.
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Top-level bridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Which clock library implementation to drive.
    pub backend: Backend,

    /// Capacity of the bounded channel returned by `Clock::subscribe`.
    pub event_channel_capacity: usize,

    /// In-process library configuration.
    pub simulated: SimulatedConfig,

    /// Command-line front end configuration.
    pub cli: CliConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Simulated,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            simulated: SimulatedConfig::default(),
            cli: CliConfig::default(),
        }
    }
}

/// Supported clock library implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// In-process implementation of the libclock contract.
    #[default]
    Simulated,
    /// The native `libclock` shared library.
    Native,
}

/// In-process library configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatedConfig {
    /// Maximum number of pending alarms per clock; further requests fail.
    pub max_alarms: usize,
}

impl Default for SimulatedConfig {
    fn default() -> Self {
        Self { max_alarms: 64 }
    }
}

/// Command-line front end configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Alarm delay used when none is given on the command line.
    #[serde(with = "humantime_serde")]
    pub default_delay: Duration,

    /// Extra time to wait for an alarm beyond its delay before giving up.
    #[serde(with = "humantime_serde")]
    pub wait_slack: Duration,

    /// Alarm message used when none is given on the command line.
    pub default_message: String,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            default_delay: Duration::from_secs(1),
            wait_slack: Duration::from_secs(1),
            default_message: String::from("alarm"),
        }
    }
}

impl BridgeConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or a value is out of range.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Check value ranges that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.event_channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "event_channel_capacity must be at least 1".into(),
            ));
        }
        if self.simulated.max_alarms == 0 {
            return Err(ConfigError::Invalid(
                "simulated.max_alarms must be at least 1".into(),
            ));
        }
        if i32::try_from(self.cli.default_delay.as_millis()).is_err() {
            return Err(ConfigError::Invalid(
                "cli.default_delay does not fit a C int of milliseconds".into(),
            ));
        }
        Ok(())
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File I/O error.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// TOML parsing error.
    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("failed to serialize TOML: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Value out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Serde helper module for `Duration` using humantime format.
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

//! Sync configuration.
//!
//! Parsed from TOML; every field has a default so an empty document is a
//! valid configuration. Durations use the humantime format ("2s", "500ms").

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse the TOML document.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Failed to serialize the configuration.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A field value is outside its valid range.
    #[error("invalid config: {0}")]
    Validation(String),
}

/// Tunables of the synchronization layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Base reconnection delay; attempt n waits `base_delay * n`.
    #[serde(default = "default_base_delay")]
    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,

    /// Maximum automatic reconnection attempts before the subscription is
    /// declared failed and waits for an explicit reconnect.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// How long a subscription handshake may take before it is treated as
    /// timed out and enters the reconnection protocol.
    #[serde(default = "default_handshake_timeout")]
    #[serde(with = "humantime_serde")]
    pub handshake_timeout: Duration,

    /// Capacity of the bounded channel delivering change events to the
    /// consumer. A full channel backpressures the transport instead of
    /// dropping events.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,

    /// Default page size of the derived view.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

const fn default_base_delay() -> Duration {
    Duration::from_millis(2000)
}

const fn default_max_retries() -> u32 {
    5
}

const fn default_handshake_timeout() -> Duration {
    Duration::from_secs(10)
}

const fn default_event_buffer() -> usize {
    64
}

const fn default_page_size() -> usize {
    10
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_delay: default_base_delay(),
            max_retries: default_max_retries(),
            handshake_timeout: default_handshake_timeout(),
            event_buffer: default_event_buffer(),
            page_size: default_page_size(),
        }
    }
}

impl SyncConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if a field
    /// fails validation.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid, or if `event_buffer` or
    /// `page_size` is zero.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        if config.event_buffer == 0 {
            return Err(ConfigError::Validation(
                "event_buffer must be at least 1".to_string(),
            ));
        }
        if config.page_size == 0 {
            return Err(ConfigError::Validation(
                "page_size must be at least 1".to_string(),
            ));
        }
        Ok(config)
    }

    /// Serialize configuration to TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

mod humantime_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

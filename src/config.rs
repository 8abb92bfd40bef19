//! Sampler Configuration
//!
//! The only tunable is the window width. It can come from code, from the
//! `SAMPLER_WINDOW_MS` environment variable, or from a TOML document:
//!
//! ```toml
//! window_ms = 60000
//! ```

use crate::sampler::duration_to_millis;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable holding the window width in milliseconds
pub const WINDOW_ENV_VAR: &str = "SAMPLER_WINDOW_MS";

/// Default window width (one minute)
pub const DEFAULT_WINDOW: Duration = Duration::from_millis(60_000);

/// Configuration for a windowed sampler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Width of each aggregation window (default: 60s)
    #[serde(rename = "window_ms", with = "duration_millis")]
    pub window: Duration,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        SamplerConfig {
            window: DEFAULT_WINDOW,
        }
    }
}

impl SamplerConfig {
    pub fn new(window: Duration) -> Self {
        SamplerConfig { window }
    }

    /// Load configuration from environment variables
    ///
    /// Unset or unparsable values fall back to the default.
    pub fn from_env() -> Self {
        SamplerConfig {
            window: std::env::var(WINDOW_ENV_VAR)
                .ok()
                .and_then(|s| s.trim().parse::<u64>().ok())
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_WINDOW),
        }
    }

    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: SamplerConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Window width in whole milliseconds
    pub fn window_ms(&self) -> u64 {
        duration_to_millis(self.window)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_ms() == 0 {
            return Err(ConfigError::InvalidWindow);
        }
        Ok(())
    }
}

/// Configuration error types
#[derive(Debug)]
pub enum ConfigError {
    /// Reading the config file failed
    Io(std::io::Error),
    /// The document is not valid TOML for this config
    Parse(String),
    /// Window width rounds down to zero milliseconds
    InvalidWindow,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "I/O error: {}", e),
            ConfigError::Parse(msg) => write!(f, "Config parse error: {}", msg),
            ConfigError::InvalidWindow => {
                write!(f, "Window width must be at least 1 millisecond")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e.to_string())
    }
}

/// Serde helper for Duration as milliseconds
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        super::duration_to_millis(*duration).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

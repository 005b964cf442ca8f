//! Transport Configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::constants::NTCP_TERMINATION_TIMEOUT_SECS;

/// NTCP transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Idle interval before a session is terminated (seconds)
    pub idle_timeout_secs: u64,

    /// Number of precomputed DH keypairs the transport keeps pooled
    pub dh_pool_size: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: NTCP_TERMINATION_TIMEOUT_SECS,
            dh_pool_size: 16,
        }
    }
}

impl TransportConfig {
    /// Idle-termination timeout as a duration
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Load configuration from a TOML file
    pub fn load_from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Save configuration to a TOML file
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.idle_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "idle_timeout_secs cannot be 0".into(),
            ));
        }
        Ok(())
    }
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TransportConfig::default();
        assert_eq!(config.idle_timeout(), Duration::from_secs(120));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        let config = TransportConfig {
            idle_timeout_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = TransportConfig {
            idle_timeout_secs: 45,
            dh_pool_size: 4,
        };
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: TransportConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.idle_timeout_secs, 45);
        assert_eq!(parsed.dh_pool_size, 4);
    }
}

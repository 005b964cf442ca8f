//! Reseed Configuration

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reseed configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReseedConfig {
    /// Hosts serving `i2pseeds.su3`, each ending in a slash
    pub hosts: Vec<String>,
}

impl Default for ReseedConfig {
    fn default() -> Self {
        Self {
            hosts: vec![
                "https://reseed.i2p-projekt.de/".to_string(),
                "https://netdb.i2p2.no/".to_string(),
                "https://uk.reseed.i2p2.no/".to_string(),
                "https://us.reseed.i2p2.no/".to_string(),
                "https://jp.reseed.i2p2.no/".to_string(),
                "https://i2p-netdb.innovatio.no/".to_string(),
                "https://reseed.info/".to_string(),
            ],
        }
    }
}

impl ReseedConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file(path: &std::path::Path) -> Result<Self, ReseedConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ReseedConfigError::IoError(e.to_string()))?;
        toml::from_str(&content).map_err(|e| ReseedConfigError::ParseError(e.to_string()))
    }

    /// Save configuration to a TOML file
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<(), ReseedConfigError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ReseedConfigError::SerializeError(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ReseedConfigError::IoError(e.to_string()))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ReseedConfigError> {
        if self.hosts.is_empty() {
            return Err(ReseedConfigError::InvalidValue(
                "at least one reseed host is required".into(),
            ));
        }
        Ok(())
    }
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ReseedConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

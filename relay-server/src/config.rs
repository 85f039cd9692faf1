//! Server configuration.
//!
//! Loaded from a YAML or JSON file, every section optional; CLI flags and
//! environment variables override individual fields in `main`.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use relay_hub::HubConfig;

use crate::logging::LogConfig;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listener settings
    #[serde(default)]
    pub server: HttpConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LogConfig,

    /// Relay hub settings
    #[serde(default)]
    pub hub: HubConfig,
}

impl ServerConfig {
    /// Loads configuration from a YAML or JSON file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml" | "yml") => Ok(serde_yaml::from_str(&raw)?),
            Some("json") => Ok(serde_json::from_str(&raw)?),
            other => Err(ConfigError::UnsupportedFormat(
                other.unwrap_or("<none>").to_string(),
            )),
        }
    }

    /// Returns the listener bind address.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Listener host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Listener port
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid YAML
    #[error("invalid YAML configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// The file is not valid JSON
    #[error("invalid JSON configuration: {0}")]
    Json(#[from] serde_json::Error),

    /// Unrecognized file extension
    #[error("unsupported configuration format: {0}")]
    UnsupportedFormat(String),
}

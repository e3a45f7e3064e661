//! Client configuration
//!
//! TOML-backed configuration for the live-updates client: where the channel
//! lives, how reconnects back off, and whether the diagnostics server runs.

use crate::connection::ReconnectConfig;
use crate::event_log::EVENT_LOG_CAPACITY;
use crate::protocol::{channel_url, parse_channel_url, EndpointError, DEFAULT_CHANNEL_PATH};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Environment variable that overrides `[diagnostics] port`
pub const DIAGNOSTICS_PORT_ENV: &str = "DIAGNOSTICS_PORT";

/// Main client configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientConfig {
    pub endpoint: EndpointSection,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    #[serde(default)]
    pub diagnostics: DiagnosticsSection,
}

/// Where the live channel is
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EndpointSection {
    /// URL of the page hosting the client; the channel shares its host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_url: Option<String>,
    /// Channel path on the page's host
    #[serde(default = "default_channel_path")]
    pub channel_path: String,
    /// Explicit ws:// or wss:// URL; wins over `page_url`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn default_channel_path() -> String {
    DEFAULT_CHANNEL_PATH.to_string()
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

/// Diagnostics section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiagnosticsSection {
    /// HTTP port for the diagnostics server; disabled when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default = "default_event_log_capacity")]
    pub event_log_capacity: usize,
}

fn default_event_log_capacity() -> usize {
    EVENT_LOG_CAPACITY
}

impl Default for DiagnosticsSection {
    fn default() -> Self {
        Self {
            port: None,
            event_log_capacity: default_event_log_capacity(),
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid endpoint: {0}")]
    Endpoint(#[from] EndpointError),
    #[error("Invalid value for {name}: {value}")]
    InvalidEnvVar { name: String, value: String },
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ClientConfig {
    /// Load, apply environment overrides, and validate
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&content)?;
        config.apply_port_override(std::env::var(DIAGNOSTICS_PORT_ENV).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse without environment overrides or validation
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Replace the diagnostics port with an override value, if one is given
    pub fn apply_port_override(&mut self, value: Option<String>) -> Result<(), ConfigError> {
        if let Some(value) = value {
            let port = value
                .trim()
                .parse::<u16>()
                .map_err(|_| ConfigError::InvalidEnvVar {
                    name: DIAGNOSTICS_PORT_ENV.to_string(),
                    value: value.clone(),
                })?;
            self.diagnostics.port = Some(port);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint.page_url.is_none() && self.endpoint.url.is_none() {
            return Err(ConfigError::InvalidConfig(
                "[endpoint] needs either page_url or url".to_string(),
            ));
        }
        if self.endpoint.connect_timeout_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "connect_timeout_ms must be greater than 0".to_string(),
            ));
        }
        self.reconnect
            .validate()
            .map_err(ConfigError::InvalidConfig)?;
        if self.diagnostics.event_log_capacity == 0 {
            return Err(ConfigError::InvalidConfig(
                "event_log_capacity must be greater than 0".to_string(),
            ));
        }

        self.channel_url()?;
        Ok(())
    }

    /// The channel URL: the explicit `url` if set, otherwise derived from
    /// `page_url` and `channel_path`
    pub fn channel_url(&self) -> Result<Url, ConfigError> {
        if let Some(url) = &self.endpoint.url {
            return Ok(parse_channel_url(url)?);
        }
        match &self.endpoint.page_url {
            Some(page_url) => Ok(channel_url(page_url, &self.endpoint.channel_path)?),
            None => Err(ConfigError::InvalidConfig(
                "[endpoint] needs either page_url or url".to_string(),
            )),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.endpoint.connect_timeout_ms)
    }

    /// Create a test configuration for unit testing
    #[cfg(test)]
    pub fn test_config() -> Self {
        let toml_content = r#"
[endpoint]
page_url = "https://markets.example.com/board"
"#;
        toml::from_str(toml_content).expect("Test config should parse")
    }
}

//! Client configuration.
//!
//! Configuration can be loaded from:
//! - Environment variables (CONDUIT_*)
//! - TOML configuration file

use anyhow::{Context, Result};
use conduit_transport::{TransferFormat, TransportKind, TransportOptions};
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

/// Client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server URL to connect to.
    #[serde(default = "default_url")]
    pub url: String,

    /// Transports the client is willing to use.
    #[serde(default = "default_transports")]
    pub transports: TransportKind,

    /// Transports the server offers for this connection.
    #[serde(default = "default_transports")]
    pub available: TransportKind,

    /// Message format on the wire.
    #[serde(default)]
    pub transfer_format: TransferFormat,

    /// Options passed to the selected transport.
    #[serde(default)]
    pub options: TransportOptions,
}

// Default value functions
fn default_url() -> String {
    std::env::var("CONDUIT_URL").unwrap_or_else(|_| "http://127.0.0.1:8080/".to_string())
}

fn default_transports() -> TransportKind {
    TransportKind::ALL
}

impl Default for Config {
    fn default() -> Self {
        Self {
            url: default_url(),
            transports: default_transports(),
            available: default_transports(),
            transfer_format: TransferFormat::default(),
            options: TransportOptions::default(),
        }
    }
}

impl Config {
    /// Load configuration from `path`, the default paths, or defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load(path: Option<&str>) -> Result<Self> {
        if let Some(path) = path {
            return Self::from_file(shellexpand::tilde(path).as_ref());
        }

        // Try to load from default paths
        let config_paths = [
            "conduit.toml",
            "/etc/conduit/conduit.toml",
            "~/.config/conduit/conduit.toml",
        ];

        for path in &config_paths {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                return Self::from_file(expanded.as_ref());
            }
        }

        // Fall back to defaults with environment overrides
        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Parse the configured server URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is malformed.
    pub fn server_url(&self) -> Result<Url> {
        Url::parse(&self.url).with_context(|| format!("Invalid server URL: {}", self.url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.transports, TransportKind::ALL);
        assert_eq!(config.available, TransportKind::ALL);
        assert_eq!(config.transfer_format, TransferFormat::Text);
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            url = "https://example.com/hub"
            transports = ["ServerSentEvents", "LongPolling"]
            available = "LongPolling"
            transfer_format = "binary"

            [options]
            poll_timeout_ms = 20000

            [options.headers]
            Authorization = "Bearer token"
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server_url().unwrap().host_str(), Some("example.com"));
        assert_eq!(
            config.transports,
            TransportKind::SERVER_SENT_EVENTS | TransportKind::LONG_POLLING
        );
        assert_eq!(config.available, TransportKind::LONG_POLLING);
        assert_eq!(config.transfer_format, TransferFormat::Binary);
        assert_eq!(config.options.poll_timeout_ms, 20_000);
        assert_eq!(config.options.headers.len(), 1);
    }

    #[test]
    fn test_invalid_url_rejected() {
        let config = Config {
            url: "not a url".to_string(),
            ..Config::default()
        };
        assert!(config.server_url().is_err());
    }

    #[test]
    fn test_unknown_transport_rejected() {
        assert!(toml::from_str::<Config>(r#"transports = ["telegraph"]"#).is_err());
    }
}

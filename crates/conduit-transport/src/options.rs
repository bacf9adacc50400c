//! Per-transport options.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Options handed unchanged to whichever transport gets instantiated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportOptions {
    /// Extra headers sent with every HTTP request and WebSocket handshake.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Connect timeout in milliseconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// Long-polling request timeout in milliseconds.
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_ms: u64,

    /// Close handshake timeout in milliseconds.
    #[serde(default = "default_close_timeout")]
    pub close_timeout_ms: u64,

    /// Maximum inbound message size in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

fn default_connect_timeout() -> u64 {
    10_000 // 10 seconds
}

fn default_poll_timeout() -> u64 {
    100_000 // 100 seconds
}

fn default_close_timeout() -> u64 {
    5_000 // 5 seconds
}

fn default_max_message_size() -> usize {
    64 * 1024 // 64 KB
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            headers: BTreeMap::new(),
            connect_timeout_ms: default_connect_timeout(),
            poll_timeout_ms: default_poll_timeout(),
            close_timeout_ms: default_close_timeout(),
            max_message_size: default_max_message_size(),
        }
    }
}

impl TransportOptions {
    /// Add a header sent with every request.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    #[must_use]
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    #[must_use]
    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }

    /// Apply the configured headers to an HTTP request.
    pub(crate) fn apply_headers(&self, mut request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        request
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = TransportOptions::default();
        assert!(options.headers.is_empty());
        assert_eq!(options.connect_timeout(), Duration::from_secs(10));
        assert_eq!(options.poll_timeout(), Duration::from_secs(100));
        assert_eq!(options.max_message_size, 64 * 1024);
    }

    #[test]
    fn test_options_from_toml() {
        let toml_str = r#"
            poll_timeout_ms = 30000

            [headers]
            Authorization = "Bearer abc"
        "#;

        let options: TransportOptions = toml::from_str(toml_str).unwrap();
        assert_eq!(options.poll_timeout(), Duration::from_secs(30));
        assert_eq!(options.close_timeout(), Duration::from_secs(5));
        assert_eq!(
            options.headers.get("Authorization").map(String::as_str),
            Some("Bearer abc")
        );
    }
}

//! Transport abstraction for Conduit clients.
//!
//! Every concrete transport exposes the same capability set, so the caller
//! that receives a transport from the selector does not need to know which
//! mechanism was picked.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use url::Url;

use crate::kind::TransportKind;

/// Format of the messages carried by a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferFormat {
    /// UTF-8 text messages.
    #[default]
    Text,
    /// Arbitrary binary messages.
    Binary,
}

impl fmt::Display for TransferFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => f.write_str("text"),
            Self::Binary => f.write_str("binary"),
        }
    }
}

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The transport was used before `start`.
    #[error("Transport not started")]
    NotStarted,

    /// Connection was closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Connection timed out.
    #[error("Connection timed out")]
    Timeout,

    /// Failed to send data.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Failed to receive data.
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    /// The URL cannot be used by this transport.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// The transport cannot carry the requested transfer format.
    #[error("The '{transport}' transport does not support the '{format}' transfer format")]
    UnsupportedTransferFormat {
        /// Transport name.
        transport: &'static str,
        /// Requested format.
        format: TransferFormat,
    },

    /// HTTP error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// WebSocket error.
    #[cfg(feature = "websocket")]
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

/// A client-side connection to a server over one transport mechanism.
///
/// Instances are created by the selector in a not-started state; the caller
/// owns them and drives their lifecycle.
#[async_trait]
pub trait Transport: Send {
    /// The single transport flag this implementation corresponds to.
    fn kind(&self) -> TransportKind;

    /// Get the transport name (e.g., "WebSockets", "LongPolling").
    fn name(&self) -> &'static str;

    /// Open the connection to `url`.
    async fn start(&mut self, url: &Url, format: TransferFormat) -> Result<(), TransportError>;

    /// Send one message to the server.
    async fn send(&mut self, payload: Bytes) -> Result<(), TransportError>;

    /// Receive the next message from the server.
    ///
    /// Returns `None` once the server has ended the connection cleanly.
    async fn recv(&mut self) -> Result<Option<Bytes>, TransportError>;

    /// Close the connection. Closing twice is a no-op.
    async fn close(&mut self) -> Result<(), TransportError>;

    /// Check if the connection is still open.
    fn is_open(&self) -> bool;
}

impl fmt::Debug for dyn Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("kind", &self.kind())
            .field("open", &self.is_open())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_format_default_is_text() {
        assert_eq!(TransferFormat::default(), TransferFormat::Text);
    }

    #[test]
    fn test_unsupported_format_message() {
        let err = TransportError::UnsupportedTransferFormat {
            transport: "ServerSentEvents",
            format: TransferFormat::Binary,
        };
        assert_eq!(
            err.to_string(),
            "The 'ServerSentEvents' transport does not support the 'binary' transfer format"
        );
    }
}

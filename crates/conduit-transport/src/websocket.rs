//! WebSocket transport implementation.
//!
//! This module provides a WebSocket client transport using tokio-tungstenite.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        client::IntoClientRequest,
        http::{HeaderName, HeaderValue},
        Error as WsError, Message,
    },
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, error, warn, Span};
use url::Url;

use crate::kind::TransportKind;
use crate::options::TransportOptions;
use crate::selector::{BuildTransport, SelectorError, TransportContext};
use crate::traits::{TransferFormat, Transport, TransportError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket client transport.
pub struct WebSocketsTransport {
    options: Arc<TransportOptions>,
    span: Span,
    format: TransferFormat,
    stream: Option<WsStream>,
}

impl WebSocketsTransport {
    /// Create a new, not yet started WebSocket transport.
    #[must_use]
    pub fn new(options: Arc<TransportOptions>, span: Span) -> Self {
        Self {
            options,
            span,
            format: TransferFormat::Text,
            stream: None,
        }
    }
}

impl BuildTransport for WebSocketsTransport {
    const KIND: TransportKind = TransportKind::WEB_SOCKETS;

    fn build(context: &TransportContext) -> Result<Self, SelectorError> {
        Ok(Self::new(context.options(), context.span()))
    }
}

/// Map an HTTP(S) URL to its WebSocket counterpart.
fn websocket_url(url: &Url) -> Result<Url, TransportError> {
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(TransportError::InvalidUrl(format!(
                "unsupported scheme '{other}' in {url}"
            )))
        }
    };

    let mut ws_url = url.clone();
    ws_url
        .set_scheme(scheme)
        .map_err(|()| TransportError::InvalidUrl(url.to_string()))?;
    Ok(ws_url)
}

#[async_trait]
impl Transport for WebSocketsTransport {
    fn kind(&self) -> TransportKind {
        Self::KIND
    }

    fn name(&self) -> &'static str {
        "WebSockets"
    }

    async fn start(&mut self, url: &Url, format: TransferFormat) -> Result<(), TransportError> {
        let ws_url = websocket_url(url)?;

        if self.stream.is_some() {
            debug!(parent: &self.span, "Closing previous connection before restart");
            if let Err(e) = self.close().await {
                debug!(parent: &self.span, "Previous connection did not close cleanly: {}", e);
            }
        }

        let mut request = ws_url.as_str().into_client_request()?;
        for (name, value) in &self.options.headers {
            let name: HeaderName = name
                .parse()
                .map_err(|_| TransportError::Other(format!("Invalid header name: {name}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| TransportError::Other(format!("Invalid header value for {name}")))?;
            request.headers_mut().insert(name, value);
        }

        debug!(parent: &self.span, url = %ws_url, %format, "Connecting WebSocket");

        let connect = connect_async(request);
        let (stream, response) = tokio::time::timeout(self.options.connect_timeout(), connect)
            .await
            .map_err(|_| TransportError::Timeout)?
            .map_err(|e| {
                error!(parent: &self.span, "WebSocket handshake failed: {}", e);
                e
            })?;

        debug!(parent: &self.span, status = %response.status(), "WebSocket handshake completed");

        self.format = format;
        self.stream = Some(stream);
        Ok(())
    }

    async fn send(&mut self, payload: Bytes) -> Result<(), TransportError> {
        let stream = self.stream.as_mut().ok_or(TransportError::ConnectionClosed)?;

        let message = match self.format {
            TransferFormat::Text => {
                let text = String::from_utf8(payload.to_vec())
                    .map_err(|e| TransportError::SendFailed(e.to_string()))?;
                Message::Text(text)
            }
            TransferFormat::Binary => Message::Binary(payload.to_vec()),
        };

        stream
            .send(message)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn recv(&mut self) -> Result<Option<Bytes>, TransportError> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(None);
        };
        let max_message_size = self.options.max_message_size;
        let span = self.span.clone();

        loop {
            let data = match stream.next().await {
                Some(Ok(Message::Binary(data))) => Bytes::from(data),
                Some(Ok(Message::Text(text))) => Bytes::from(text),
                Some(Ok(Message::Ping(data))) => {
                    // Respond to ping with pong
                    if let Err(e) = stream.send(Message::Pong(data)).await {
                        warn!(parent: &span, "Failed to send pong: {}", e);
                    }
                    continue;
                }
                Some(Ok(Message::Pong(_) | Message::Frame(_))) => continue,
                Some(Ok(Message::Close(frame))) => {
                    debug!(parent: &span, ?frame, "Received close frame");
                    self.stream = None;
                    return Ok(None);
                }
                Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) | None => {
                    debug!(parent: &span, "WebSocket stream ended");
                    self.stream = None;
                    return Ok(None);
                }
                Some(Err(e)) => {
                    error!(parent: &span, "WebSocket error: {}", e);
                    self.stream = None;
                    return Err(TransportError::ReceiveFailed(e.to_string()));
                }
            };

            if data.len() > max_message_size {
                warn!(
                    parent: &span,
                    "Message too large: {} bytes (max: {})",
                    data.len(),
                    max_message_size
                );
                return Err(TransportError::ReceiveFailed(format!(
                    "message of {} bytes exceeds maximum {}",
                    data.len(),
                    max_message_size
                )));
            }
            return Ok(Some(data));
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        let Some(mut stream) = self.stream.take() else {
            return Ok(()); // Already closed
        };

        match tokio::time::timeout(self.options.close_timeout(), stream.close(None)).await {
            Ok(Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) => Ok(()),
            Ok(Err(e)) => Err(TransportError::Other(format!("Failed to close: {}", e))),
            Err(_) => {
                warn!(parent: &self.span, "WebSocket close handshake timed out");
                Err(TransportError::Timeout)
            }
        }
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_websocket_url_rewrites_scheme() {
        let url = Url::parse("http://localhost:5000/hub?id=abc").unwrap();
        assert_eq!(
            websocket_url(&url).unwrap().as_str(),
            "ws://localhost:5000/hub?id=abc"
        );

        let url = Url::parse("https://example.com/hub").unwrap();
        assert_eq!(websocket_url(&url).unwrap().as_str(), "wss://example.com/hub");

        let url = Url::parse("wss://example.com/hub").unwrap();
        assert_eq!(websocket_url(&url).unwrap().as_str(), "wss://example.com/hub");
    }

    #[test]
    fn test_websocket_url_rejects_other_schemes() {
        let url = Url::parse("ftp://example.com/hub").unwrap();
        assert!(matches!(websocket_url(&url), Err(TransportError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn test_send_before_start_fails() {
        let mut transport = WebSocketsTransport::new(Arc::default(), Span::none());
        assert!(!transport.is_open());
        assert!(matches!(
            transport.send(Bytes::from_static(b"hi")).await,
            Err(TransportError::ConnectionClosed)
        ));
        assert!(transport.recv().await.unwrap().is_none());
        transport.close().await.unwrap();
    }
}

//! Server-Sent Events transport implementation.
//!
//! Messages from the server arrive as `data:` fields of an event stream
//! opened with a long-lived `GET`; messages to the server are sent as
//! individual `POST` requests to the same URL.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use std::sync::Arc;
use tracing::{debug, trace, warn, Span};
use url::Url;

use crate::kind::TransportKind;
use crate::options::TransportOptions;
use crate::selector::{BuildTransport, SelectorError, TransportContext};
use crate::traits::{TransferFormat, Transport, TransportError};

/// Incremental parser for the `text/event-stream` format.
///
/// Only the `data` field is of interest; `event`, `id`, `retry` and comment
/// lines are skipped. Both the pending event and any undelimited line are
/// held to `max_size` bytes.
#[derive(Debug)]
pub(crate) struct EventParser {
    buffer: BytesMut,
    data: Vec<u8>,
    has_data: bool,
    max_size: usize,
}

/// Room left for the `data: ` prefix on a line still waiting for its terminator.
const DATA_PREFIX_LEN: usize = b"data: ".len();

fn too_large(len: usize, max: usize) -> TransportError {
    TransportError::ReceiveFailed(format!("message of {len} bytes exceeds maximum {max}"))
}

impl EventParser {
    pub(crate) fn new(max_size: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            data: Vec::new(),
            has_data: false,
            max_size,
        }
    }

    /// Append a chunk of the response body.
    pub(crate) fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Take the next complete event's data, if one has been dispatched.
    ///
    /// Fails once the event being assembled, or a line still waiting for its
    /// terminator, grows past the size limit.
    pub(crate) fn next_event(&mut self) -> Result<Option<Bytes>, TransportError> {
        while let Some(end) = self.buffer.iter().position(|&b| b == b'\n') {
            let mut line = self.buffer.split_to(end + 1);
            line.truncate(end);
            if line.last() == Some(&b'\r') {
                line.truncate(end - 1);
            }

            if line.is_empty() {
                if self.has_data {
                    self.has_data = false;
                    return Ok(Some(Bytes::from(std::mem::take(&mut self.data))));
                }
                continue;
            }

            if line[0] == b':' {
                continue;
            }

            let (field, value) = match line.iter().position(|&b| b == b':') {
                Some(colon) => {
                    let value = &line[colon + 1..];
                    (&line[..colon], value.strip_prefix(b" ").unwrap_or(value))
                }
                None => (&line[..], &[][..]),
            };

            if field == b"data" {
                if self.has_data {
                    self.data.push(b'\n');
                }
                self.data.extend_from_slice(value);
                self.has_data = true;

                if self.data.len() > self.max_size {
                    return Err(too_large(self.data.len(), self.max_size));
                }
            }
        }

        if self.buffer.len() > self.max_size + DATA_PREFIX_LEN {
            return Err(too_large(self.buffer.len(), self.max_size));
        }
        Ok(None)
    }
}

/// Server-Sent Events client transport.
pub struct ServerSentEventsTransport {
    client: reqwest::Client,
    options: Arc<TransportOptions>,
    span: Span,
    url: Option<Url>,
    events: Option<BoxStream<'static, reqwest::Result<Bytes>>>,
    parser: EventParser,
}

impl ServerSentEventsTransport {
    /// Create a new, not yet started Server-Sent Events transport.
    #[must_use]
    pub fn new(client: reqwest::Client, options: Arc<TransportOptions>, span: Span) -> Self {
        Self {
            client,
            span,
            url: None,
            events: None,
            parser: EventParser::new(options.max_message_size),
            options,
        }
    }
}

impl BuildTransport for ServerSentEventsTransport {
    const KIND: TransportKind = TransportKind::SERVER_SENT_EVENTS;

    fn build(context: &TransportContext) -> Result<Self, SelectorError> {
        let client = context.require_http_client(Self::KIND)?;
        Ok(Self::new(client, context.options(), context.span()))
    }
}

#[async_trait]
impl Transport for ServerSentEventsTransport {
    fn kind(&self) -> TransportKind {
        Self::KIND
    }

    fn name(&self) -> &'static str {
        "ServerSentEvents"
    }

    async fn start(&mut self, url: &Url, format: TransferFormat) -> Result<(), TransportError> {
        if format != TransferFormat::Text {
            return Err(TransportError::UnsupportedTransferFormat {
                transport: self.name(),
                format,
            });
        }

        if self.events.take().is_some() {
            debug!(parent: &self.span, "Dropping previous event stream before restart");
        }

        debug!(parent: &self.span, %url, "Opening event stream");

        let request = self
            .client
            .get(url.clone())
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache");
        let pending = self.options.apply_headers(request).send();

        let response = tokio::time::timeout(self.options.connect_timeout(), pending)
            .await
            .map_err(|_| TransportError::Timeout)??
            .error_for_status()?;

        trace!(parent: &self.span, status = %response.status(), "Event stream opened");

        self.url = Some(url.clone());
        self.events = Some(response.bytes_stream().boxed());
        self.parser = EventParser::new(self.options.max_message_size);
        Ok(())
    }

    async fn send(&mut self, payload: Bytes) -> Result<(), TransportError> {
        if self.events.is_none() {
            return Err(TransportError::ConnectionClosed);
        }
        let url = self.url.clone().ok_or(TransportError::NotStarted)?;

        let request = self.client.post(url).body(payload);
        let response = self.options.apply_headers(request).send().await?;
        if !response.status().is_success() {
            return Err(TransportError::SendFailed(format!(
                "server responded with {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<Bytes>, TransportError> {
        loop {
            match self.parser.next_event() {
                Ok(Some(data)) => return Ok(Some(data)),
                Ok(None) => {}
                Err(e) => {
                    warn!(parent: &self.span, "Dropping event stream: {}", e);
                    self.events = None;
                    return Err(e);
                }
            }

            let Some(events) = self.events.as_mut() else {
                return Ok(None);
            };

            match events.next().await {
                Some(Ok(chunk)) => self.parser.push(&chunk),
                Some(Err(e)) => {
                    warn!(parent: &self.span, "Event stream failed: {}", e);
                    self.events = None;
                    return Err(TransportError::ReceiveFailed(e.to_string()));
                }
                None => {
                    debug!(parent: &self.span, "Event stream ended");
                    self.events = None;
                    return Ok(None);
                }
            }
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if self.events.take().is_some() {
            debug!(parent: &self.span, "Event stream closed");
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.events.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn events(input: &[&[u8]]) -> Vec<String> {
        let mut parser = EventParser::new(1024);
        let mut out = Vec::new();
        for chunk in input {
            parser.push(chunk);
            while let Some(data) = parser.next_event().unwrap() {
                out.push(String::from_utf8(data.to_vec()).unwrap());
            }
        }
        out
    }

    #[test]
    fn test_single_event() {
        assert_eq!(events(&[b"data: hello\n\n"]), vec!["hello"]);
    }

    #[test]
    fn test_multiline_data_joined() {
        assert_eq!(events(&[b"data: a\ndata: b\n\n"]), vec!["a\nb"]);
    }

    #[test]
    fn test_event_split_across_chunks() {
        assert_eq!(
            events(&[b"da", b"ta: hel", b"lo\n", b"\ndata:world\n\n"]),
            vec!["hello", "world"]
        );
    }

    #[test]
    fn test_crlf_and_comments() {
        assert_eq!(
            events(&[b": keep-alive\r\n\r\nevent: message\r\ndata: x\r\n\r\n"]),
            vec!["x"]
        );
    }

    #[test]
    fn test_only_one_leading_space_stripped() {
        assert_eq!(events(&[b"data:  two\n\n"]), vec![" two"]);
    }

    #[test]
    fn test_incomplete_event_is_held() {
        let mut parser = EventParser::new(1024);
        parser.push(b"data: pending\n");
        assert!(parser.next_event().unwrap().is_none());
        parser.push(b"\n");
        assert_eq!(
            parser.next_event().unwrap(),
            Some(Bytes::from_static(b"pending"))
        );
    }

    #[test]
    fn test_unterminated_event_is_bounded() {
        let mut parser = EventParser::new(64);
        let mut result = Ok(None);
        for _ in 0..100 {
            parser.push(b"data: 0123456789abcdef\n");
            result = parser.next_event();
            if result.is_err() {
                break;
            }
        }
        assert!(matches!(result, Err(TransportError::ReceiveFailed(_))));
        assert!(parser.data.len() <= 64 + 17);
    }

    #[test]
    fn test_endless_line_is_bounded() {
        let mut parser = EventParser::new(64);
        parser.push(b"data: ");
        assert!(parser.next_event().unwrap().is_none());
        parser.push(&[b'x'; 64]);
        assert!(parser.next_event().unwrap().is_none());
        parser.push(b"x");
        assert!(matches!(
            parser.next_event(),
            Err(TransportError::ReceiveFailed(_))
        ));
    }

    #[test]
    fn test_event_at_limit_is_delivered() {
        let mut parser = EventParser::new(8);
        parser.push(b"data: 12345678\n\n");
        assert_eq!(
            parser.next_event().unwrap(),
            Some(Bytes::from_static(b"12345678"))
        );
    }

    #[tokio::test]
    async fn test_binary_format_rejected() {
        let mut transport =
            ServerSentEventsTransport::new(reqwest::Client::new(), Arc::default(), Span::none());
        let url = Url::parse("http://127.0.0.1:1/sse").unwrap();
        let err = transport
            .start(&url, TransferFormat::Binary)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TransportError::UnsupportedTransferFormat {
                format: TransferFormat::Binary,
                ..
            }
        ));
        assert!(!transport.is_open());
    }

    #[test]
    fn test_build_requires_http_client() {
        let err = ServerSentEventsTransport::build(&TransportContext::default())
            .err()
            .unwrap();
        assert_eq!(err.param_name(), Some("http_client"));
    }
}

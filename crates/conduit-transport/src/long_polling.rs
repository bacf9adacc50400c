//! Long-polling transport implementation.
//!
//! A background task repeatedly issues `GET` requests; each response body is
//! one message from the server. `204 No Content` ends the connection. Sends
//! are `POST` requests and closing sends a `DELETE`.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn, Instrument, Span};
use url::Url;

use crate::kind::TransportKind;
use crate::options::TransportOptions;
use crate::selector::{BuildTransport, SelectorError, TransportContext};
use crate::traits::{TransferFormat, Transport, TransportError};

/// Messages buffered between the poll loop and `recv`.
const INCOMING_CAPACITY: usize = 32;

type Incoming = Result<Bytes, TransportError>;

/// Long-polling client transport.
pub struct LongPollingTransport {
    client: reqwest::Client,
    options: Arc<TransportOptions>,
    span: Span,
    url: Option<Url>,
    incoming: Option<mpsc::Receiver<Incoming>>,
    poller: Option<JoinHandle<()>>,
}

impl LongPollingTransport {
    /// Create a new, not yet started long-polling transport.
    #[must_use]
    pub fn new(client: reqwest::Client, options: Arc<TransportOptions>, span: Span) -> Self {
        Self {
            client,
            options,
            span,
            url: None,
            incoming: None,
            poller: None,
        }
    }

    fn stop_polling(&mut self) {
        if let Some(poller) = self.poller.take() {
            poller.abort();
        }
        self.incoming = None;
    }
}

impl BuildTransport for LongPollingTransport {
    const KIND: TransportKind = TransportKind::LONG_POLLING;

    fn build(context: &TransportContext) -> Result<Self, SelectorError> {
        let client = context.require_http_client(Self::KIND)?;
        Ok(Self::new(client, context.options(), context.span()))
    }
}

impl Drop for LongPollingTransport {
    fn drop(&mut self) {
        self.stop_polling();
    }
}

/// Poll `url` until the server ends the connection or the receiver is gone.
async fn poll_loop(
    client: reqwest::Client,
    url: Url,
    options: Arc<TransportOptions>,
    tx: mpsc::Sender<Incoming>,
) {
    loop {
        let request = client.get(url.clone()).timeout(options.poll_timeout());
        let response = match options.apply_headers(request).send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                // Poll timeouts are expected when the server has nothing to say.
                trace!("Poll timed out, polling again");
                continue;
            }
            Err(e) => {
                warn!("Poll failed: {}", e);
                let _ = tx.send(Err(e.into())).await;
                return;
            }
        };

        let status = response.status();
        if status == StatusCode::NO_CONTENT {
            debug!("Server ended the long-polling connection");
            return;
        }
        if !status.is_success() {
            warn!("Poll returned {}", status);
            let _ = tx
                .send(Err(TransportError::ReceiveFailed(format!(
                    "poll returned {status}"
                ))))
                .await;
            return;
        }

        let message = match response.bytes().await {
            Ok(body) if body.is_empty() => continue,
            Ok(body) if body.len() > options.max_message_size => {
                Err(TransportError::ReceiveFailed(format!(
                    "message of {} bytes exceeds maximum {}",
                    body.len(),
                    options.max_message_size
                )))
            }
            Ok(body) => Ok(body),
            Err(e) => Err(e.into()),
        };

        let failed = message.is_err();
        if tx.send(message).await.is_err() || failed {
            return;
        }
    }
}

#[async_trait]
impl Transport for LongPollingTransport {
    fn kind(&self) -> TransportKind {
        Self::KIND
    }

    fn name(&self) -> &'static str {
        "LongPolling"
    }

    async fn start(&mut self, url: &Url, format: TransferFormat) -> Result<(), TransportError> {
        self.stop_polling();

        debug!(parent: &self.span, %url, %format, "Starting long polling");

        let (tx, rx) = mpsc::channel(INCOMING_CAPACITY);
        let task = poll_loop(self.client.clone(), url.clone(), self.options.clone(), tx)
            .instrument(self.span.clone());

        self.poller = Some(tokio::spawn(task));
        self.incoming = Some(rx);
        self.url = Some(url.clone());
        Ok(())
    }

    async fn send(&mut self, payload: Bytes) -> Result<(), TransportError> {
        if self.incoming.is_none() {
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
        let Some(incoming) = self.incoming.as_mut() else {
            return Ok(None);
        };

        let next = incoming.recv().await.transpose();
        if !matches!(next, Ok(Some(_))) {
            self.stop_polling();
        }
        next
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if self.incoming.is_none() && self.poller.is_none() {
            return Ok(()); // Already closed
        }
        self.stop_polling();

        if let Some(url) = self.url.clone() {
            let request = self
                .client
                .delete(url)
                .timeout(self.options.close_timeout());
            match self.options.apply_headers(request).send().await {
                Ok(response) => {
                    debug!(parent: &self.span, status = %response.status(), "Sent close request");
                }
                Err(e) => {
                    debug!(parent: &self.span, "Close request failed: {}", e);
                }
            }
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.incoming.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport() -> LongPollingTransport {
        LongPollingTransport::new(reqwest::Client::new(), Arc::default(), Span::none())
    }

    #[tokio::test]
    async fn test_not_open_before_start() {
        let mut transport = transport();
        assert!(!transport.is_open());
        assert!(transport.recv().await.unwrap().is_none());
        assert!(matches!(
            transport.send(Bytes::from_static(b"x")).await,
            Err(TransportError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_close_before_start_is_noop() {
        let mut transport = transport();
        transport.close().await.unwrap();
        transport.close().await.unwrap();
        assert!(!transport.is_open());
    }

    #[test]
    fn test_build_requires_http_client() {
        let err = LongPollingTransport::build(&TransportContext::default())
            .err()
            .unwrap();
        assert!(matches!(
            err,
            SelectorError::MissingHttpClient {
                requested: TransportKind::LONG_POLLING
            }
        ));
    }
}

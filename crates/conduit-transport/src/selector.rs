//! Transport selection and fallback.
//!
//! The selector is built once per client from the transports the client is
//! willing to use, then asked once per connection attempt to pick the best
//! transport the server also offers.

use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, Span};

use crate::kind::TransportKind;
use crate::long_polling::LongPollingTransport;
use crate::options::TransportOptions;
use crate::sse::ServerSentEventsTransport;
use crate::traits::Transport;

#[cfg(feature = "websocket")]
use crate::websocket::WebSocketsTransport;

/// Selection errors.
#[derive(Debug, Error)]
pub enum SelectorError {
    /// The requested set is empty or holds undefined flags.
    #[error("Requested transports out of range: {bits:#04x} (expected a nonzero subset of {all:#04x})", all = TransportKind::ALL.bits())]
    OutOfRange {
        /// Raw bits that were requested.
        bits: u8,
    },

    /// An HTTP client is needed by one of the requested transports.
    #[error("Missing `http_client`: required when requesting {requested}")]
    MissingHttpClient {
        /// The requested set.
        requested: TransportKind,
    },

    /// No requested transport is offered by the server.
    #[error("No requested transports available on the server.")]
    NoTransportAvailable,
}

impl SelectorError {
    /// Name of the constructor parameter at fault, if any.
    #[must_use]
    pub fn param_name(&self) -> Option<&'static str> {
        match self {
            Self::OutOfRange { .. } => Some("requested"),
            Self::MissingHttpClient { .. } => Some("http_client"),
            Self::NoTransportAvailable => None,
        }
    }
}

/// Dependencies handed to a transport constructor.
#[derive(Debug, Clone, Default)]
pub struct TransportContext {
    /// HTTP client, required by HTTP based transports.
    pub http_client: Option<reqwest::Client>,
    /// Options passed through to the transport.
    pub options: Option<Arc<TransportOptions>>,
    /// Span the transport logs under.
    pub logger: Option<Span>,
}

impl TransportContext {
    /// The HTTP client, or the error a transport reports without one.
    pub(crate) fn require_http_client(
        &self,
        kind: TransportKind,
    ) -> Result<reqwest::Client, SelectorError> {
        self.http_client
            .clone()
            .ok_or(SelectorError::MissingHttpClient { requested: kind })
    }

    pub(crate) fn options(&self) -> Arc<TransportOptions> {
        self.options.clone().unwrap_or_default()
    }

    pub(crate) fn span(&self) -> Span {
        self.logger.clone().unwrap_or_else(Span::current)
    }
}

/// Uniform constructor shared by every transport.
pub trait BuildTransport: Transport + Sized + 'static {
    /// The flag this transport answers to.
    const KIND: TransportKind;

    /// Build a not-yet-started transport.
    ///
    /// # Errors
    ///
    /// Returns an error if a required dependency is missing from `context`.
    fn build(context: &TransportContext) -> Result<Self, SelectorError>;
}

type Constructor = fn(&TransportContext) -> Result<Box<dyn Transport>, SelectorError>;

fn boxed<T: BuildTransport>(context: &TransportContext) -> Result<Box<dyn Transport>, SelectorError> {
    Ok(Box::new(T::build(context)?))
}

/// Candidates in fallback-priority order.
const CANDIDATES: &[(TransportKind, Constructor)] = &[
    #[cfg(feature = "websocket")]
    (WebSocketsTransport::KIND, boxed::<WebSocketsTransport>),
    (ServerSentEventsTransport::KIND, boxed::<ServerSentEventsTransport>),
    (LongPollingTransport::KIND, boxed::<LongPollingTransport>),
];

/// Something that can create a transport for a connection attempt.
pub trait TransportFactory: Send + Sync {
    /// Create a transport given the transports the server offers.
    ///
    /// # Errors
    ///
    /// Returns an error if no acceptable transport is offered.
    fn create_transport(&self, available: TransportKind)
        -> Result<Box<dyn Transport>, SelectorError>;
}

/// Picks one transport out of the requested set for each connection attempt.
#[derive(Debug, Clone)]
pub struct TransportSelector {
    requested: TransportKind,
    environment: TransportKind,
    context: TransportContext,
}

impl TransportSelector {
    /// Create a selector for the `requested` transports.
    ///
    /// # Errors
    ///
    /// Returns an error if `requested` is empty or holds undefined flags, or
    /// if it includes an HTTP based transport and `http_client` is `None`.
    pub fn new(
        requested: TransportKind,
        http_client: Option<reqwest::Client>,
        options: Option<TransportOptions>,
    ) -> Result<Self, SelectorError> {
        if !requested.is_valid() {
            return Err(SelectorError::OutOfRange {
                bits: requested.bits(),
            });
        }

        if requested != TransportKind::WEB_SOCKETS && http_client.is_none() {
            return Err(SelectorError::MissingHttpClient { requested });
        }

        Ok(Self {
            requested,
            environment: TransportKind::supported(),
            context: TransportContext {
                http_client,
                options: options.map(Arc::new),
                logger: None,
            },
        })
    }

    /// Set the span transports log under.
    #[must_use]
    pub fn with_logger(mut self, span: Span) -> Self {
        self.context.logger = Some(span);
        self
    }

    /// Restrict selection to the transports the runtime environment supports.
    #[must_use]
    pub fn with_environment(mut self, environment: TransportKind) -> Self {
        self.environment = environment;
        self
    }

    /// The transports requested at construction.
    #[must_use]
    pub fn requested(&self) -> TransportKind {
        self.requested
    }

    /// The transports the environment supports.
    #[must_use]
    pub fn environment(&self) -> TransportKind {
        self.environment
    }

    /// Select and instantiate the best transport offered by the server.
    ///
    /// # Errors
    ///
    /// Returns [`SelectorError::NoTransportAvailable`] when no requested
    /// transport is both supported and offered.
    pub fn select(&self, available: TransportKind) -> Result<Box<dyn Transport>, SelectorError> {
        let candidates = self.requested & available & self.environment;

        for (kind, construct) in CANDIDATES {
            if candidates.contains(*kind) {
                debug!(
                    requested = %self.requested,
                    available = %available,
                    selected = %kind,
                    "Selected transport"
                );
                return construct(&self.context);
            }
        }

        debug!(
            requested = %self.requested,
            available = %available,
            environment = %self.environment,
            "No requested transport available"
        );
        Err(SelectorError::NoTransportAvailable)
    }
}

impl TransportFactory for TransportSelector {
    fn create_transport(
        &self,
        available: TransportKind,
    ) -> Result<Box<dyn Transport>, SelectorError> {
        self.select(available)
    }
}

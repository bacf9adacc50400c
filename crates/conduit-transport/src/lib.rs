//! # conduit-transport
//!
//! Client transports and transport selection for Conduit.
//!
//! This crate provides a unified interface over three transport mechanisms:
//!
//! - **WebSockets** - Full duplex, preferred whenever possible
//! - **Server-Sent Events** - Server push over a long-lived HTTP response
//! - **Long polling** - Repeated HTTP requests, works through anything
//!
//! ## Transport Selection
//!
//! A [`TransportSelector`] is built once from the transports the client is
//! willing to use. For each connection attempt it is given the transports the
//! server offers and returns the best one both sides accept, falling back in
//! the order WebSockets, Server-Sent Events, long polling.
//!
//! ```rust,no_run
//! use conduit_transport::{TransferFormat, TransportKind, TransportSelector};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let selector = TransportSelector::new(
//!     TransportKind::ALL,
//!     Some(reqwest::Client::new()),
//!     None,
//! )?;
//!
//! // Usually taken from the server's negotiation response.
//! let available = TransportKind::SERVER_SENT_EVENTS | TransportKind::LONG_POLLING;
//!
//! let mut transport = selector.select(available)?;
//! let url = url::Url::parse("http://localhost:5000/hub")?;
//! transport.start(&url, TransferFormat::Text).await?;
//! while let Some(message) = transport.recv().await? {
//!     println!("{:?}", message);
//! }
//! # Ok(())
//! # }
//! ```

pub mod kind;
pub mod long_polling;
pub mod options;
pub mod selector;
pub mod sse;
pub mod traits;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use kind::{ParseTransportKindError, TransportKind};
pub use long_polling::LongPollingTransport;
pub use options::TransportOptions;
pub use selector::{
    BuildTransport, SelectorError, TransportContext, TransportFactory, TransportSelector,
};
pub use sse::ServerSentEventsTransport;
pub use traits::{TransferFormat, Transport, TransportError};

#[cfg(feature = "websocket")]
pub use websocket::WebSocketsTransport;

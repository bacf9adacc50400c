//! Relays stdin/stdout over the selected transport.

use crate::config::Config;
use anyhow::{Context, Result};
use bytes::Bytes;
use conduit_transport::{TransportFactory, TransportKind, TransportSelector};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info, info_span};

enum Step {
    Outgoing(Option<String>),
    Incoming(Option<Bytes>),
}

/// Build the selector described by `config`.
///
/// # Errors
///
/// Returns an error if the HTTP client cannot be built or the requested
/// transports are invalid.
pub fn build_selector(config: &Config) -> Result<TransportSelector> {
    let http_client = if config.transports == TransportKind::WEB_SOCKETS {
        None
    } else {
        let client = reqwest::Client::builder()
            .connect_timeout(config.options.connect_timeout())
            .build()
            .context("Failed to build HTTP client")?;
        Some(client)
    };

    let selector =
        TransportSelector::new(config.transports, http_client, Some(config.options.clone()))?
            .with_logger(info_span!("transport", url = %config.url));
    Ok(selector)
}

/// Connect and pump lines from stdin to the server and messages back to stdout.
///
/// # Errors
///
/// Returns an error if no transport can be selected or the connection fails.
pub async fn run(config: Config, factory: &dyn TransportFactory) -> Result<()> {
    let url = config.server_url()?;

    let mut transport = factory.create_transport(config.available)?;
    info!("Using {} transport for {}", transport.name(), url);

    transport
        .start(&url, config.transfer_format)
        .await
        .with_context(|| format!("Failed to start {} transport", transport.name()))?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        let step = tokio::select! {
            line = lines.next_line() => Step::Outgoing(line?),
            message = transport.recv() => Step::Incoming(message?),
        };

        match step {
            Step::Outgoing(Some(line)) => transport.send(Bytes::from(line)).await?,
            Step::Outgoing(None) => {
                debug!("stdin closed");
                break;
            }
            Step::Incoming(Some(message)) => {
                stdout.write_all(&message).await?;
                stdout.write_all(b"\n").await?;
                stdout.flush().await?;
            }
            Step::Incoming(None) => {
                info!("Server closed the connection");
                break;
            }
        }
    }

    transport.close().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_selector_from_config() {
        let config = Config {
            transports: TransportKind::LONG_POLLING | TransportKind::SERVER_SENT_EVENTS,
            ..Config::default()
        };
        let selector = build_selector(&config).unwrap();
        assert_eq!(selector.requested(), config.transports);

        let transport = selector.select(TransportKind::ALL).unwrap();
        assert_eq!(transport.kind(), TransportKind::SERVER_SENT_EVENTS);
    }

    #[test]
    fn test_build_selector_web_sockets_only() {
        let config = Config {
            transports: TransportKind::WEB_SOCKETS,
            ..Config::default()
        };
        assert!(build_selector(&config).is_ok());
    }

    #[tokio::test]
    async fn test_run_fails_without_common_transport() {
        let config = Config {
            transports: TransportKind::LONG_POLLING,
            available: TransportKind::WEB_SOCKETS,
            ..Config::default()
        };
        let selector = build_selector(&config).unwrap();

        let err = run(config, &selector).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "No requested transports available on the server."
        );
    }
}

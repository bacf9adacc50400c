//! # Conduit
//!
//! Command-line client that picks the best transport the server offers and
//! relays stdin/stdout over it.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! conduit
//!
//! # Run with custom config
//! conduit /path/to/conduit.toml
//!
//! # Run with environment variables
//! CONDUIT_URL=http://localhost:5000/hub conduit
//! ```

mod config;
mod relay;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr, stdout carries messages
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "conduit=info,conduit_transport=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Load configuration
    let path = std::env::args().nth(1);
    let config = config::Config::load(path.as_deref())?;

    tracing::info!(
        "Connecting to {} (transports: {}, server offers: {})",
        config.url,
        config.transports,
        config.available
    );

    let selector = relay::build_selector(&config)?;
    relay::run(config, &selector).await?;

    Ok(())
}

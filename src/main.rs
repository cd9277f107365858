//! S3Gateway - hypermedia HTTP gateway for S3-compatible object storage
//!
//! Exposes buckets and objects as JSON resources annotated with `self` and
//! `next` links, so clients can walk a store by following hrefs. Object
//! bodies stream straight through between client and provider.

mod config;
mod errors;
mod hypermedia;
mod metrics;
mod model;
mod routes;
mod server;
mod storage;

use anyhow::Context;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::server::Server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration from environment and optional config file
    let config = Config::from_env()?;

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .context("invalid log level")?;
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    crate::metrics::init_metrics().context("failed to register metrics")?;

    info!("Starting S3Gateway");
    info!(?config, "Configuration loaded");

    let storage = storage::create_backend(&config).await?;
    info!(backend = ?config.backend.backend_type, "Storage backend initialized");

    let server = Server::new(config, storage);

    let shutdown_signal = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received shutdown signal"),
            Err(err) => {
                error!(error = %err, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await
            }
        }
    };

    if let Err(e) = server.start(shutdown_signal).await {
        error!(error = %e, "Server error");
        return Err(e);
    }

    info!("Server shutdown complete");
    Ok(())
}

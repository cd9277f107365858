//! HTTP server implementation
//!
//! Sets up the Axum HTTP server with:
//! - Gateway routes
//! - Middleware (logging, metrics, request ID, timeout, body limit)
//! - Graceful shutdown

use axum::{
    http::{HeaderName, Request},
    middleware, Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;

use crate::config::Config;
use crate::metrics;
use crate::routes::{self, AppState, GatewaySettings};
use crate::storage::StorageBackend;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Random v4 UUID for requests that arrive without an id
#[derive(Debug, Clone, Copy, Default)]
struct UuidRequestId;

impl MakeRequestId for UuidRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        uuid::Uuid::new_v4()
            .to_string()
            .parse()
            .ok()
            .map(RequestId::new)
    }
}

/// HTTP server for S3Gateway
pub struct Server {
    config: Config,
    storage: Arc<dyn StorageBackend>,
}

impl Server {
    /// Create a new server instance
    pub fn new(config: Config, storage: Arc<dyn StorageBackend>) -> Self {
        Self { config, storage }
    }

    /// Build the Axum router with all middleware
    fn build_router(&self) -> Router {
        let state = AppState {
            storage: self.storage.clone(),
            settings: GatewaySettings {
                trust_proxy: self.config.server.trust_proxy,
                default_max_keys: self.config.server.default_max_keys,
            },
        };
        let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

        routes::create_router(state)
            .layer(middleware::from_fn(metrics::track_http))
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::new(request_id.clone(), UuidRequestId))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::new(request_id))
                    .layer(RequestBodyLimitLayer::new(self.config.server.max_body_size))
                    .layer(TimeoutLayer::new(Duration::from_secs(
                        self.config.server.timeout_secs,
                    )))
                    .layer(CompressionLayer::new())
                    .into_inner(),
            )
    }

    /// Start the server and run until shutdown signal
    pub async fn start<F>(&self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let app = self.build_router();

        let listener = tokio::net::TcpListener::bind(self.config.server.bind_address).await?;
        info!(address = %self.config.server.bind_address, "Server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        Ok(())
    }
}

//! Prometheus metrics for S3Gateway
//!
//! Defines metrics for:
//! - Request counts by method and status
//! - Request latency
//! - Storage operation counts by operation and outcome
//! - Storage operation duration

use axum::{extract::Request, middleware::Next, response::Response};
use lazy_static::lazy_static;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounterVec, Opts, Registry, TextEncoder};
use std::future::Future;

const LATENCY_BUCKETS: [f64; 12] = [
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

lazy_static! {
    /// Registry for all metrics
    pub static ref REGISTRY: Registry = Registry::new();

    /// HTTP request counter by method and status
    pub static ref HTTP_REQUESTS: IntCounterVec = IntCounterVec::new(
        Opts::new("s3gateway_http_requests_total", "Total HTTP requests"),
        &["method", "status"]
    )
    .expect("metric definition is valid");

    /// HTTP request latency histogram
    pub static ref HTTP_REQUEST_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "s3gateway_http_request_duration_seconds",
            "HTTP request duration in seconds"
        )
        .buckets(LATENCY_BUCKETS.to_vec())
    )
    .expect("metric definition is valid");

    /// Storage operation counter by operation and status
    pub static ref STORAGE_OPERATIONS: IntCounterVec = IntCounterVec::new(
        Opts::new("s3gateway_storage_operations_total", "Total storage operations"),
        &["operation", "status"]
    )
    .expect("metric definition is valid");

    /// Storage operation duration histogram
    pub static ref STORAGE_OPERATION_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "s3gateway_storage_operation_duration_seconds",
            "Storage operation duration in seconds"
        )
        .buckets(LATENCY_BUCKETS.to_vec())
    )
    .expect("metric definition is valid");
}

/// Register all metrics with the gateway registry
pub fn init_metrics() -> Result<(), prometheus::Error> {
    REGISTRY.register(Box::new(HTTP_REQUESTS.clone()))?;
    REGISTRY.register(Box::new(HTTP_REQUEST_DURATION.clone()))?;
    REGISTRY.register(Box::new(STORAGE_OPERATIONS.clone()))?;
    REGISTRY.register(Box::new(STORAGE_OPERATION_DURATION.clone()))?;
    Ok(())
}

/// Render the registry in the Prometheus text format
pub fn render() -> Result<String, prometheus::Error> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|err| prometheus::Error::Msg(err.to_string()))
}

/// Time a storage call and count its outcome
pub async fn observe_storage<T, E, F>(operation: &'static str, call: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
{
    let timer = STORAGE_OPERATION_DURATION.start_timer();
    let result = call.await;
    timer.observe_duration();

    let status = if result.is_ok() { "success" } else { "error" };
    STORAGE_OPERATIONS
        .with_label_values(&[operation, status])
        .inc();
    result
}

/// Middleware counting every request by method and response status
pub async fn track_http(request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let timer = HTTP_REQUEST_DURATION.start_timer();

    let response = next.run(request).await;

    timer.observe_duration();
    HTTP_REQUESTS
        .with_label_values(&[method.as_str(), response.status().as_str()])
        .inc();
    response
}

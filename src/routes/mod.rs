//! HTTP routes of the gateway
//!
//! - GET / - ListBuckets
//! - GET /{name}?prefix=&delimiter=&marker=&maxKeys= - ListObjects
//! - PUT /{name} - CreateBucket
//! - DELETE /{name} - DeleteBucket
//! - GET /{name}/{key} - GetObject
//! - PUT /{name}/{key} - PutObject
//! - DELETE /{name}/{key} - DeleteObject
//!
//! Keys may span several path segments. Operational endpoints live under
//! `/_gateway/`, which can never collide with a valid bucket name.

mod handlers;
mod keypath;

use axum::{
    extract::FromRef,
    routing::{get, MethodRouter},
    Router,
};
use std::sync::Arc;

use crate::hypermedia::TrustProxy;
use crate::storage::StorageBackend;

/// Request-independent settings the handlers need
#[derive(Debug, Clone, Copy)]
pub struct GatewaySettings {
    pub trust_proxy: bool,
    pub default_max_keys: i32,
}

/// Shared state of every handler
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn StorageBackend>,
    pub settings: GatewaySettings,
}

impl FromRef<AppState> for TrustProxy {
    fn from_ref(state: &AppState) -> Self {
        TrustProxy(state.settings.trust_proxy)
    }
}

/// Query parameters for ListObjects operation
///
/// `maxKeys` stays raw so an unparseable value is reported as a gateway
/// error instead of a rejected request. A repeated key keeps its last value,
/// the same rule the links built for the request follow.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ListObjectsQuery {
    pub delimiter: Option<String>,
    pub marker: Option<String>,
    pub max_keys: Option<String>,
    pub prefix: Option<String>,
}

impl ListObjectsQuery {
    /// Decode a raw query string (without the leading `?`)
    pub fn parse(raw: &str) -> Self {
        let mut query = Self::default();
        for (key, value) in url::form_urlencoded::parse(raw.as_bytes()) {
            let slot = match key.as_ref() {
                "delimiter" => &mut query.delimiter,
                "marker" => &mut query.marker,
                "maxKeys" => &mut query.max_keys,
                "prefix" => &mut query.prefix,
                _ => continue,
            };
            *slot = Some(value.into_owned());
        }
        query
    }
}

fn bucket_routes() -> MethodRouter<AppState> {
    get(handlers::get_bucket)
        .put(handlers::create_bucket)
        .delete(handlers::delete_bucket)
}

fn object_routes() -> MethodRouter<AppState> {
    get(handlers::get_object)
        .put(handlers::put_object)
        .delete(handlers::delete_object)
}

/// Create the gateway router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/_gateway/healthz", get(handlers::health))
        .route("/_gateway/readyz", get(handlers::ready))
        .route("/_gateway/metrics", get(handlers::metrics))
        .route("/", get(handlers::list_buckets))
        .route("/:name", bucket_routes())
        .route("/:name/", bucket_routes())
        .route("/:name/:key", object_routes())
        .route("/:name/:key/", object_routes())
        .route("/:name/:key/*rest", object_routes())
        .with_state(state)
}

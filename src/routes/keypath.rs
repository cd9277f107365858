//! Recovers full object keys from object routes
//!
//! Keys may contain slashes, so a key arrives split across the `:key`
//! segment and the `*rest` wildcard. Routing is strict about trailing
//! slashes: `/:name/:key/` is its own route and always addresses a key that
//! ends in `/` (a folder marker).

use axum::{
    async_trait,
    extract::{rejection::PathRejection, FromRequestParts, MatchedPath, Path},
};
use http::request::Parts;
use serde::Deserialize;

/// Join the bound key segment with the wildcard remainder. A route pattern
/// ending in `/` forces the key to end in `/` as well.
pub fn reconstruct_key(bound: &str, remainder: Option<&str>, route_pattern: &str) -> String {
    let mut key = format!("{bound}{}", remainder.unwrap_or(""));
    if route_pattern.ends_with('/') && !key.ends_with('/') {
        key.push('/');
    }
    key
}

#[derive(Debug, Deserialize)]
struct ObjectParams {
    name: String,
    key: String,
    rest: Option<String>,
}

/// Bucket and full key of an object route
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectPath {
    pub bucket: String,
    pub key: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for ObjectPath
where
    S: Send + Sync,
{
    type Rejection = PathRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(params) = Path::<ObjectParams>::from_request_parts(parts, state).await?;
        let pattern = parts
            .extensions
            .get::<MatchedPath>()
            .map(MatchedPath::as_str)
            .unwrap_or_default();

        // The wildcard capture excludes the slash that separates it from `:key`.
        let remainder = params.rest.map(|rest| format!("/{rest}"));

        Ok(Self {
            key: reconstruct_key(&params.key, remainder.as_deref(), pattern),
            bucket: params.name,
        })
    }
}

//! Resolves the absolute URL a request was addressed to

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts, OriginalUri},
};
use http::{header, request::Parts, HeaderMap};
use std::convert::Infallible;

use super::QueryParams;

const FORWARDED_PROTO: &str = "x-forwarded-proto";
const FORWARDED_HOST: &str = "x-forwarded-host";

/// Whether `X-Forwarded-*` headers may be believed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrustProxy(pub bool);

/// Per-request view of where the client thinks it is talking to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub is_secure: bool,
    pub host: String,
    /// Path as received, still percent-encoded
    pub original_path: String,
    /// Query string as received, without `?`
    pub raw_query: String,
    pub query: QueryParams,
}

/// Absolute URL of a request, split the way browsers split `location`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    /// Scheme, host and path; never carries a query
    pub origin: String,
    /// `?` followed by the raw query, or empty
    pub search: String,
    pub protocol: &'static str,
    pub hostname: String,
    pub href: String,
}

impl RequestContext {
    pub fn new(
        is_secure: bool,
        host: impl Into<String>,
        original_path: impl Into<String>,
        raw_query: impl Into<String>,
    ) -> Self {
        let raw_query = raw_query.into();
        Self {
            is_secure,
            host: host.into(),
            original_path: original_path.into(),
            query: QueryParams::parse(&raw_query),
            raw_query,
        }
    }

    /// Build the context from request parts. Forwarding headers are only
    /// consulted when `trust_proxy` is set.
    pub fn from_parts(parts: &Parts, trust_proxy: TrustProxy) -> Self {
        let uri = parts
            .extensions
            .get::<OriginalUri>()
            .map(|original| &original.0)
            .unwrap_or(&parts.uri);

        let forwarded = |name: &str| {
            trust_proxy
                .0
                .then(|| first_header_value(&parts.headers, name))
                .flatten()
        };

        let is_secure = match forwarded(FORWARDED_PROTO) {
            Some(proto) => proto.eq_ignore_ascii_case("https"),
            None => uri.scheme_str() == Some("https"),
        };

        let host = forwarded(FORWARDED_HOST)
            .or_else(|| first_header_value(&parts.headers, header::HOST.as_str()))
            .or_else(|| uri.authority().map(|authority| authority.to_string()))
            .unwrap_or_default();

        Self::new(is_secure, host, uri.path(), uri.query().unwrap_or(""))
    }

    /// Resolve the request's location
    pub fn location(&self) -> Location {
        let protocol = if self.is_secure { "https://" } else { "http://" };
        let path = if self.original_path == "/" {
            ""
        } else {
            self.original_path.as_str()
        };
        let origin = format!("{protocol}{}{path}", self.host);
        let search = if self.query.is_empty() {
            String::new()
        } else {
            format!("?{}", self.raw_query)
        };
        let href = format!("{origin}{search}");

        Location {
            origin,
            search,
            protocol,
            hostname: self.host.clone(),
            href,
        }
    }
}

fn first_header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
    TrustProxy: FromRef<S>,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_parts(parts, TrustProxy::from_ref(state)))
    }
}

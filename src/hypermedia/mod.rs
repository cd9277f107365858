//! Hypermedia decoration
//!
//! Every JSON representation the gateway returns carries `links` that point
//! back into the gateway:
//! - `self` for buckets, objects, listing pages and write results
//! - `next` for truncated listing pages, carrying the continuation marker
//!
//! Links are derived from the request's own URL so they stay valid behind
//! proxies and on any host name the gateway is reached by.

mod links;
mod location;
mod query;

pub use links::LinkBuilder;
pub use location::{Location, RequestContext, TrustProxy};
pub use query::{merged_search, QueryParams};

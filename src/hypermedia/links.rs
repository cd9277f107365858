//! Link construction for buckets, objects and listing pages

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use tracing::{debug, warn};

use super::{merged_search, Location, QueryParams, RequestContext};
use crate::model::{Link, ObjectListing, ObjectSummary};

/// Characters escaped when a key becomes part of a URL path. Slashes stay so
/// nested keys read like nested paths.
const PATH: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// Characters escaped when a key becomes a query value
const QUERY_VALUE: &AsciiSet = &PATH.add(b'&').add(b'=').add(b'+');

pub fn encode_path(key: &str) -> String {
    utf8_percent_encode(key, PATH).to_string()
}

pub fn encode_query_value(value: &str) -> String {
    utf8_percent_encode(value, QUERY_VALUE).to_string()
}

/// Whether two hrefs name the same resource once percent-decoded
pub fn same_resource(a: &str, b: &str) -> bool {
    a == b || percent_decode_str(a).decode_utf8_lossy() == percent_decode_str(b).decode_utf8_lossy()
}

/// Builds links relative to the location of one request
#[derive(Debug, Clone)]
pub struct LinkBuilder {
    location: Location,
    query: QueryParams,
}

impl LinkBuilder {
    pub fn new(ctx: &RequestContext) -> Self {
        Self {
            location: ctx.location(),
            query: ctx.query.clone(),
        }
    }

    /// Origin with a trailing slash, ready to have a child appended
    fn child_base(&self) -> String {
        let mut base = self.location.origin.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        base
    }

    /// Link to the request itself, used verbatim
    pub fn current(&self) -> Link {
        Link::current(self.location.href.clone())
    }

    pub fn bucket(&self, name: &str) -> Link {
        Link::current(format!(
            "{}{}{}",
            self.child_base(),
            encode_path(name),
            self.location.search
        ))
    }

    /// Folder markers link back to the listing filtered by their prefix,
    /// everything else links to the object itself.
    pub fn object(&self, entry: &ObjectSummary) -> Link {
        if entry.is_folder_marker() {
            let search = merged_search(&self.query, [("prefix", encode_query_value(&entry.key))]);
            Link::current(format!("{}{}", self.location.origin, search))
        } else {
            Link::current(format!("{}{}", self.child_base(), encode_path(&entry.key)))
        }
    }

    pub fn next_page(&self, marker: &str) -> Link {
        let search = merged_search(&self.query, [("marker", encode_query_value(marker))]);
        Link::next(format!("{}{}", self.location.origin, search))
    }

    /// Attach links to a listing page and its entries.
    ///
    /// Entries that resolve to the listing itself are removed; providers
    /// report the queried prefix as a zero-byte entry.
    pub fn decorate_listing(&self, listing: &mut ObjectListing) {
        let current = self.current();

        let contents = std::mem::take(&mut listing.contents);
        listing.contents = contents
            .into_iter()
            .filter_map(|mut entry| {
                let link = self.object(&entry);
                if same_resource(&link.href, &current.href) {
                    debug!(key = %entry.key, "Dropping self-referencing listing entry");
                    return None;
                }
                entry.links = vec![link];
                Some(entry)
            })
            .collect();

        listing.links = vec![current];

        if listing.is_truncated {
            let marker = listing
                .next_marker
                .clone()
                .or_else(|| listing.contents.last().map(|entry| entry.key.clone()));
            match marker {
                Some(marker) => listing.links.push(self.next_page(&marker)),
                None => warn!(
                    bucket = %listing.name,
                    "Truncated listing without a marker to continue from"
                ),
            }
        }
    }
}

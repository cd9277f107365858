//! Resource representations returned to clients
//!
//! These mirror what the storage provider reports (S3 field names, PascalCase)
//! and carry one extra `links` array that the gateway fills in before the
//! response is serialized. Backends always leave `links` empty.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Hypermedia link
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Link {
    pub rel: String,
    pub href: String,
}

impl Link {
    pub fn new(rel: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            rel: rel.into(),
            href: href.into(),
        }
    }

    /// `self` link
    pub fn current(href: impl Into<String>) -> Self {
        Self::new("self", href)
    }

    /// `next` link
    pub fn next(href: impl Into<String>) -> Self {
        Self::new("next", href)
    }
}

/// Bucket entry of ListBuckets
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Bucket {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creation_date: Option<DateTime<Utc>>,
    #[serde(rename = "links")]
    pub links: Vec<Link>,
}

/// One page of ListObjects
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ObjectListing {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub marker: Option<String>,
    /// Only reported by providers when a delimiter was requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_marker: Option<String>,
    pub max_keys: i32,
    pub is_truncated: bool,
    pub contents: Vec<ObjectSummary>,
    pub common_prefixes: Vec<CommonPrefix>,
    #[serde(rename = "links")]
    pub links: Vec<Link>,
}

/// Object entry in a listing
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ObjectSummary {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
    #[serde(rename = "ETag", skip_serializing_if = "Option::is_none")]
    pub e_tag: Option<String>,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,
    #[serde(rename = "links")]
    pub links: Vec<Link>,
}

impl ObjectSummary {
    /// A zero-byte key ending in `/` stands for an empty folder
    pub fn is_folder_marker(&self) -> bool {
        self.size == 0 && self.key.ends_with('/')
    }
}

/// Common prefix entry in a delimited listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CommonPrefix {
    pub prefix: String,
}

/// CreateBucket result
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreatedBucket {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(rename = "links")]
    pub links: Vec<Link>,
}

/// DeleteBucket result; providers return no fields
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeletedBucket {}

/// Upload result
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct UploadedObject {
    pub bucket: String,
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(rename = "ETag", skip_serializing_if = "Option::is_none")]
    pub e_tag: Option<String>,
    #[serde(rename = "links")]
    pub links: Vec<Link>,
}

/// DeleteObjects result
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeletedObjects {
    pub deleted: Vec<DeletedObject>,
    pub errors: Vec<DeleteFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeletedObject {
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeleteFailure {
    pub key: String,
    pub code: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_folder_marker_detection() {
        let mut entry = ObjectSummary {
            key: "docs/".to_string(),
            last_modified: None,
            e_tag: None,
            size: 0,
            storage_class: None,
            links: vec![],
        };
        assert!(entry.is_folder_marker());

        entry.size = 12;
        assert!(!entry.is_folder_marker());

        entry.size = 0;
        entry.key = "docs".to_string();
        assert!(!entry.is_folder_marker());
    }

    #[test]
    fn test_listing_field_names() {
        let listing = ObjectListing {
            name: "mybucket".to_string(),
            prefix: Some("docs/".to_string()),
            delimiter: None,
            marker: None,
            next_marker: None,
            max_keys: 2,
            is_truncated: true,
            contents: vec![ObjectSummary {
                key: "docs/a.txt".to_string(),
                last_modified: None,
                e_tag: Some("\"abc\"".to_string()),
                size: 3,
                storage_class: Some("STANDARD".to_string()),
                links: vec![Link::current("http://h/mybucket/docs/a.txt")],
            }],
            common_prefixes: vec![],
            links: vec![Link::current("http://h/mybucket?prefix=docs/")],
        };

        let value = serde_json::to_value(&listing).unwrap();
        assert_eq!(value["Name"], "mybucket");
        assert_eq!(value["IsTruncated"], true);
        assert_eq!(value["MaxKeys"], 2);
        assert!(value.get("NextMarker").is_none());
        assert_eq!(value["Contents"][0]["ETag"], "\"abc\"");
        assert_eq!(
            value["links"],
            json!([{ "rel": "self", "href": "http://h/mybucket?prefix=docs/" }])
        );
    }

    #[test]
    fn test_deleted_bucket_is_empty_object() {
        assert_eq!(serde_json::to_value(DeletedBucket {}).unwrap(), json!({}));
    }
}

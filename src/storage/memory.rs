//! In-process storage backend
//!
//! Each bucket is an `object_store` [`InMemory`] store. Object keys are kept
//! as a single encoded path segment so that keys with trailing or repeated
//! slashes (folder markers) survive unchanged; `object_store` paths would
//! otherwise normalize them away.
//!
//! Listing follows S3 ListObjects (v1) semantics: keys in lexicographic
//! order, `marker` is exclusive, `delimiter` rolls keys up into common
//! prefixes and `NextMarker` is only reported for delimited listings.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{StreamExt, TryStreamExt};
use object_store::memory::InMemory;
use object_store::path::{Path, PathPart};
use object_store::{ObjectMeta, ObjectStore, WriteMultipart};
use percent_encoding::percent_decode_str;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::model::{
    Bucket, CommonPrefix, CreatedBucket, DeleteFailure, DeletedBucket, DeletedObject,
    DeletedObjects, ObjectListing, ObjectSummary, UploadedObject,
};
use crate::storage::{
    ListObjectsRequest, ObjectContent, StorageBackend, StorageError, UploadRequest, UploadStream,
};

/// Parts a single upload may have in flight at once
const MAX_INFLIGHT_PARTS: usize = 4;

struct MemoryBucket {
    store: InMemory,
    created: DateTime<Utc>,
    content_types: Mutex<HashMap<String, String>>,
}

impl MemoryBucket {
    fn new() -> Self {
        Self {
            store: InMemory::new(),
            created: Utc::now(),
            content_types: Mutex::new(HashMap::new()),
        }
    }

    fn content_types(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.content_types
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Buckets and objects held in process memory
#[derive(Default)]
pub struct MemoryBackend {
    buckets: RwLock<BTreeMap<String, Arc<MemoryBucket>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    async fn bucket(&self, name: &str) -> Result<Arc<MemoryBucket>, StorageError> {
        self.buckets
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| StorageError::no_such_bucket(name))
    }
}

fn object_path(key: &str) -> Result<Path, StorageError> {
    if key.is_empty() {
        return Err(StorageError::invalid_argument("Object key must not be empty"));
    }
    Ok(Path::from_iter([PathPart::from(key)]))
}

fn object_key(meta: &ObjectMeta) -> String {
    percent_decode_str(meta.location.as_ref())
        .decode_utf8_lossy()
        .into_owned()
}

fn store_error(err: object_store::Error) -> StorageError {
    match err {
        object_store::Error::NotFound { path, .. } => StorageError::no_such_key(
            &percent_decode_str(&path).decode_utf8_lossy(),
        ),
        other => StorageError::new("InternalError", other.to_string()).with_status(500),
    }
}

/// S3 naming rules: 3-63 characters of lowercase letters, digits, `.` and
/// `-`, starting and ending with a letter or digit.
fn valid_bucket_name(name: &str) -> bool {
    let edge_ok = |c: Option<char>| c.is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
    (3..=63).contains(&name.len())
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '-')
        && edge_ok(name.chars().next())
        && edge_ok(name.chars().last())
}

fn summary(meta: ObjectMeta) -> ObjectSummary {
    ObjectSummary {
        key: object_key(&meta),
        last_modified: Some(meta.last_modified),
        e_tag: meta.e_tag.map(|tag| format!("\"{tag}\"")),
        size: meta.size as u64,
        storage_class: Some("STANDARD".to_string()),
        links: vec![],
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn list_buckets(&self) -> Result<Vec<Bucket>, StorageError> {
        Ok(self
            .buckets
            .read()
            .await
            .iter()
            .map(|(name, bucket)| Bucket {
                name: name.clone(),
                creation_date: Some(bucket.created),
                links: vec![],
            })
            .collect())
    }

    async fn list_objects(&self, request: ListObjectsRequest) -> Result<ObjectListing, StorageError> {
        let max_keys = usize::try_from(request.max_keys)
            .map_err(|_| StorageError::invalid_argument("maxKeys must not be negative"))?;
        let bucket = self.bucket(&request.bucket).await?;

        let mut objects: Vec<ObjectSummary> = bucket
            .store
            .list(None)
            .map_ok(summary)
            .try_collect()
            .await
            .map_err(store_error)?;
        objects.sort_by(|a, b| a.key.cmp(&b.key));

        let prefix = request.prefix.as_deref().unwrap_or("");
        let marker = request.marker.as_deref().unwrap_or("");
        let delimiter = request.delimiter.clone().filter(|d| !d.is_empty());

        let mut contents = Vec::new();
        let mut common_prefixes: Vec<CommonPrefix> = Vec::new();
        let mut last_returned: Option<String> = None;
        let mut is_truncated = false;

        for object in objects
            .into_iter()
            .filter(|object| object.key.starts_with(prefix) && object.key.as_str() > marker)
        {
            let rolled_up = delimiter.as_deref().and_then(|delimiter| {
                object.key[prefix.len()..]
                    .find(delimiter)
                    .map(|index| object.key[..prefix.len() + index + delimiter.len()].to_string())
            });

            if let Some(common) = &rolled_up {
                let already_listed = common_prefixes
                    .last()
                    .is_some_and(|last| &last.prefix == common);
                if already_listed || common.as_str() <= marker {
                    continue;
                }
            }

            if contents.len() + common_prefixes.len() == max_keys {
                is_truncated = true;
                break;
            }

            match rolled_up {
                Some(common) => {
                    last_returned = Some(common.clone());
                    common_prefixes.push(CommonPrefix { prefix: common });
                }
                None => {
                    last_returned = Some(object.key.clone());
                    contents.push(object);
                }
            }
        }

        Ok(ObjectListing {
            name: request.bucket,
            prefix: request.prefix,
            delimiter: request.delimiter,
            marker: request.marker,
            next_marker: if is_truncated && delimiter.is_some() {
                last_returned
            } else {
                None
            },
            max_keys: request.max_keys,
            is_truncated,
            contents,
            common_prefixes,
            links: vec![],
        })
    }

    async fn create_bucket(&self, bucket: &str) -> Result<CreatedBucket, StorageError> {
        if !valid_bucket_name(bucket) {
            return Err(StorageError::new(
                "InvalidBucketName",
                format!("The specified bucket is not valid: {bucket}"),
            )
            .with_status(400));
        }

        let mut buckets = self.buckets.write().await;
        if buckets.contains_key(bucket) {
            return Err(StorageError::new(
                "BucketAlreadyOwnedByYou",
                format!("Your previous request to create the named bucket succeeded and you already own it: {bucket}"),
            )
            .with_status(409));
        }
        buckets.insert(bucket.to_string(), Arc::new(MemoryBucket::new()));
        debug!(bucket, "Bucket created");

        Ok(CreatedBucket {
            location: Some(format!("/{bucket}")),
            links: vec![],
        })
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<DeletedBucket, StorageError> {
        let mut buckets = self.buckets.write().await;
        let existing = buckets
            .get(bucket)
            .ok_or_else(|| StorageError::no_such_bucket(bucket))?;

        if existing.store.list(None).next().await.is_some() {
            return Err(StorageError::new(
                "BucketNotEmpty",
                format!("The bucket you tried to delete is not empty: {bucket}"),
            )
            .with_status(409));
        }

        buckets.remove(bucket);
        debug!(bucket, "Bucket deleted");
        Ok(DeletedBucket {})
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectContent, StorageError> {
        let path = object_path(key)?;
        let bucket = self.bucket(bucket).await?;

        let result = bucket.store.get(&path).await.map_err(store_error)?;
        let content_type = bucket.content_types().get(key).cloned();

        Ok(ObjectContent {
            content_type,
            content_length: Some(result.meta.size as u64),
            e_tag: result.meta.e_tag.clone().map(|tag| format!("\"{tag}\"")),
            last_modified: Some(result.meta.last_modified),
            body: result.into_stream().map_err(store_error).boxed(),
        })
    }

    async fn upload(
        &self,
        request: UploadRequest,
        mut body: UploadStream,
    ) -> Result<UploadedObject, StorageError> {
        let path = object_path(&request.key)?;
        let bucket = self.bucket(&request.bucket).await?;

        let upload = bucket
            .store
            .put_multipart(&path)
            .await
            .map_err(store_error)?;
        let mut writer = WriteMultipart::new(upload);

        while let Some(chunk) = body.next().await {
            let failure = match chunk {
                Ok(chunk) => match writer.wait_for_capacity(MAX_INFLIGHT_PARTS).await {
                    Ok(()) => {
                        writer.write(&chunk);
                        continue;
                    }
                    Err(err) => store_error(err),
                },
                Err(err) => StorageError::request_body(err),
            };

            if let Err(err) = writer.abort().await {
                warn!(key = %request.key, error = %err, "Failed to abort upload");
            }
            return Err(failure);
        }

        let result = writer.finish().await.map_err(store_error)?;
        bucket
            .content_types()
            .insert(request.key.clone(), request.content_type);

        Ok(UploadedObject {
            location: Some(format!("/{}/{}", request.bucket, request.key)),
            bucket: request.bucket,
            key: request.key,
            e_tag: result.e_tag.map(|tag| format!("\"{tag}\"")),
            links: vec![],
        })
    }

    async fn delete_objects(
        &self,
        bucket: &str,
        keys: Vec<String>,
    ) -> Result<DeletedObjects, StorageError> {
        let bucket = self.bucket(bucket).await?;
        let mut result = DeletedObjects::default();

        for key in keys {
            let outcome = match object_path(&key) {
                Ok(path) => bucket.store.delete(&path).await.map_err(store_error),
                Err(err) => Err(err),
            };

            match outcome {
                Ok(()) => {
                    bucket.content_types().remove(&key);
                    result.deleted.push(DeletedObject { key });
                }
                Err(err) => result.errors.push(DeleteFailure {
                    key,
                    code: err.code,
                    message: err.message,
                }),
            }
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn body(data: &'static [u8]) -> UploadStream {
        futures::stream::iter(vec![Ok(Bytes::from_static(data))]).boxed()
    }

    async fn put(backend: &MemoryBackend, bucket: &str, key: &str, data: &'static [u8]) {
        backend
            .upload(
                UploadRequest {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                    content_type: "text/plain".to_string(),
                },
                body(data),
            )
            .await
            .unwrap();
    }

    async fn seeded(keys: &[&str]) -> MemoryBackend {
        let backend = MemoryBackend::new();
        backend.create_bucket("mybucket").await.unwrap();
        for key in keys {
            let data: &'static [u8] = if key.ends_with('/') { b"" } else { b"data" };
            put(&backend, "mybucket", key, data).await;
        }
        backend
    }

    fn list(prefix: Option<&str>, delimiter: Option<&str>, marker: Option<&str>, max_keys: i32) -> ListObjectsRequest {
        ListObjectsRequest {
            bucket: "mybucket".to_string(),
            delimiter: delimiter.map(str::to_string),
            marker: marker.map(str::to_string),
            max_keys,
            prefix: prefix.map(str::to_string),
        }
    }

    fn keys(listing: &ObjectListing) -> Vec<&str> {
        listing.contents.iter().map(|o| o.key.as_str()).collect()
    }

    #[tokio::test]
    async fn test_bucket_lifecycle() {
        let backend = MemoryBackend::new();
        let created = backend.create_bucket("photos").await.unwrap();
        assert_eq!(created.location.as_deref(), Some("/photos"));

        let again = backend.create_bucket("photos").await.unwrap_err();
        assert_eq!(again.code, "BucketAlreadyOwnedByYou");

        let buckets = backend.list_buckets().await.unwrap();
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].name, "photos");

        backend.delete_bucket("photos").await.unwrap();
        assert!(backend.list_buckets().await.unwrap().is_empty());

        let missing = backend.delete_bucket("photos").await.unwrap_err();
        assert_eq!(missing.code, "NoSuchBucket");
        assert_eq!(missing.status_code, Some(404));
    }

    #[tokio::test]
    async fn test_rejects_invalid_bucket_names() {
        let backend = MemoryBackend::new();
        for name in ["ab", "Upper", "_gateway", "-dash", "has space"] {
            let err = backend.create_bucket(name).await.unwrap_err();
            assert_eq!(err.code, "InvalidBucketName", "{name}");
        }
    }

    #[tokio::test]
    async fn test_non_empty_bucket_cannot_be_deleted() {
        let backend = seeded(&["a.txt"]).await;
        let err = backend.delete_bucket("mybucket").await.unwrap_err();
        assert_eq!(err.code, "BucketNotEmpty");
    }

    #[tokio::test]
    async fn test_keys_keep_slashes() {
        let backend = seeded(&["folder/", "folder/sub/file.txt", "a//b"]).await;
        let listing = backend.list_objects(list(None, None, None, 1000)).await.unwrap();
        assert_eq!(keys(&listing), vec!["a//b", "folder/", "folder/sub/file.txt"]);
        assert!(listing.contents[1].is_folder_marker());
        assert!(!listing.is_truncated);
    }

    #[tokio::test]
    async fn test_prefix_marker_and_truncation() {
        let backend = seeded(&["docs/a.txt", "docs/b.txt", "docs/c.txt", "other.txt"]).await;

        let first = backend
            .list_objects(list(Some("docs/"), None, None, 2))
            .await
            .unwrap();
        assert_eq!(keys(&first), vec!["docs/a.txt", "docs/b.txt"]);
        assert!(first.is_truncated);
        assert_eq!(first.next_marker, None);

        let second = backend
            .list_objects(list(Some("docs/"), None, Some("docs/b.txt"), 2))
            .await
            .unwrap();
        assert_eq!(keys(&second), vec!["docs/c.txt"]);
        assert!(!second.is_truncated);
    }

    #[tokio::test]
    async fn test_delimiter_rolls_up_common_prefixes() {
        let backend = seeded(&["a.txt", "docs/a.txt", "docs/b.txt", "img/x.png", "z.txt"]).await;

        let listing = backend
            .list_objects(list(None, Some("/"), None, 3))
            .await
            .unwrap();
        assert_eq!(keys(&listing), vec!["a.txt"]);
        assert_eq!(
            listing.common_prefixes,
            vec![
                CommonPrefix { prefix: "docs/".to_string() },
                CommonPrefix { prefix: "img/".to_string() },
            ]
        );
        assert!(listing.is_truncated);
        assert_eq!(listing.next_marker.as_deref(), Some("img/"));

        let rest = backend
            .list_objects(list(None, Some("/"), Some("img/"), 3))
            .await
            .unwrap();
        assert_eq!(keys(&rest), vec!["z.txt"]);
        assert!(rest.common_prefixes.is_empty());
    }

    #[tokio::test]
    async fn test_empty_delimiter_lists_flat() {
        let backend = seeded(&["a.txt", "docs/a.txt", "docs/b.txt"]).await;

        let listing = backend
            .list_objects(list(None, Some(""), None, 2))
            .await
            .unwrap();
        assert_eq!(keys(&listing), vec!["a.txt", "docs/a.txt"]);
        assert!(listing.common_prefixes.is_empty());
        assert!(listing.is_truncated);
        assert_eq!(listing.delimiter.as_deref(), Some(""));
        assert_eq!(listing.next_marker, None);
    }

    #[tokio::test]
    async fn test_negative_max_keys_is_rejected() {
        let backend = seeded(&[]).await;
        let err = backend.list_objects(list(None, None, None, -1)).await.unwrap_err();
        assert_eq!(err.code, "InvalidArgument");
    }

    #[tokio::test]
    async fn test_get_object_streams_what_was_uploaded() {
        let backend = seeded(&[]).await;
        let chunks = futures::stream::iter(vec![
            Ok(Bytes::from_static(b"hello ")),
            Ok(Bytes::from_static(b"world")),
        ])
        .boxed();
        backend
            .upload(
                UploadRequest {
                    bucket: "mybucket".to_string(),
                    key: "greeting.txt".to_string(),
                    content_type: "text/plain".to_string(),
                },
                chunks,
            )
            .await
            .unwrap();

        let content = backend.get_object("mybucket", "greeting.txt").await.unwrap();
        assert_eq!(content.content_type.as_deref(), Some("text/plain"));
        assert_eq!(content.content_length, Some(11));
        let data: Vec<Bytes> = content.body.try_collect().await.unwrap();
        assert_eq!(data.concat(), b"hello world");
    }

    #[tokio::test]
    async fn test_missing_object_and_bucket() {
        let backend = seeded(&[]).await;
        let err = backend.get_object("mybucket", "nope.txt").await.unwrap_err();
        assert_eq!(err.code, "NoSuchKey");

        let err = backend.get_object("nobucket", "nope.txt").await.unwrap_err();
        assert_eq!(err.code, "NoSuchBucket");
    }

    #[tokio::test]
    async fn test_failed_upload_leaves_no_object() {
        let backend = seeded(&[]).await;
        let chunks = futures::stream::iter(vec![
            Ok(Bytes::from_static(b"partial")),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
        ])
        .boxed();

        let err = backend
            .upload(
                UploadRequest {
                    bucket: "mybucket".to_string(),
                    key: "broken.bin".to_string(),
                    content_type: "application/octet-stream".to_string(),
                },
                chunks,
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, "RequestBodyError");

        let listing = backend.list_objects(list(None, None, None, 1000)).await.unwrap();
        assert!(listing.contents.is_empty());
    }

    #[tokio::test]
    async fn test_delete_objects_reports_each_key() {
        let backend = seeded(&["a.txt"]).await;
        let result = backend
            .delete_objects("mybucket", vec!["a.txt".to_string(), String::new()])
            .await
            .unwrap();

        assert_eq!(result.deleted, vec![DeletedObject { key: "a.txt".to_string() }]);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].code, "InvalidArgument");
        assert!(backend.get_object("mybucket", "a.txt").await.is_err());
    }
}

//! Storage backend abstraction layer
//!
//! The gateway never talks to a provider directly. All bucket and object
//! operations flow through [`StorageBackend`], which has two
//! implementations:
//! - [`S3Backend`]: AWS S3 or any S3-compatible endpoint via the AWS SDK
//! - [`MemoryBackend`]: in-process buckets on top of `object_store`'s
//!   `InMemory` store, for local development and tests
//!
//! Object bodies are streamed in both directions so memory use does not
//! depend on object size.

mod aws;
mod memory;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

use crate::config::{BackendType, Config};
use crate::model::{Bucket, CreatedBucket, DeletedBucket, DeletedObjects, ObjectListing, UploadedObject};

pub use aws::S3Backend;
pub use memory::MemoryBackend;

/// Object bytes flowing out of a backend
pub type ByteStream = BoxStream<'static, Result<Bytes, StorageError>>;

/// Request body bytes flowing into a backend
pub type UploadStream = BoxStream<'static, Result<Bytes, std::io::Error>>;

/// Error reported by the storage provider.
///
/// Serialized as-is into failed responses so clients see what the provider
/// said.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{code}: {message}")]
#[serde(rename_all = "camelCase")]
pub struct StorageError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl StorageError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            status_code: None,
            request_id: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status_code = Some(status);
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn no_such_bucket(bucket: &str) -> Self {
        Self::new(
            "NoSuchBucket",
            format!("The specified bucket does not exist: {bucket}"),
        )
        .with_status(404)
    }

    pub fn no_such_key(key: &str) -> Self {
        Self::new("NoSuchKey", format!("The specified key does not exist: {key}"))
            .with_status(404)
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new("InvalidArgument", message).with_status(400)
    }

    /// The client's request body failed while it was being uploaded
    pub fn request_body(err: std::io::Error) -> Self {
        Self::new("RequestBodyError", format!("Reading request body failed: {err}"))
            .with_status(400)
    }
}

/// Parameters of one ListObjects page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListObjectsRequest {
    pub bucket: String,
    pub delimiter: Option<String>,
    pub marker: Option<String>,
    pub max_keys: i32,
    pub prefix: Option<String>,
}

/// Upload parameters; the body is passed separately as a stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    pub bucket: String,
    pub key: String,
    pub content_type: String,
}

/// A readable object: its metadata and a stream of its bytes
pub struct ObjectContent {
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    pub e_tag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
    pub body: ByteStream,
}

impl std::fmt::Debug for ObjectContent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectContent")
            .field("content_type", &self.content_type)
            .field("content_length", &self.content_length)
            .field("e_tag", &self.e_tag)
            .field("last_modified", &self.last_modified)
            .finish_non_exhaustive()
    }
}

/// Storage backend trait for bucket and object operations
///
/// Results are provider representations; the gateway adds links on top.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// List all buckets visible to the configured credentials
    async fn list_buckets(&self) -> Result<Vec<Bucket>, StorageError>;

    /// List one page of objects in a bucket
    async fn list_objects(&self, request: ListObjectsRequest) -> Result<ObjectListing, StorageError>;

    /// Create a bucket
    async fn create_bucket(&self, bucket: &str) -> Result<CreatedBucket, StorageError>;

    /// Delete an empty bucket
    async fn delete_bucket(&self, bucket: &str) -> Result<DeletedBucket, StorageError>;

    /// Open an object for streaming
    async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectContent, StorageError>;

    /// Stream `body` into an object
    async fn upload(
        &self,
        request: UploadRequest,
        body: UploadStream,
    ) -> Result<UploadedObject, StorageError>;

    /// Delete a batch of keys
    async fn delete_objects(
        &self,
        bucket: &str,
        keys: Vec<String>,
    ) -> Result<DeletedObjects, StorageError>;
}

/// Create a storage backend based on configuration
pub async fn create_backend(config: &Config) -> anyhow::Result<Arc<dyn StorageBackend>> {
    match config.backend.backend_type {
        BackendType::S3 => {
            let backend = S3Backend::new(&config.backend).await;
            Ok(Arc::new(backend))
        }
        BackendType::Memory => Ok(Arc::new(MemoryBackend::new())),
    }
}

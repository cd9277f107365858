//! AWS S3 storage backend implementation
//!
//! Uses the AWS SDK client with support for:
//! - The default credential chain (environment, profile, IRSA, ECS task
//!   role, EC2 instance metadata)
//! - Explicit credentials (access key ID and secret access key)
//! - Custom endpoints and path-style addressing for S3-compatible services
//!
//! Uploads are streamed: bodies up to one part are sent with a single
//! PutObject, larger bodies go through a multipart upload that holds at most
//! one part in memory.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::{ByteStream as SdkByteStream, DateTime as SdkDateTime};
use aws_sdk_s3::types::{
    BucketLocationConstraint, CompletedMultipartUpload, CompletedPart, CreateBucketConfiguration,
    Delete, ObjectIdentifier,
};
use aws_sdk_s3::Client;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use futures::stream::{StreamExt, TryStreamExt};
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

use crate::config::BackendConfig;
use crate::model::{
    Bucket, CommonPrefix, CreatedBucket, DeleteFailure, DeletedBucket, DeletedObject,
    DeletedObjects, ObjectListing, ObjectSummary, UploadedObject,
};
use crate::storage::{
    ListObjectsRequest, ObjectContent, StorageBackend, StorageError, UploadRequest, UploadStream,
};

/// Size of each multipart upload part (S3 requires at least 5 MiB)
const PART_SIZE: usize = 8 * 1024 * 1024;

/// Region that must not be sent as a location constraint
const DEFAULT_REGION: &str = "us-east-1";

/// AWS S3 storage backend
pub struct S3Backend {
    client: Client,
    region: Option<String>,
}

impl S3Backend {
    /// Create a new S3 backend
    ///
    /// Supports two authentication modes:
    /// 1. Default credential provider chain (no keys configured)
    /// 2. Static credentials from the backend configuration
    pub async fn new(config: &BackendConfig) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());

        if let Some(region) = &config.region {
            loader = loader.region(Region::new(region.clone()));
        }

        if let (Some(access_key_id), Some(secret_access_key)) =
            (&config.access_key_id, &config.secret_access_key)
        {
            loader = loader.credentials_provider(Credentials::new(
                access_key_id,
                secret_access_key,
                None,
                None,
                "s3gateway-config",
            ));
        }

        let sdk_config = loader.load().await;
        let mut builder =
            aws_sdk_s3::config::Builder::from(&sdk_config).force_path_style(config.force_path_style);

        // Configure endpoint (for S3-compatible services like MinIO)
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        Self {
            client: Client::from_conf(builder.build()),
            region: sdk_config.region().map(|region| region.to_string()),
        }
    }

    async fn put_single(
        &self,
        request: UploadRequest,
        data: Bytes,
    ) -> Result<UploadedObject, StorageError> {
        debug!(bucket = %request.bucket, key = %request.key, size = data.len(), "PutObject");

        let output = self
            .client
            .put_object()
            .bucket(&request.bucket)
            .key(&request.key)
            .content_type(&request.content_type)
            .body(SdkByteStream::from(data))
            .send()
            .await
            .map_err(provider_error)?;

        Ok(UploadedObject {
            bucket: request.bucket,
            key: request.key,
            location: None,
            e_tag: output.e_tag().map(str::to_string),
            links: vec![],
        })
    }

    async fn put_multipart(
        &self,
        request: UploadRequest,
        buffer: BytesMut,
        body: UploadStream,
    ) -> Result<UploadedObject, StorageError> {
        let created = self
            .client
            .create_multipart_upload()
            .bucket(&request.bucket)
            .key(&request.key)
            .content_type(&request.content_type)
            .send()
            .await
            .map_err(provider_error)?;

        let upload_id = created
            .upload_id()
            .ok_or_else(|| {
                StorageError::new(
                    "InvalidResponse",
                    "CreateMultipartUpload returned no upload id",
                )
            })?
            .to_string();
        debug!(bucket = %request.bucket, key = %request.key, upload_id = %upload_id, "Multipart upload started");

        match self.finish_multipart(&request, &upload_id, buffer, body).await {
            Ok(output) => Ok(output),
            Err(err) => {
                self.abort_multipart(&request, &upload_id).await;
                Err(err)
            }
        }
    }

    async fn finish_multipart(
        &self,
        request: &UploadRequest,
        upload_id: &str,
        mut buffer: BytesMut,
        mut body: UploadStream,
    ) -> Result<UploadedObject, StorageError> {
        let mut parts = Vec::new();

        loop {
            let finished = fill_part(&mut buffer, &mut body).await?;

            if !buffer.is_empty() {
                let part_number = i32::try_from(parts.len() + 1).map_err(|_| {
                    StorageError::invalid_argument("Upload exceeds the maximum number of parts")
                })?;
                let output = self
                    .client
                    .upload_part()
                    .bucket(&request.bucket)
                    .key(&request.key)
                    .upload_id(upload_id)
                    .part_number(part_number)
                    .body(SdkByteStream::from(buffer.split().freeze()))
                    .send()
                    .await
                    .map_err(provider_error)?;

                parts.push(
                    CompletedPart::builder()
                        .set_e_tag(output.e_tag().map(str::to_string))
                        .part_number(part_number)
                        .build(),
                );
            }

            if finished {
                break;
            }
        }

        let output = self
            .client
            .complete_multipart_upload()
            .bucket(&request.bucket)
            .key(&request.key)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(parts))
                    .build(),
            )
            .send()
            .await
            .map_err(provider_error)?;

        Ok(UploadedObject {
            bucket: request.bucket.clone(),
            key: request.key.clone(),
            location: output.location().map(str::to_string),
            e_tag: output.e_tag().map(str::to_string),
            links: vec![],
        })
    }

    async fn abort_multipart(&self, request: &UploadRequest, upload_id: &str) {
        if let Err(err) = self
            .client
            .abort_multipart_upload()
            .bucket(&request.bucket)
            .key(&request.key)
            .upload_id(upload_id)
            .send()
            .await
        {
            warn!(
                bucket = %request.bucket,
                key = %request.key,
                upload_id,
                error = %DisplayErrorContext(&err),
                "Failed to abort multipart upload"
            );
        }
    }
}

/// Pull chunks into `buffer` until it holds a full part. Returns `true` once
/// the body is exhausted.
async fn fill_part(buffer: &mut BytesMut, body: &mut UploadStream) -> Result<bool, StorageError> {
    while buffer.len() < PART_SIZE {
        match body.next().await {
            Some(chunk) => buffer.extend_from_slice(&chunk.map_err(StorageError::request_body)?),
            None => return Ok(true),
        }
    }
    Ok(false)
}

/// Convert an SDK failure into the provider error shown to clients
fn provider_error<E>(err: SdkError<E, HttpResponse>) -> StorageError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let fallback_code = match &err {
        SdkError::TimeoutError(_) => "TimeoutError",
        SdkError::DispatchFailure(_) => "NetworkingError",
        SdkError::ConstructionFailure(_) => "ConstructionFailure",
        SdkError::ResponseError(_) => "ResponseError",
        _ => "UnknownError",
    };

    let mut storage_error = StorageError::new(
        err.code().unwrap_or(fallback_code),
        err.message()
            .map(str::to_string)
            .unwrap_or_else(|| DisplayErrorContext(&err).to_string()),
    );

    if let Some(response) = err.raw_response() {
        storage_error = storage_error.with_status(response.status().as_u16());
    }
    if let Some(request_id) = err.meta().extra("aws_request_id") {
        storage_error = storage_error.with_request_id(request_id);
    }

    storage_error
}

fn to_utc(value: &SdkDateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(value.secs(), value.subsec_nanos())
}

#[async_trait]
impl StorageBackend for S3Backend {
    async fn list_buckets(&self) -> Result<Vec<Bucket>, StorageError> {
        let output = self
            .client
            .list_buckets()
            .send()
            .await
            .map_err(provider_error)?;

        Ok(output
            .buckets()
            .iter()
            .map(|bucket| Bucket {
                name: bucket.name().unwrap_or_default().to_string(),
                creation_date: bucket.creation_date().and_then(to_utc),
                links: vec![],
            })
            .collect())
    }

    async fn list_objects(&self, request: ListObjectsRequest) -> Result<ObjectListing, StorageError> {
        let output = self
            .client
            .list_objects()
            .bucket(&request.bucket)
            .set_delimiter(request.delimiter.clone())
            .set_marker(request.marker.clone())
            .set_prefix(request.prefix.clone())
            .max_keys(request.max_keys)
            .send()
            .await
            .map_err(provider_error)?;

        let contents = output
            .contents()
            .iter()
            .map(|object| ObjectSummary {
                key: object.key().unwrap_or_default().to_string(),
                last_modified: object.last_modified().and_then(to_utc),
                e_tag: object.e_tag().map(str::to_string),
                size: object.size().and_then(|size| u64::try_from(size).ok()).unwrap_or(0),
                storage_class: object.storage_class().map(|class| class.as_str().to_string()),
                links: vec![],
            })
            .collect();

        let common_prefixes = output
            .common_prefixes()
            .iter()
            .filter_map(|prefix| prefix.prefix())
            .map(|prefix| CommonPrefix {
                prefix: prefix.to_string(),
            })
            .collect();

        Ok(ObjectListing {
            name: output.name().unwrap_or(request.bucket.as_str()).to_string(),
            prefix: output.prefix().map(str::to_string),
            delimiter: output.delimiter().map(str::to_string),
            marker: output.marker().map(str::to_string),
            next_marker: output.next_marker().map(str::to_string),
            max_keys: output.max_keys().unwrap_or(request.max_keys),
            is_truncated: output.is_truncated().unwrap_or(false),
            contents,
            common_prefixes,
            links: vec![],
        })
    }

    async fn create_bucket(&self, bucket: &str) -> Result<CreatedBucket, StorageError> {
        let mut request = self.client.create_bucket().bucket(bucket);

        if let Some(region) = self.region.as_deref().filter(|region| *region != DEFAULT_REGION) {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(region))
                    .build(),
            );
        }

        let output = request.send().await.map_err(provider_error)?;

        Ok(CreatedBucket {
            location: output.location().map(str::to_string),
            links: vec![],
        })
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<DeletedBucket, StorageError> {
        self.client
            .delete_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(provider_error)?;

        Ok(DeletedBucket {})
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectContent, StorageError> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(provider_error)?;

        let content_type = output.content_type().map(str::to_string);
        let content_length = output
            .content_length()
            .and_then(|length| u64::try_from(length).ok());
        let e_tag = output.e_tag().map(str::to_string);
        let last_modified = output.last_modified().and_then(to_utc);

        let body = ReaderStream::new(output.body.into_async_read())
            .map_err(|err| StorageError::new("StreamError", err.to_string()))
            .boxed();

        Ok(ObjectContent {
            content_type,
            content_length,
            e_tag,
            last_modified,
            body,
        })
    }

    async fn upload(
        &self,
        request: UploadRequest,
        mut body: UploadStream,
    ) -> Result<UploadedObject, StorageError> {
        let mut buffer = BytesMut::new();

        // Bodies that end before filling one part never start a multipart upload.
        if fill_part(&mut buffer, &mut body).await? {
            return self.put_single(request, buffer.freeze()).await;
        }

        self.put_multipart(request, buffer, body).await
    }

    async fn delete_objects(
        &self,
        bucket: &str,
        keys: Vec<String>,
    ) -> Result<DeletedObjects, StorageError> {
        let objects = keys
            .into_iter()
            .map(|key| ObjectIdentifier::builder().key(key).build())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| StorageError::invalid_argument(err.to_string()))?;
        let delete = Delete::builder()
            .set_objects(Some(objects))
            .build()
            .map_err(|err| StorageError::invalid_argument(err.to_string()))?;

        let output = self
            .client
            .delete_objects()
            .bucket(bucket)
            .delete(delete)
            .send()
            .await
            .map_err(provider_error)?;

        Ok(DeletedObjects {
            deleted: output
                .deleted()
                .iter()
                .filter_map(|deleted| deleted.key())
                .map(|key| DeletedObject {
                    key: key.to_string(),
                })
                .collect(),
            errors: output
                .errors()
                .iter()
                .map(|failure| DeleteFailure {
                    key: failure.key().unwrap_or_default().to_string(),
                    code: failure.code().unwrap_or_default().to_string(),
                    message: failure.message().unwrap_or_default().to_string(),
                })
                .collect(),
        })
    }
}

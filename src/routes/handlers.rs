//! Request handlers for the gateway endpoints

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures::stream::{StreamExt, TryStreamExt};
use std::io;
use tracing::{error, info, instrument};

use super::keypath::ObjectPath;
use super::{AppState, ListObjectsQuery};
use crate::errors::{GatewayError, Result};
use crate::hypermedia::{LinkBuilder, RequestContext};
use crate::metrics::observe_storage;
use crate::model::{Bucket, CreatedBucket, DeletedBucket, DeletedObjects, ObjectListing, UploadedObject};
use crate::storage::{ListObjectsRequest, StorageError, UploadRequest};

/// Log a failed storage call and turn it into the response error
fn storage_failure(operation: &'static str) -> impl FnOnce(StorageError) -> GatewayError {
    move |err| {
        error!(operation, error = %err, "Storage operation failed");
        GatewayError::Storage(err)
    }
}

/// Liveness check
#[instrument]
pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Readiness check; the backend must answer a bucket listing
#[instrument(skip(state))]
pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    match state.storage.list_buckets().await {
        Ok(_) => (StatusCode::OK, "Ready"),
        Err(err) => {
            error!(error = %err, "Backend not ready");
            (StatusCode::SERVICE_UNAVAILABLE, "Backend unavailable")
        }
    }
}

/// Prometheus metrics endpoint
#[instrument]
pub async fn metrics() -> Result<String> {
    crate::metrics::render().map_err(|err| GatewayError::Internal(err.to_string()))
}

/// ListBuckets - GET /
#[instrument(skip(state))]
pub async fn list_buckets(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Json<Vec<Bucket>>> {
    info!("ListBuckets request");

    let mut buckets = observe_storage("list_buckets", state.storage.list_buckets())
        .await
        .map_err(storage_failure("list_buckets"))?;

    let links = LinkBuilder::new(&ctx);
    for bucket in &mut buckets {
        bucket.links = vec![links.bucket(&bucket.name)];
    }

    Ok(Json(buckets))
}

/// ListObjects - GET /{name}?prefix=&delimiter=&marker=&maxKeys=
#[instrument(skip(state))]
pub async fn get_bucket(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(name): Path<String>,
) -> Result<Json<ObjectListing>> {
    let params = ListObjectsQuery::parse(&ctx.raw_query);
    info!(bucket = %name, prefix = ?params.prefix, marker = ?params.marker, "ListObjects request");

    let max_keys = match params.max_keys.as_deref() {
        None | Some("") => state.settings.default_max_keys,
        Some(raw) => raw.parse().map_err(|_| GatewayError::InvalidParameter {
            name: "maxKeys",
            value: raw.to_string(),
        })?,
    };

    let request = ListObjectsRequest {
        bucket: name,
        delimiter: params.delimiter,
        marker: params.marker,
        max_keys,
        prefix: params.prefix,
    };

    let mut listing = observe_storage("list_objects", state.storage.list_objects(request))
        .await
        .map_err(storage_failure("list_objects"))?;

    LinkBuilder::new(&ctx).decorate_listing(&mut listing);

    Ok(Json(listing))
}

/// CreateBucket - PUT /{name}
#[instrument(skip(state))]
pub async fn create_bucket(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(name): Path<String>,
) -> Result<Json<CreatedBucket>> {
    info!(bucket = %name, "CreateBucket request");

    let mut created = observe_storage("create_bucket", state.storage.create_bucket(&name))
        .await
        .map_err(storage_failure("create_bucket"))?;

    created.links = vec![LinkBuilder::new(&ctx).current()];
    Ok(Json(created))
}

/// DeleteBucket - DELETE /{name}
#[instrument(skip(state))]
pub async fn delete_bucket(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<DeletedBucket>> {
    info!(bucket = %name, "DeleteBucket request");

    let deleted = observe_storage("delete_bucket", state.storage.delete_bucket(&name))
        .await
        .map_err(storage_failure("delete_bucket"))?;

    Ok(Json(deleted))
}

/// GetObject - GET /{name}/{key}
///
/// The provider stream becomes the response body. Once bytes are flowing a
/// provider failure can only cut the connection short.
#[instrument(skip(state))]
pub async fn get_object(
    State(state): State<AppState>,
    object: ObjectPath,
) -> Result<Response> {
    info!(bucket = %object.bucket, key = %object.key, "GetObject request");

    let content = observe_storage(
        "get_object",
        state.storage.get_object(&object.bucket, &object.key),
    )
    .await
    .map_err(storage_failure("get_object"))?;

    let content_type = content
        .content_type
        .unwrap_or_else(|| mime::APPLICATION_OCTET_STREAM.to_string());

    let mut response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type);
    if let Some(length) = content.content_length {
        response = response.header(header::CONTENT_LENGTH, length);
    }
    if let Some(e_tag) = &content.e_tag {
        response = response.header(header::ETAG, e_tag);
    }
    if let Some(modified) = content.last_modified {
        response = response.header(
            header::LAST_MODIFIED,
            modified.format("%a, %d %b %Y %H:%M:%S GMT").to_string(),
        );
    }

    let key = object.key;
    let body = content.body.inspect_err(move |err| {
        error!(key = %key, error = %err, "Object stream failed mid-response");
    });

    response
        .body(Body::from_stream(body))
        .map_err(|e| GatewayError::Internal(format!("Failed to build response: {}", e)))
}

/// PutObject - PUT /{name}/{key}
///
/// The request body is handed to the backend as a stream.
#[instrument(skip(state, headers, body))]
pub async fn put_object(
    State(state): State<AppState>,
    ctx: RequestContext,
    object: ObjectPath,
    headers: HeaderMap,
    body: Body,
) -> Result<Json<UploadedObject>> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| {
            mime_guess::from_path(&object.key)
                .first_or_octet_stream()
                .to_string()
        });
    info!(bucket = %object.bucket, key = %object.key, content_type = %content_type, "PutObject request");

    let stream = body
        .into_data_stream()
        .map_err(|err| io::Error::new(io::ErrorKind::Other, err))
        .boxed();

    let request = UploadRequest {
        bucket: object.bucket,
        key: object.key,
        content_type,
    };

    let mut uploaded = observe_storage("upload", state.storage.upload(request, stream))
        .await
        .map_err(storage_failure("upload"))?;

    uploaded.links = vec![LinkBuilder::new(&ctx).current()];
    Ok(Json(uploaded))
}

/// DeleteObject - DELETE /{name}/{key}
#[instrument(skip(state))]
pub async fn delete_object(
    State(state): State<AppState>,
    object: ObjectPath,
) -> Result<Json<DeletedObjects>> {
    info!(bucket = %object.bucket, key = %object.key, "DeleteObject request");

    let deleted = observe_storage(
        "delete_objects",
        state.storage.delete_objects(&object.bucket, vec![object.key]),
    )
    .await
    .map_err(storage_failure("delete_objects"))?;

    Ok(Json(deleted))
}

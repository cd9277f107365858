//! Error types for S3Gateway
//!
//! Every failure a handler can hit ends up here. The gateway does not
//! classify provider failures: a missing bucket, a permission problem and a
//! network fault all answer HTTP 500 with the provider's error as the JSON
//! body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::storage::StorageError;

/// Main error type for request handling
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Storage backend operation failed
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// A request parameter could not be interpreted
    #[error("Invalid value for {name}: {value}")]
    InvalidParameter { name: &'static str, value: String },

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let body = match self {
            GatewayError::Storage(err) => Json(json!(err)),
            GatewayError::InvalidParameter { name, value } => Json(json!({
                "code": "InvalidParameterValue",
                "message": format!("Invalid value for {name}: {value}"),
            })),
            GatewayError::Internal(message) => Json(json!({
                "code": "InternalError",
                "message": message,
            })),
        };

        (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, GatewayError>;

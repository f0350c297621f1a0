use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::error;

use crate::registry::RegistryError;
use crate::storage::StorageError;

/// JSON body for every failure response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Error type for the transfer endpoints, mapped onto the HTTP taxonomy:
/// 400 invalid input, 403 wrong PIN, 404 unknown key or missing blob,
/// 413 oversized upload, 500 everything else.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Wrong PIN")]
    Forbidden,

    #[error("File not found")]
    NotFound,

    #[error("File exceeds maximum upload size of {0} bytes")]
    PayloadTooLarge(u64),

    #[error("Storage error: {0}")]
    Storage(StorageError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<RegistryError> for ApiError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::NotFound => ApiError::NotFound,
            RegistryError::Forbidden => ApiError::Forbidden,
            RegistryError::InvalidInput(msg) => ApiError::InvalidInput(msg),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        match e {
            // A missing blob surfaces as not-found; the transfer handlers
            // log the registry/storage drift case before converting.
            StorageError::NotFound => ApiError::NotFound,
            other => ApiError::Storage(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, detail) = match &self {
            ApiError::InvalidInput(msg) => {
                (StatusCode::BAD_REQUEST, "Invalid input", Some(msg.clone()))
            }
            ApiError::Forbidden => (StatusCode::FORBIDDEN, "Wrong PIN", None),
            ApiError::NotFound => (StatusCode::NOT_FOUND, "File not found", None),
            ApiError::PayloadTooLarge(max) => (
                StatusCode::PAYLOAD_TOO_LARGE,
                "File too large",
                Some(format!("maximum upload size is {max} bytes")),
            ),
            ApiError::Storage(e) => {
                error!(error = %e, "Storage error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Storage error", None)
            }
            ApiError::Internal(msg) => {
                error!(error = %msg, "Internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            detail,
        };

        (status, Json(body)).into_response()
    }
}

//! Upload, download, and delete endpoints.
//!
//! - POST /upload - multipart upload (file + pin + optional nickname)
//! - POST /download - PIN-gated streaming download by storage key
//! - POST /delete - PIN-gated delete by storage key
//!
//! Each handler translates between HTTP and the registry/blob store pair:
//! the registry is the source of truth, the blob store only ever sees
//! registry-generated keys.

use axum::{
    Json, Router,
    body::Body,
    extract::{Multipart, State},
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
    routing::post,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::api::{ApiError, AppState};
use crate::registry::CatalogEntry;
use crate::storage::{BlobStore, StagedBlob, StorageError};

/// Response for a successful upload.
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub success: bool,
    pub file: CatalogEntry,
}

/// Request body for download and delete: the storage key (called
/// `filename` on the wire for compatibility) plus the PIN.
#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    pub filename: String,
    pub pin: String,
}

/// Response for a successful delete.
#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub success: bool,
}

pub fn router<S: BlobStore>() -> Router<AppState<S>> {
    Router::new()
        .route("/upload", post(upload))
        .route("/download", post(download))
        .route("/delete", post(delete))
}

/// The file part of an upload, staged in the blob store.
struct StagedUpload {
    original_name: String,
    staged: StagedBlob,
}

/// POST /upload - Receive a file with its PIN and register it
///
/// The file part is streamed straight into a staged blob while counting
/// bytes (the configured limit is enforced mid-stream, so an oversized
/// transfer is cut short). Only once the bytes are safely staged is the
/// record registered; a failure committing the blob afterwards retracts the
/// record, so a client never sees success for a file that is not actually
/// downloadable.
async fn upload<S: BlobStore>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut pin = String::new();
    let mut nickname = String::new();
    let mut file: Option<StagedUpload> = None;

    let max = state.max_upload_bytes;
    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, max))?
    {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "pin" => {
                pin = field.text().await.map_err(|e| multipart_error(e, max))?;
            }
            "nickname" => {
                nickname = field.text().await.map_err(|e| multipart_error(e, max))?;
            }
            "file" => {
                let original_name = field.file_name().unwrap_or_default().to_string();

                // Stage in the blob store as the chunks arrive; an abort or
                // an oversized transfer drops the staged blob and nothing
                // else. The bytes are written once and committed by rename.
                let mut staged = state.storage.begin().await?;

                while let Some(chunk) =
                    field.chunk().await.map_err(|e| multipart_error(e, max))?
                {
                    if staged.written() + chunk.len() as u64 > max {
                        return Err(ApiError::PayloadTooLarge(max));
                    }
                    staged.write_chunk(&chunk).await.map_err(StorageError::Io)?;
                }

                file = Some(StagedUpload {
                    original_name,
                    staged,
                });
            }
            _ => {}
        }
    }

    let file = file.ok_or_else(|| ApiError::InvalidInput("missing file part".into()))?;
    let origin_device = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown device")
        .to_string();

    // Registration makes the key visible and broadcasts the catalog. The
    // bytes are already staged at this point, just not under the key yet.
    let record = state.registry.register(
        &file.original_name,
        file.staged.written(),
        &origin_device,
        &nickname,
        &pin,
    )?;

    if let Err(e) = state.storage.commit(file.staged, &record.storage_key).await {
        // Roll back: the record must not outlive a blob that never landed.
        state.registry.retract(&record.storage_key);
        return Err(e.into());
    }

    info!(
        key = %record.storage_key,
        name = %record.original_name,
        size = record.size_bytes,
        "file uploaded"
    );

    Ok((
        StatusCode::OK,
        Json(UploadResponse {
            success: true,
            file: CatalogEntry::from(&record),
        }),
    ))
}

/// POST /download - Stream a file back to anyone holding the PIN
async fn download<S: BlobStore>(
    State(state): State<AppState<S>>,
    Json(req): Json<TransferRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state.registry.authorize_fetch(&req.filename, &req.pin)?;

    let stream = state.storage.get(&record.storage_key).await.map_err(|e| {
        if matches!(e, StorageError::NotFound) {
            // The catalog says live but the bytes are gone: filesystem
            // drift, worth a distinct log line.
            warn!(key = %record.storage_key, "blob missing for live record");
        }
        ApiError::from(e)
    })?;

    let disposition = format!(
        "attachment; filename=\"{}\"",
        record.original_name.replace(['"', '\r', '\n'], "_")
    );

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::CONTENT_LENGTH, record.size_bytes.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from_stream(stream),
    ))
}

/// POST /delete - Remove a file for anyone holding the PIN
///
/// The record is removed first, then the blob; a blob that is already gone
/// (or fails to delete) is logged and the delete still succeeds, since the
/// record removal is the authoritative act.
async fn delete<S: BlobStore>(
    State(state): State<AppState<S>>,
    Json(req): Json<TransferRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state.registry.authorize_remove(&req.filename, &req.pin)?;

    match state.storage.delete(&record.storage_key).await {
        Ok(()) => {}
        Err(StorageError::NotFound) => {
            warn!(key = %record.storage_key, "blob already missing on delete");
        }
        Err(e) => {
            warn!(key = %record.storage_key, error = %e, "failed to delete blob");
        }
    }

    info!(key = %record.storage_key, name = %record.original_name, "file deleted");
    Ok((StatusCode::OK, Json(DeleteResponse { success: true })))
}

fn multipart_error(e: axum::extract::multipart::MultipartError, max: u64) -> ApiError {
    // An over-limit body surfaces as a multipart read error carrying 413;
    // everything else (including a client abort mid-transfer) is a failed
    // upload and nothing gets registered.
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(max)
    } else {
        ApiError::InvalidInput(format!("malformed or aborted upload: {e}"))
    }
}

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::registry::FileRegistry;
use crate::storage::BlobStore;

mod error;
mod events;
mod transfer;

pub use error::{ApiError, ErrorResponse};

pub struct AppState<S: BlobStore> {
    pub registry: Arc<FileRegistry>,
    pub storage: Arc<S>,
    pub max_upload_bytes: u64,
}

impl<S: BlobStore> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            storage: Arc::clone(&self.storage),
            max_upload_bytes: self.max_upload_bytes,
        }
    }
}

pub fn router<S: BlobStore>(
    registry: Arc<FileRegistry>,
    storage: Arc<S>,
    config: &Config,
) -> Router {
    let state = AppState {
        registry,
        storage,
        max_upload_bytes: config.max_upload_bytes,
    };

    // The multipart framing adds overhead on top of the file itself, so the
    // body limit sits a little above the configured file cap; the handler
    // enforces the exact per-file limit while streaming.
    let body_limit = (config.max_upload_bytes as usize).saturating_add(64 * 1024);

    Router::new()
        .merge(transfer::router())
        .merge(events::router())
        .route("/healthz", get(healthz))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /healthz - Liveness check, also the keep-alive self-ping target
async fn healthz() -> &'static str {
    "ok"
}

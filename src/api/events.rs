//! Live catalog channel.
//!
//! `GET /events` is a Server-Sent Events stream: a newly connected client
//! immediately receives the catalog as it stands, then every subsequent
//! catalog-changed broadcast in order. Each message is a complete redacted
//! snapshot, so a subscriber that falls behind loses nothing by skipping to
//! the latest one.

use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::get;
use futures::{StreamExt, stream};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::debug;

use crate::api::AppState;
use crate::storage::BlobStore;

pub fn router<S: BlobStore>() -> Router<AppState<S>> {
    Router::new().route("/events", get(subscribe))
}

/// GET /events - Subscribe to live catalog updates
async fn subscribe<S: BlobStore>(State(state): State<AppState<S>>) -> impl IntoResponse {
    // Subscribe before taking the snapshot: an update landing in between
    // shows up twice as identical snapshots, which is harmless, while the
    // other order would lose it.
    let rx = state.registry.subscribe();
    let initial = state.registry.snapshot();

    let updates = BroadcastStream::new(rx).filter_map(|item| async move {
        match item {
            Ok(snapshot) => Some(snapshot),
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                debug!(skipped, "catalog subscriber lagged, continuing from latest");
                None
            }
        }
    });

    let events = stream::once(async move { initial })
        .chain(updates)
        .map(|snapshot| Event::default().event("catalog").json_data(&snapshot));

    Sse::new(events).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

//! Expiry sweep scheduler.
//!
//! One task owns the sweep: it consumes the timer ticks itself, so two
//! sweeps can never run concurrently, and a tick that comes due while a
//! sweep is still in flight is skipped rather than queued.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::registry::FileRegistry;
use crate::storage::{BlobStore, StorageError};

/// Run the sweep loop forever. Spawned once at startup.
pub async fn run<S: BlobStore>(
    registry: Arc<FileRegistry>,
    storage: Arc<S>,
    interval: Duration,
) {
    let mut timer = tokio::time::interval(interval);
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick completes immediately; skip it so the first sweep
    // happens one interval after startup.
    timer.tick().await;

    loop {
        timer.tick().await;

        let removed = registry.sweep_expired(SystemTime::now());
        if removed.is_empty() {
            continue;
        }
        info!(count = removed.len(), "expiry sweep evicted files");

        // Blob deletion is best-effort: the records are already gone from
        // the catalog, and the sweep broadcast has been sent.
        for record in &removed {
            match storage.delete(&record.storage_key).await {
                Ok(()) => {}
                Err(StorageError::NotFound) => {
                    warn!(key = %record.storage_key, "blob already missing during sweep");
                }
                Err(e) => {
                    warn!(key = %record.storage_key, error = %e, "failed to delete expired blob");
                }
            }
        }
    }
}

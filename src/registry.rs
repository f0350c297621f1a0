//! The file registry: in-memory catalog of uploaded files.
//!
//! Owns the ordered list of live records, enforces PIN checks on download
//! and delete, runs the expiry sweep, and notifies subscribers whenever the
//! catalog changes.

use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

/// Registry error type.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("No file with that key")]
    NotFound,

    #[error("Wrong PIN")]
    Forbidden,

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Metadata for one uploaded file. Internal only; the PIN digest never
/// leaves the server, so this type is deliberately not serializable.
#[derive(Debug, Clone)]
pub struct FileRecord {
    pub original_name: String,
    pub storage_key: String,
    pub size_bytes: u64,
    pub origin_device: String,
    pub nickname: String,
    pub pin_hash: blake3::Hash,
    pub created_at: SystemTime,
    pub expires_at: SystemTime,
}

impl FileRecord {
    fn verify_pin(&self, supplied: &str) -> bool {
        // blake3::Hash equality is constant-time.
        blake3::hash(supplied.as_bytes()) == self.pin_hash
    }
}

/// The client-facing view of a record. Carries everything except the PIN,
/// with timestamps as milliseconds since the Unix epoch.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub original_name: String,
    pub storage_key: String,
    pub size_bytes: u64,
    pub origin_device: String,
    pub nickname: String,
    pub created_at: u64,
    pub expires_at: u64,
}

impl From<&FileRecord> for CatalogEntry {
    fn from(record: &FileRecord) -> Self {
        Self {
            original_name: record.original_name.clone(),
            storage_key: record.storage_key.clone(),
            size_bytes: record.size_bytes,
            origin_device: record.origin_device.clone(),
            nickname: record.nickname.clone(),
            created_at: unix_millis(record.created_at),
            expires_at: unix_millis(record.expires_at),
        }
    }
}

fn unix_millis(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// The catalog of live files.
///
/// All mutation goes through the one internal mutex, which is never held
/// across an await point. Blob I/O is the caller's job and happens outside
/// the critical section, coordinated by storage key.
pub struct FileRegistry {
    catalog: Mutex<Vec<FileRecord>>,
    changes: broadcast::Sender<Vec<CatalogEntry>>,
    ttl: Duration,
}

impl FileRegistry {
    /// Create an empty registry whose records live for `ttl` after upload.
    pub fn new(ttl: Duration) -> Self {
        let (changes, _) = broadcast::channel(16);
        Self {
            catalog: Mutex::new(Vec::new()),
            changes,
            ttl,
        }
    }

    /// Register a newly uploaded file and announce the catalog change.
    ///
    /// Generates a storage key that is unique among live records; duplicate
    /// original names are fine. The caller is expected to have the bytes
    /// staged already and to persist them under the returned key.
    pub fn register(
        &self,
        original_name: &str,
        size_bytes: u64,
        origin_device: &str,
        nickname: &str,
        pin: &str,
    ) -> Result<FileRecord, RegistryError> {
        if pin.is_empty() {
            return Err(RegistryError::InvalidInput("PIN must not be empty".into()));
        }
        if original_name.is_empty() {
            return Err(RegistryError::InvalidInput(
                "file name must not be empty".into(),
            ));
        }

        let created_at = SystemTime::now();
        let mut record = FileRecord {
            original_name: original_name.to_string(),
            storage_key: String::new(),
            size_bytes,
            origin_device: origin_device.to_string(),
            nickname: nickname.to_string(),
            pin_hash: blake3::hash(pin.as_bytes()),
            created_at,
            expires_at: created_at + self.ttl,
        };

        {
            let mut catalog = self.catalog.lock().unwrap();
            // The UUID token makes collisions all but impossible, but key
            // uniqueness is an invariant, not a probability.
            loop {
                let key = generate_storage_key(original_name);
                if !catalog.iter().any(|r| r.storage_key == key) {
                    record.storage_key = key;
                    break;
                }
            }
            catalog.push(record.clone());
        }

        debug!(key = %record.storage_key, name = %record.original_name, "registered file");
        self.publish();
        Ok(record)
    }

    /// Look up a record for download. Read-only; the record stays live.
    ///
    /// Unknown keys are `NotFound`; a known key with the wrong PIN is
    /// always `Forbidden`, even when the supplied PIN is empty.
    pub fn authorize_fetch(
        &self,
        storage_key: &str,
        supplied_pin: &str,
    ) -> Result<FileRecord, RegistryError> {
        let catalog = self.catalog.lock().unwrap();
        let record = catalog
            .iter()
            .find(|r| r.storage_key == storage_key)
            .ok_or(RegistryError::NotFound)?;
        if !record.verify_pin(supplied_pin) {
            return Err(RegistryError::Forbidden);
        }
        Ok(record.clone())
    }

    /// Look up and remove a record in one atomic step, then announce the
    /// change. The caller must delete the blob after this returns; removal
    /// happens first so no record ever points at a deleted blob.
    pub fn authorize_remove(
        &self,
        storage_key: &str,
        supplied_pin: &str,
    ) -> Result<FileRecord, RegistryError> {
        let record = {
            let mut catalog = self.catalog.lock().unwrap();
            let pos = catalog
                .iter()
                .position(|r| r.storage_key == storage_key)
                .ok_or(RegistryError::NotFound)?;
            if !catalog[pos].verify_pin(supplied_pin) {
                return Err(RegistryError::Forbidden);
            }
            catalog.remove(pos)
        };

        debug!(key = %storage_key, "removed file");
        self.publish();
        Ok(record)
    }

    /// Roll back a registration whose blob never made it to storage.
    /// No PIN check; this is only reachable from the upload path.
    pub fn retract(&self, storage_key: &str) {
        let removed = {
            let mut catalog = self.catalog.lock().unwrap();
            let before = catalog.len();
            catalog.retain(|r| r.storage_key != storage_key);
            catalog.len() != before
        };
        if removed {
            debug!(key = %storage_key, "retracted failed upload");
            self.publish();
        }
    }

    /// The current catalog, in upload order, with PINs redacted.
    pub fn snapshot(&self) -> Vec<CatalogEntry> {
        let catalog = self.catalog.lock().unwrap();
        catalog.iter().map(CatalogEntry::from).collect()
    }

    /// Remove every record whose lifetime has elapsed at `now` and return
    /// the removed records so the caller can delete their blobs.
    ///
    /// Issues at most one catalog broadcast per call, and none when nothing
    /// expired, so repeated sweeps of an unchanged catalog are silent.
    pub fn sweep_expired(&self, now: SystemTime) -> Vec<FileRecord> {
        let removed: Vec<FileRecord> = {
            let mut catalog = self.catalog.lock().unwrap();
            let mut removed = Vec::new();
            catalog.retain(|r| {
                if r.expires_at < now {
                    removed.push(r.clone());
                    false
                } else {
                    true
                }
            });
            removed
        };

        if !removed.is_empty() {
            debug!(count = removed.len(), "swept expired files");
            self.publish();
        }
        removed
    }

    /// Subscribe to catalog-changed notifications. Each message is a full
    /// redacted snapshot, so a lagged receiver can simply take the latest.
    pub fn subscribe(&self) -> broadcast::Receiver<Vec<CatalogEntry>> {
        self.changes.subscribe()
    }

    fn publish(&self) {
        // Send fails when nobody is listening, which is fine.
        let _ = self.changes.send(self.snapshot());
    }
}

/// Build a storage key from a random token and the sanitized upload name.
///
/// The key is the only string derived from user input that ever touches the
/// filesystem, so path separators, traversal dots, whitespace, and control
/// characters must not survive.
fn generate_storage_key(original_name: &str) -> String {
    format!("{}-{}", Uuid::new_v4().simple(), sanitize_name(original_name))
}

fn sanitize_name(name: &str) -> String {
    let mut cleaned: String = name
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '.' | '-' | '_'))
        .collect();
    // Collapse dot runs so the key never contains "..": the blob store
    // rejects anything that even looks like traversal, and names like
    // "a..b.txt" are otherwise valid input.
    while cleaned.contains("..") {
        cleaned = cleaned.replace("..", ".");
    }
    let cleaned = cleaned.trim_start_matches(['.', '-']).to_string();
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned
    }
}

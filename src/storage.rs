use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;

mod fs;
mod types;

pub use fs::FsStorage;
pub use types::{StagedBlob, StorageError};

/// A boxed stream of byte chunks for streaming reads
pub type ByteStream = Box<dyn Stream<Item = Result<Bytes, StorageError>> + Send + Unpin>;

/// Where uploaded bytes live, addressed by registry-generated storage key.
///
/// Keys are flat strings sanitized by the registry before they get here;
/// implementations still reject anything that smells like a path.
///
/// Writes are two-phase: `begin` hands out a staged blob the caller streams
/// into while the key is not yet known, `commit` binds the staged bytes to
/// a key. Each byte is written exactly once.
#[async_trait]
pub trait BlobStore: Send + Sync + 'static {
    /// Open a staging area for an incoming blob.
    async fn begin(&self) -> Result<StagedBlob, StorageError>;

    /// Make staged bytes visible under `key`.
    /// Returns the number of bytes committed. A staged blob that is never
    /// committed must leave nothing behind.
    async fn commit(&self, staged: StagedBlob, key: &str) -> Result<u64, StorageError>;

    /// Get blob data as a stream of chunks.
    async fn get(&self, key: &str) -> Result<ByteStream, StorageError>;

    /// Remove a blob. `NotFound` when there is nothing under the key.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Check if a blob exists.
    async fn exists(&self, key: &str) -> Result<bool, StorageError>;
}

use std::path::PathBuf;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::fs::{self, File};
use tokio::io::BufReader;
use tokio_util::io::ReaderStream;

use super::{BlobStore, ByteStream, StagedBlob, StorageError};

pub struct FsStorage {
    base_path: PathBuf,
}

impl FsStorage {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Initialize directory structure
    pub async fn init(&self) -> Result<(), StorageError> {
        fs::create_dir_all(self.base_path.join("blobs")).await?;
        Ok(())
    }

    fn blob_path(&self, key: &str) -> Result<PathBuf, StorageError> {
        // Keys come pre-sanitized from the registry; anything path-like
        // here means a caller bug, not user input.
        if key.is_empty()
            || key.contains(['/', '\\'])
            || key.contains("..")
            || key.chars().any(char::is_whitespace)
        {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.base_path.join("blobs").join(key))
    }
}

#[async_trait]
impl BlobStore for FsStorage {
    async fn begin(&self) -> Result<StagedBlob, StorageError> {
        // Stage in the blobs directory itself so commit is a same-device
        // rename. The tempfile cleans itself up on drop, so an aborted
        // transfer leaves no partial blob.
        let dir = self.base_path.join("blobs");
        let temp = tempfile::NamedTempFile::new_in(&dir)?;
        let file = File::create(temp.path()).await?;
        Ok(StagedBlob::new(temp, file))
    }

    async fn commit(&self, staged: StagedBlob, key: &str) -> Result<u64, StorageError> {
        let path = self.blob_path(key)?;
        let (temp, written) = staged.finish().await?;
        temp.persist(&path).map_err(|e| StorageError::Io(e.error))?;
        Ok(written)
    }

    async fn get(&self, key: &str) -> Result<ByteStream, StorageError> {
        let path = self.blob_path(key)?;

        let file = File::open(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound
            } else {
                StorageError::Io(e)
            }
        })?;

        // Buffered reader with a reasonable chunk size (64KB)
        let reader = BufReader::with_capacity(64 * 1024, file);
        let stream = ReaderStream::new(reader);

        let mapped = stream.map(|result| result.map_err(StorageError::Io));

        Ok(Box::new(mapped))
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.blob_path(key)?;
        fs::remove_file(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound
            } else {
                StorageError::Io(e)
            }
        })
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        let path = self.blob_path(key)?;
        Ok(fs::try_exists(&path).await.unwrap_or(false))
    }
}

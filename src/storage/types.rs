use std::io;

use tempfile::NamedTempFile;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Blob not found")]
    NotFound,

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),
}

/// An in-flight blob write.
///
/// Bytes land in a tempfile inside the store's own directory, so committing
/// is a rename rather than a second copy. Dropping a staged blob (abort,
/// oversized transfer, handler error) removes the tempfile and leaves the
/// store untouched.
pub struct StagedBlob {
    temp: NamedTempFile,
    file: File,
    written: u64,
}

impl StagedBlob {
    pub(crate) fn new(temp: NamedTempFile, file: File) -> Self {
        Self {
            temp,
            file,
            written: 0,
        }
    }

    /// Append a chunk as it arrives off the wire.
    pub async fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.file.write_all(chunk).await?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    /// Bytes written so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Flush and hand the tempfile back for persisting.
    pub(crate) async fn finish(self) -> io::Result<(NamedTempFile, u64)> {
        let StagedBlob {
            temp,
            mut file,
            written,
        } = self;
        file.flush().await?;
        drop(file);
        Ok((temp, written))
    }
}

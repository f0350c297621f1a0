//! Pindrop - PIN-gated file relay server.
//!
//! This crate provides a small HTTP server where files are uploaded with a
//! shared-secret PIN, held for a bounded lifetime, and downloadable or
//! deletable by anyone holding the PIN. Connected clients receive live
//! catalog updates over SSE.

pub mod api;
pub mod config;
pub mod keepalive;
pub mod registry;
pub mod storage;
pub mod sweep;

pub use api::{ApiError, ErrorResponse, router};
pub use config::Config;
pub use registry::{CatalogEntry, FileRecord, FileRegistry, RegistryError};
pub use storage::{BlobStore, ByteStream, FsStorage, StagedBlob, StorageError};

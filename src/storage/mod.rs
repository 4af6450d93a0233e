//! Storage module for S3-compatible backends
//!
//! Supports Cloudflare R2, MinIO, Backblaze B2, and AWS S3.

use std::path::Path;

use crate::error::StorageError;

#[cfg(test)]
mod memory;
mod s3_client;
mod types;

#[cfg(test)]
pub use memory::MemoryBlobStore;
pub use s3_client::S3Client;
pub use types::*;

/// Durable blob storage used for finished artifacts
#[async_trait::async_trait]
pub trait BlobStore: Send + Sync {
    /// Upload the file at `path` under `key`
    async fn put_file(&self, key: &str, path: &Path) -> Result<(), StorageError>;

    /// List every object whose key starts with `prefix`
    async fn list_prefix(&self, prefix: &str) -> Result<Vec<ObjectMetadata>, StorageError>;

    /// Delete a single object
    async fn delete(&self, key: &str) -> Result<(), StorageError>;
}

//! Chunk Store
//!
//! Temporary storage for uploaded chunks before assembly. Each session gets
//! one directory under the temp root; each chunk is a file named after its
//! starting byte offset.

use std::io::ErrorKind;
use std::path::PathBuf;

use crate::error::AppError;

use super::types::{parse_chunk_name, StoredChunk, UploadId, CHUNK_PREFIX};

/// Local filesystem chunk storage
#[derive(Debug, Clone)]
pub struct ChunkStore {
    base_path: PathBuf,
}

impl ChunkStore {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    pub fn session_dir(&self, id: UploadId) -> PathBuf {
        self.base_path.join(id.to_string())
    }

    fn chunk_path(&self, id: UploadId, offset: u64) -> PathBuf {
        self.session_dir(id).join(format!("{}{}", CHUNK_PREFIX, offset))
    }

    /// Store a chunk at `offset`, replacing any earlier chunk there
    pub async fn put(&self, id: UploadId, offset: u64, data: &[u8]) -> Result<(), AppError> {
        let path = self.chunk_path(id, offset);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(AppError::StorageWriteFailed)?;
        }

        tokio::fs::write(&path, data)
            .await
            .map_err(AppError::StorageWriteFailed)?;

        tracing::debug!(
            upload_id = %id,
            offset = offset,
            size = data.len(),
            "Stored chunk"
        );

        Ok(())
    }

    /// List a session's chunks in ascending offset order
    pub async fn list(&self, id: UploadId) -> Result<Vec<StoredChunk>, AppError> {
        let dir = self.session_dir(id);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(AppError::SessionNotFound(id.to_string()))
            }
            Err(e) => return Err(AppError::AssemblyFailed(e)),
        };

        let mut chunks = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(AppError::AssemblyFailed)? {
            let name = entry.file_name();
            let Some(offset) = name.to_str().and_then(parse_chunk_name) else {
                continue;
            };

            let metadata = entry.metadata().await.map_err(AppError::AssemblyFailed)?;
            if !metadata.is_file() {
                continue;
            }

            chunks.push(StoredChunk {
                offset,
                len: metadata.len(),
                path: entry.path(),
            });
        }

        // Numeric, not lexicographic: chunk-10 sorts after chunk-2
        chunks.sort_by_key(|c| c.offset);
        Ok(chunks)
    }

    /// Remove a session's directory and everything in it
    pub async fn remove_session_dir(&self, id: UploadId) -> Result<bool, AppError> {
        match tokio::fs::remove_dir_all(self.session_dir(id)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(AppError::StorageWriteFailed(e)),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_put_creates_session_dir_lazily() {
        let temp_dir = TempDir::new().unwrap();
        let store = ChunkStore::new(temp_dir.path().to_path_buf());
        let id = UploadId::new();

        assert!(!store.session_dir(id).exists());
        store.put(id, 0, b"AAAA").await.unwrap();
        assert!(store.session_dir(id).join("chunk-0").is_file());
    }

    #[tokio::test]
    async fn test_list_sorts_numerically() {
        let temp_dir = TempDir::new().unwrap();
        let store = ChunkStore::new(temp_dir.path().to_path_buf());
        let id = UploadId::new();

        store.put(id, 10, b"c").await.unwrap();
        store.put(id, 2, b"b").await.unwrap();
        store.put(id, 0, b"aa").await.unwrap();
        tokio::fs::write(store.session_dir(id).join("notes.txt"), b"x")
            .await
            .unwrap();

        let chunks = store.list(id).await.unwrap();
        let offsets: Vec<u64> = chunks.iter().map(|c| c.offset).collect();
        assert_eq!(offsets, vec![0, 2, 10]);
        assert_eq!(chunks[0].len, 2);
    }

    #[tokio::test]
    async fn test_put_overwrites_same_offset() {
        let temp_dir = TempDir::new().unwrap();
        let store = ChunkStore::new(temp_dir.path().to_path_buf());
        let id = UploadId::new();

        store.put(id, 0, b"first attempt").await.unwrap();
        store.put(id, 0, b"retry").await.unwrap();

        let chunks = store.list(id).await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(tokio::fs::read(&chunks[0].path).await.unwrap(), b"retry");
    }

    #[tokio::test]
    async fn test_list_missing_session() {
        let temp_dir = TempDir::new().unwrap();
        let store = ChunkStore::new(temp_dir.path().to_path_buf());

        let result = store.list(UploadId::new()).await;
        assert!(matches!(result, Err(AppError::SessionNotFound(_))));
    }

    #[tokio::test]
    async fn test_remove_session_dir() {
        let temp_dir = TempDir::new().unwrap();
        let store = ChunkStore::new(temp_dir.path().to_path_buf());
        let id = UploadId::new();

        store.put(id, 0, b"data").await.unwrap();
        assert!(store.remove_session_dir(id).await.unwrap());
        assert!(!store.remove_session_dir(id).await.unwrap());
    }
}

//! Session Assembler
//!
//! Concatenates a session's chunks, in ascending offset order, into the
//! final artifact. Chunks are streamed through a bounded write buffer so
//! memory stays flat no matter how large the file is.

use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};

use crate::error::AppError;

use super::chunk_store::ChunkStore;
use super::handoff::StorageHandoff;
use super::session::SessionRegistry;
use super::types::{
    artifact_url, sanitize_file_name, CompleteRequest, CompleteResponse, StoredChunk, UploadId,
};

/// Default write buffer in front of the artifact file: 1 MiB
pub const DEFAULT_WRITE_BUFFER: usize = 1024 * 1024;

#[derive(Clone)]
pub struct SessionAssembler {
    chunks: ChunkStore,
    registry: SessionRegistry,
    handoff: StorageHandoff,
    upload_dir: PathBuf,
    write_buffer: usize,
}

impl SessionAssembler {
    pub fn new(
        chunks: ChunkStore,
        registry: SessionRegistry,
        handoff: StorageHandoff,
        upload_dir: PathBuf,
    ) -> Self {
        Self {
            chunks,
            registry,
            handoff,
            upload_dir,
            write_buffer: DEFAULT_WRITE_BUFFER,
        }
    }

    pub fn with_write_buffer(mut self, bytes: usize) -> Self {
        self.write_buffer = bytes.max(1);
        self
    }

    /// Assemble a session and hand the artifact off to remote storage.
    ///
    /// Once this returns `Ok` the artifact is complete on local disk; the
    /// remote copy is made in the background.
    pub async fn complete(
        &self,
        request: CompleteRequest,
        owner: &str,
    ) -> Result<CompleteResponse, AppError> {
        let (Some(raw_id), Some(raw_name)) = (
            request.upload_id.filter(|s| !s.trim().is_empty()),
            request.file_name.filter(|s| !s.trim().is_empty()),
        ) else {
            return Err(AppError::MissingParameters(
                "Missing uploadId or fileName".to_string(),
            ));
        };

        let id: UploadId = raw_id
            .parse()
            .map_err(|_| AppError::SessionNotFound(raw_id.clone()))?;
        let file_name = sanitize_file_name(&raw_name)
            .ok_or_else(|| AppError::MissingParameters(format!("Invalid fileName: {}", raw_name)))?;

        let session = self.registry.begin_assembly(id).await?;

        let chunks = match self.checked_chunks(id, session.total_size).await {
            Ok(chunks) => chunks,
            Err(e) => {
                // Nothing consumed yet, the client may keep uploading
                self.registry.release(id).await;
                return Err(e);
            }
        };

        tracing::info!(
            upload_id = %id,
            file_name = %file_name,
            chunks = chunks.len(),
            "Assembling file from chunks"
        );

        let final_path = self.upload_dir.join(&file_name);
        let total_bytes = match self.write_artifact(id, &chunks, &final_path).await {
            Ok(total) => total,
            Err(e) => {
                tracing::error!(
                    upload_id = %id,
                    file_name = %file_name,
                    error = %e,
                    "Assembly failed"
                );
                self.registry.finish_assembly(id, None).await;
                return Err(AppError::AssemblyFailed(e));
            }
        };

        if let Err(e) = self.chunks.remove_session_dir(id).await {
            tracing::warn!(upload_id = %id, error = %e, "Failed to remove chunk directory");
        }

        self.registry
            .finish_assembly(id, Some(file_name.clone()))
            .await;

        tracing::info!(
            upload_id = %id,
            file_name = %file_name,
            size = total_bytes,
            "Upload assembled"
        );

        // Detached: the response does not wait for remote storage
        self.handoff
            .spawn(id, owner.to_string(), file_name.clone(), final_path);

        Ok(CompleteResponse {
            message: "Complete".to_string(),
            url: artifact_url(&file_name),
            file_name,
        })
    }

    async fn checked_chunks(
        &self,
        id: UploadId,
        total_size: Option<u64>,
    ) -> Result<Vec<StoredChunk>, AppError> {
        let chunks = self.chunks.list(id).await?;
        if chunks.is_empty() {
            return Err(AppError::NoChunksFound(id.to_string()));
        }

        if let Some(total) = total_size {
            verify_coverage(&chunks, total)?;
        }

        Ok(chunks)
    }

    /// Stream chunks into `<name>.<id>.part`, then rename over `final_path`.
    ///
    /// Each chunk is deleted as soon as it has been copied. A failure part way
    /// leaves the consumed chunks deleted.
    async fn write_artifact(
        &self,
        id: UploadId,
        chunks: &[StoredChunk],
        final_path: &Path,
    ) -> std::io::Result<u64> {
        let part_path = part_path(final_path, id);

        let result = self.stream_chunks(chunks, &part_path).await;
        match result {
            Ok(total) => {
                tokio::fs::rename(&part_path, final_path).await?;
                Ok(total)
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&part_path).await;
                Err(e)
            }
        }
    }

    async fn stream_chunks(&self, chunks: &[StoredChunk], part_path: &Path) -> std::io::Result<u64> {
        let file = File::create(part_path).await?;
        let mut writer = BufWriter::with_capacity(self.write_buffer, file);
        let mut total = 0u64;

        for chunk in chunks {
            let mut reader = File::open(&chunk.path).await?;
            // Suspends whenever the write buffer is full until it drains to disk
            total += tokio::io::copy(&mut reader, &mut writer).await?;
            drop(reader);
            tokio::fs::remove_file(&chunk.path).await?;
        }

        writer.flush().await?;
        writer.into_inner().sync_all().await?;
        Ok(total)
    }
}

fn part_path(final_path: &Path, id: UploadId) -> PathBuf {
    let name = final_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    final_path.with_file_name(format!("{}.{}.part", name, id))
}

/// Check that chunks tile `0..total` with no gaps or overlaps
pub fn verify_coverage(chunks: &[StoredChunk], total: u64) -> Result<(), AppError> {
    let mut expected = 0u64;
    for chunk in chunks {
        if chunk.offset != expected {
            return Err(AppError::IncompleteUpload(format!(
                "expected chunk at offset {}, found {}",
                expected, chunk.offset
            )));
        }
        expected = expected.saturating_add(chunk.len);
    }

    if expected != total {
        return Err(AppError::IncompleteUpload(format!(
            "received {} of {} bytes",
            expected, total
        )));
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HandoffConfig;
    use crate::storage::MemoryBlobStore;
    use crate::upload::types::{HandoffStatus, SessionStatus};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        upload_dir: PathBuf,
        chunks: ChunkStore,
        registry: SessionRegistry,
        store: MemoryBlobStore,
        assembler: SessionAssembler,
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let upload_dir = temp.path().to_path_buf();
        let chunks = ChunkStore::new(upload_dir.join("temp"));
        let registry = SessionRegistry::new();
        let store = MemoryBlobStore::new();
        let handoff = StorageHandoff::new(
            Some(Arc::new(store.clone())),
            registry.clone(),
            HandoffConfig {
                max_attempts: 1,
                initial_backoff: Duration::from_millis(1),
            },
        );
        let assembler =
            SessionAssembler::new(chunks.clone(), registry.clone(), handoff, upload_dir.clone());

        Fixture {
            _temp: temp,
            upload_dir,
            chunks,
            registry,
            store,
            assembler,
        }
    }

    fn request(id: UploadId, name: &str) -> CompleteRequest {
        CompleteRequest {
            upload_id: Some(id.to_string()),
            file_name: Some(name.to_string()),
        }
    }

    async fn wait_for_handoff(registry: &SessionRegistry, id: UploadId) -> HandoffStatus {
        for _ in 0..200 {
            let status = registry.get(id).await.unwrap().handoff;
            if matches!(status, HandoffStatus::Stored { .. } | HandoffStatus::Failed { .. }) {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("handoff did not finish");
    }

    #[tokio::test]
    async fn test_two_chunk_upload() {
        let f = fixture();
        let session = f.registry.create(None).await;
        f.chunks.put(session.id, 0, b"AAAA").await.unwrap();
        f.chunks.put(session.id, 4, b"BBBB").await.unwrap();

        let response = f
            .assembler
            .complete(request(session.id, "x.txt"), "alice")
            .await
            .unwrap();

        assert_eq!(response.message, "Complete");
        assert_eq!(response.url, "/files/x.txt");
        assert_eq!(response.file_name, "x.txt");
        assert!(!f.chunks.session_dir(session.id).exists());

        let status = wait_for_handoff(&f.registry, session.id).await;
        assert_eq!(status, HandoffStatus::Stored { key: "alice/x.txt".to_string() });
        assert_eq!(f.store.get("alice/x.txt"), Some(b"AAAABBBB".to_vec()));
        assert!(!f.upload_dir.join("x.txt").exists());
    }

    #[tokio::test]
    async fn test_order_is_by_offset_not_arrival() {
        let f = fixture();
        let forward = f.registry.create(None).await;
        let reverse = f.registry.create(None).await;
        let parts: [(u64, &[u8]); 3] = [(0, b"one-"), (4, b"two-"), (8, b"three")];

        for (offset, data) in parts {
            f.chunks.put(forward.id, offset, data).await.unwrap();
        }
        for (offset, data) in parts.iter().rev() {
            f.chunks.put(reverse.id, *offset, data).await.unwrap();
        }

        f.assembler.complete(request(forward.id, "f.txt"), "u").await.unwrap();
        f.assembler.complete(request(reverse.id, "r.txt"), "u").await.unwrap();
        wait_for_handoff(&f.registry, forward.id).await;
        wait_for_handoff(&f.registry, reverse.id).await;

        assert_eq!(f.store.get("u/f.txt"), Some(b"one-two-three".to_vec()));
        assert_eq!(f.store.get("u/f.txt"), f.store.get("u/r.txt"));
    }

    #[tokio::test]
    async fn test_numeric_offsets_with_small_write_buffer() {
        let f = fixture();
        let assembler = f.assembler.clone().with_write_buffer(3);
        let session = f.registry.create(None).await;

        let source: Vec<u8> = (0..=255u8).cycle().take(50_000).collect();
        let mut offset = 0usize;
        let mut pieces = Vec::new();
        for size in [1usize, 9, 90, 900, 9000].iter().cycle() {
            if offset >= source.len() {
                break;
            }
            let end = (offset + size).min(source.len());
            pieces.push((offset as u64, source[offset..end].to_vec()));
            offset = end;
        }
        for (offset, data) in pieces.iter().rev() {
            f.chunks.put(session.id, *offset, data).await.unwrap();
        }

        assembler.complete(request(session.id, "big.bin"), "u").await.unwrap();
        wait_for_handoff(&f.registry, session.id).await;
        assert_eq!(f.store.get("u/big.bin"), Some(source));
    }

    #[tokio::test]
    async fn test_retried_chunk_uses_latest_write() {
        let f = fixture();
        let session = f.registry.create(None).await;
        f.chunks.put(session.id, 0, b"XXXX").await.unwrap();
        f.chunks.put(session.id, 4, b"BBBB").await.unwrap();
        f.chunks.put(session.id, 0, b"AAAA").await.unwrap();

        f.assembler.complete(request(session.id, "x.txt"), "u").await.unwrap();
        wait_for_handoff(&f.registry, session.id).await;
        assert_eq!(f.store.get("u/x.txt"), Some(b"AAAABBBB".to_vec()));
    }

    #[tokio::test]
    async fn test_missing_parameters() {
        let f = fixture();
        let result = f
            .assembler
            .complete(
                CompleteRequest {
                    upload_id: Some(UploadId::new().to_string()),
                    file_name: None,
                },
                "u",
            )
            .await;
        assert!(matches!(result, Err(AppError::MissingParameters(_))));

        let result = f.assembler.complete(CompleteRequest::default(), "u").await;
        assert!(matches!(result, Err(AppError::MissingParameters(_))));
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let f = fixture();
        let result = f.assembler.complete(request(UploadId::new(), "x.txt"), "u").await;
        assert!(matches!(result, Err(AppError::SessionNotFound(_))));

        let result = f
            .assembler
            .complete(
                CompleteRequest {
                    upload_id: Some("not-a-session".to_string()),
                    file_name: Some("x.txt".to_string()),
                },
                "u",
            )
            .await;
        assert!(matches!(result, Err(AppError::SessionNotFound(_))));
    }

    #[tokio::test]
    async fn test_no_chunks_found_leaves_session_open() {
        let f = fixture();
        let session = f.registry.create(None).await;
        tokio::fs::create_dir_all(f.chunks.session_dir(session.id))
            .await
            .unwrap();

        let result = f.assembler.complete(request(session.id, "x.txt"), "u").await;
        assert!(matches!(result, Err(AppError::NoChunksFound(_))));
        assert!(f.chunks.session_dir(session.id).exists());
        assert!(!f.upload_dir.join("x.txt").exists());
        assert_eq!(
            f.registry.get(session.id).await.unwrap().status,
            SessionStatus::Open
        );
    }

    #[tokio::test]
    async fn test_declared_size_gap_is_rejected() {
        let f = fixture();
        let session = f.registry.create(Some(12)).await;
        f.chunks.put(session.id, 0, b"AAAA").await.unwrap();
        f.chunks.put(session.id, 8, b"CCCC").await.unwrap();

        let result = f.assembler.complete(request(session.id, "x.txt"), "u").await;
        assert!(matches!(result, Err(AppError::IncompleteUpload(_))));
        assert_eq!(f.chunks.list(session.id).await.unwrap().len(), 2);

        // Filling the gap makes the same session complete
        f.chunks.put(session.id, 4, b"BBBB").await.unwrap();
        f.assembler.complete(request(session.id, "x.txt"), "u").await.unwrap();
        wait_for_handoff(&f.registry, session.id).await;
        assert_eq!(f.store.get("u/x.txt"), Some(b"AAAABBBBCCCC".to_vec()));
    }

    #[tokio::test]
    async fn test_traversal_is_stripped() {
        let f = fixture();
        let session = f.registry.create(None).await;
        f.chunks.put(session.id, 0, b"data").await.unwrap();

        let response = f
            .assembler
            .complete(request(session.id, "../../escape.txt"), "u")
            .await
            .unwrap();
        assert_eq!(response.file_name, "escape.txt");
        wait_for_handoff(&f.registry, session.id).await;
        assert!(f.store.get("u/escape.txt").is_some());
    }

    #[tokio::test]
    async fn test_second_completion_is_rejected() {
        let f = fixture();
        let session = f.registry.create(None).await;
        f.chunks.put(session.id, 0, b"data").await.unwrap();

        f.assembler.complete(request(session.id, "x.txt"), "u").await.unwrap();
        let again = f.assembler.complete(request(session.id, "x.txt"), "u").await;
        assert!(matches!(again, Err(AppError::SessionNotFound(_))));
    }

    #[tokio::test]
    async fn test_write_failure_marks_session_failed() {
        let f = fixture();
        let session = f.registry.create(None).await;
        f.chunks.put(session.id, 0, b"data").await.unwrap();

        let handoff = StorageHandoff::new(
            Some(Arc::new(MemoryBlobStore::new())),
            f.registry.clone(),
            HandoffConfig::default(),
        );
        let broken = SessionAssembler::new(
            f.chunks.clone(),
            f.registry.clone(),
            handoff,
            f.upload_dir.join("missing-dir"),
        );

        let result = broken.complete(request(session.id, "x.txt"), "u").await;
        assert!(matches!(result, Err(AppError::AssemblyFailed(_))));
        assert_eq!(
            f.registry.get(session.id).await.unwrap().status,
            SessionStatus::Failed
        );
    }

    #[test]
    fn test_verify_coverage() {
        let chunk = |offset, len| StoredChunk {
            offset,
            len,
            path: PathBuf::new(),
        };

        assert!(verify_coverage(&[chunk(0, 4), chunk(4, 4)], 8).is_ok());
        assert!(verify_coverage(&[chunk(0, 4), chunk(6, 2)], 8).is_err());
        assert!(verify_coverage(&[chunk(0, 4), chunk(2, 6)], 8).is_err());
        assert!(verify_coverage(&[chunk(0, 4)], 8).is_err());
        assert!(verify_coverage(&[chunk(1, 7)], 8).is_err());
    }
}

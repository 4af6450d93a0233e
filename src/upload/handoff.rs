//! Storage Handoff
//!
//! Moves finished artifacts into remote blob storage and exposes the
//! owner-scoped listing and deletion over it.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::HandoffConfig;
use crate::error::StorageError;
use crate::storage::{object_key, owner_prefix, BlobStore};

use super::session::SessionRegistry;
use super::types::{artifact_url, HandoffStatus, UploadId};

/// A remote object as shown to its owner
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteObject {
    pub key: String,
    /// Key with the owner prefix stripped
    pub file_name: String,
    pub size: i64,
    pub last_modified: Option<DateTime<Utc>>,
    pub url: String,
}

/// Hands artifacts to the blob store.
///
/// Without a store, artifacts stay in the upload directory and the remote
/// listing is empty.
#[derive(Clone)]
pub struct StorageHandoff {
    store: Option<Arc<dyn BlobStore>>,
    registry: SessionRegistry,
    config: HandoffConfig,
}

impl StorageHandoff {
    pub fn new(
        store: Option<Arc<dyn BlobStore>>,
        registry: SessionRegistry,
        config: HandoffConfig,
    ) -> Self {
        Self {
            store,
            registry,
            config,
        }
    }

    /// Start the upload in the background.
    ///
    /// The task is detached from the request: dropping the handle does not
    /// cancel it.
    pub fn spawn(
        &self,
        id: UploadId,
        owner: String,
        file_name: String,
        path: PathBuf,
    ) -> tokio::task::JoinHandle<HandoffStatus> {
        let handoff = self.clone();
        tokio::spawn(async move { handoff.transfer(id, &owner, &file_name, path).await })
    }

    /// Upload with bounded retries, then delete the local copy.
    ///
    /// On final failure the local artifact, if still present, keeps serving reads.
    pub async fn transfer(
        &self,
        id: UploadId,
        owner: &str,
        file_name: &str,
        path: PathBuf,
    ) -> HandoffStatus {
        let Some(store) = &self.store else {
            tracing::debug!(
                upload_id = %id,
                file_name = %file_name,
                "No remote store, keeping local artifact"
            );
            self.registry.set_handoff(id, HandoffStatus::Local).await;
            return HandoffStatus::Local;
        };

        let key = object_key(owner, file_name);
        let mut backoff = self.config.initial_backoff;
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;

        let status = loop {
            self.registry
                .set_handoff(id, HandoffStatus::Pending { attempts: attempt })
                .await;

            match store.put_file(&key, &path).await {
                Ok(()) => break HandoffStatus::Stored { key: key.clone() },
                Err(e) if attempt < max_attempts => {
                    tracing::warn!(
                        upload_id = %id,
                        key = %key,
                        attempt = attempt,
                        error = %e,
                        "Remote upload failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = backoff.saturating_mul(2);
                    attempt += 1;
                }
                Err(e) => {
                    // Another session finishing under the same name may have
                    // handed off and removed the shared local path.
                    let local_kept = tokio::fs::try_exists(&path).await.unwrap_or(false);
                    tracing::error!(
                        upload_id = %id,
                        key = %key,
                        attempts = attempt,
                        local_kept = local_kept,
                        error = %e,
                        "Remote upload failed"
                    );
                    break HandoffStatus::Failed {
                        error: e.to_string(),
                        local_kept,
                    };
                }
            }
        };

        if let HandoffStatus::Stored { .. } = status {
            tracing::info!(upload_id = %id, key = %key, "Uploaded artifact");
            match tokio::fs::remove_file(&path).await {
                Ok(()) => tracing::info!(file_name = %file_name, "Deleted local file"),
                Err(e) => tracing::warn!(
                    file_name = %file_name,
                    error = %e,
                    "Failed to delete local file after upload"
                ),
            }
        }

        self.registry.set_handoff(id, status.clone()).await;
        status
    }

    /// List an owner's remote objects
    pub async fn list(&self, owner: &str) -> Result<Vec<RemoteObject>, StorageError> {
        let Some(store) = &self.store else {
            return Ok(Vec::new());
        };
        let prefix = owner_prefix(owner);
        let objects = store.list_prefix(&prefix).await?;

        Ok(objects
            .into_iter()
            .map(|obj| {
                let file_name = obj
                    .key
                    .strip_prefix(&prefix)
                    .unwrap_or(&obj.key)
                    .to_string();
                RemoteObject {
                    url: artifact_url(&file_name),
                    key: obj.key,
                    file_name,
                    size: obj.size,
                    last_modified: obj.last_modified,
                }
            })
            .collect())
    }

    /// Delete one of an owner's remote objects
    pub async fn delete(&self, owner: &str, file_name: &str) -> Result<(), StorageError> {
        let key = object_key(owner, file_name);
        let Some(store) = &self.store else {
            return Err(StorageError::ObjectNotFound(key));
        };
        store.delete(&key).await?;
        tracing::info!(key = %key, "Deleted remote object");
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

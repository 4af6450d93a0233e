//! In-process blob store

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::error::StorageError;

use super::types::ObjectMetadata;
use super::BlobStore;

#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    last_modified: DateTime<Utc>,
}

/// Blob store that keeps objects in memory, for tests
#[derive(Clone, Default)]
pub struct MemoryBlobStore {
    objects: Arc<RwLock<BTreeMap<String, StoredObject>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes stored under `key`, if any
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.read().get(key).map(|obj| obj.data.clone())
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
}

#[async_trait::async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put_file(&self, key: &str, path: &Path) -> Result<(), StorageError> {
        let data = tokio::fs::read(path)
            .await
            .map_err(|e| StorageError::LocalRead {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;

        self.objects.write().insert(
            key.to_string(),
            StoredObject {
                data,
                last_modified: Utc::now(),
            },
        );
        Ok(())
    }

    async fn list_prefix(&self, prefix: &str) -> Result<Vec<ObjectMetadata>, StorageError> {
        let objects = self.objects.read();
        Ok(objects
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, obj)| ObjectMetadata {
                key: key.clone(),
                size: obj.data.len() as i64,
                last_modified: Some(obj.last_modified),
            })
            .collect())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        // Deleting a missing key succeeds, matching S3
        self.objects.write().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_put_list_delete() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("a.txt");
        tokio::fs::write(&path, b"hello").await.unwrap();

        let store = MemoryBlobStore::new();
        store.put_file("alice/a.txt", &path).await.unwrap();
        store.put_file("alice/b.txt", &path).await.unwrap();
        store.put_file("alicex/c.txt", &path).await.unwrap();

        let listed = store.list_prefix("alice/").await.unwrap();
        let keys: Vec<_> = listed.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["alice/a.txt", "alice/b.txt"]);
        assert_eq!(listed[0].size, 5);

        store.delete("alice/a.txt").await.unwrap();
        let listed = store.list_prefix("alice/").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(store.get("alice/b.txt"), Some(b"hello".to_vec()));
    }

    #[tokio::test]
    async fn test_put_missing_file() {
        let store = MemoryBlobStore::new();
        let result = store.put_file("k", Path::new("/nonexistent/file")).await;
        assert!(matches!(result, Err(StorageError::LocalRead { .. })));
        assert!(store.is_empty());
    }
}

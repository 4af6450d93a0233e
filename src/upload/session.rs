//! Upload Session Registry
//!
//! Owns the set of issued upload sessions:
//! - In-memory session storage with lock protection
//! - Atomic `Open -> Assembling` transition guarding completion
//! - Expiry sweep for abandoned sessions

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::RwLock;

use crate::error::AppError;

use super::types::{HandoffStatus, SessionStatus, UploadId, UploadSession};

// ============================================================================
// Session Registry
// ============================================================================

/// Registry of upload sessions
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<UploadId, UploadSession>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Session Lifecycle
    // ========================================================================

    /// Issue a new session. Nothing touches the filesystem until the first chunk.
    pub async fn create(&self, total_size: Option<u64>) -> UploadSession {
        let session = UploadSession::new(total_size);

        self.sessions
            .write()
            .await
            .insert(session.id, session.clone());

        tracing::info!(
            upload_id = %session.id,
            total_size = ?total_size,
            "Created upload session"
        );

        session
    }

    /// Get a session by id
    pub async fn get(&self, id: UploadId) -> Result<UploadSession, AppError> {
        self.sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::SessionNotFound(id.to_string()))
    }

    /// Check that a session may still receive chunks
    pub async fn require_open(&self, id: UploadId) -> Result<UploadSession, AppError> {
        let session = self.get(id).await?;
        match session.status {
            SessionStatus::Open => Ok(session),
            SessionStatus::Assembling => Err(AppError::SessionBusy(id.to_string())),
            SessionStatus::Done | SessionStatus::Failed => {
                Err(AppError::SessionNotFound(id.to_string()))
            }
        }
    }

    /// Claim a session for assembly.
    ///
    /// Only one caller can move a session out of `Open`; later callers get
    /// `SessionBusy` (while assembling) or `SessionNotFound` (once finished).
    pub async fn begin_assembly(&self, id: UploadId) -> Result<UploadSession, AppError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(&id)
            .ok_or_else(|| AppError::SessionNotFound(id.to_string()))?;

        match session.status {
            SessionStatus::Open => {
                session.status = SessionStatus::Assembling;
                Ok(session.clone())
            }
            SessionStatus::Assembling => Err(AppError::SessionBusy(id.to_string())),
            SessionStatus::Done | SessionStatus::Failed => {
                Err(AppError::SessionNotFound(id.to_string()))
            }
        }
    }

    /// Return a claimed session to `Open` (assembly rejected before touching chunks)
    pub async fn release(&self, id: UploadId) {
        self.set_status(id, SessionStatus::Open, SessionStatus::Assembling)
            .await;
    }

    /// Mark assembly finished
    pub async fn finish_assembly(&self, id: UploadId, file_name: Option<String>) {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get_mut(&id) {
            session.status = if file_name.is_some() {
                SessionStatus::Done
            } else {
                SessionStatus::Failed
            };
            session.file_name = file_name;
        }
    }

    /// Record the remote handoff state of a finished session
    pub async fn set_handoff(&self, id: UploadId, handoff: HandoffStatus) {
        if let Some(session) = self.sessions.write().await.get_mut(&id) {
            session.handoff = handoff;
        }
    }

    async fn set_status(&self, id: UploadId, to: SessionStatus, from: SessionStatus) {
        if let Some(session) = self.sessions.write().await.get_mut(&id) {
            if session.status == from {
                session.status = to;
            }
        }
    }

    // ========================================================================
    // Query Methods
    // ========================================================================

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn open_session_count(&self) -> usize {
        self.sessions
            .read()
            .await
            .values()
            .filter(|s| s.status == SessionStatus::Open)
            .count()
    }

    // ========================================================================
    // Cleanup
    // ========================================================================

    /// Drop sessions older than `ttl`, skipping any mid-assembly.
    ///
    /// Returns the removed ids so their chunk directories can be reclaimed.
    pub async fn sweep_expired(&self, ttl: Duration) -> Vec<UploadId> {
        // A TTL too large to represent never expires anything
        let Some(cutoff) = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| Utc::now().checked_sub_signed(ttl))
        else {
            return Vec::new();
        };

        let mut sessions = self.sessions.write().await;
        let expired: Vec<UploadId> = sessions
            .values()
            .filter(|s| s.status != SessionStatus::Assembling && s.is_older_than(cutoff))
            .map(|s| s.id)
            .collect();

        for id in &expired {
            sessions.remove(id);
        }

        if !expired.is_empty() {
            tracing::info!(count = expired.len(), "Expired upload sessions");
        }

        expired
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_session() {
        let registry = SessionRegistry::new();
        let session = registry.create(Some(8)).await;

        assert_eq!(session.status, SessionStatus::Open);
        assert_eq!(session.total_size, Some(8));
        assert_eq!(session.handoff, HandoffStatus::NotStarted);
        assert_eq!(registry.get(session.id).await.unwrap().id, session.id);
    }

    #[tokio::test]
    async fn test_unique_ids() {
        let registry = SessionRegistry::new();
        let a = registry.create(None).await;
        let b = registry.create(None).await;
        assert_ne!(a.id, b.id);
        assert_eq!(registry.session_count().await, 2);
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let registry = SessionRegistry::new();
        let result = registry.require_open(UploadId::new()).await;
        assert!(matches!(result, Err(AppError::SessionNotFound(_))));
    }

    #[tokio::test]
    async fn test_assembly_is_exclusive() {
        let registry = SessionRegistry::new();
        let session = registry.create(None).await;

        registry.begin_assembly(session.id).await.unwrap();
        assert!(matches!(
            registry.begin_assembly(session.id).await,
            Err(AppError::SessionBusy(_))
        ));
        assert!(matches!(
            registry.require_open(session.id).await,
            Err(AppError::SessionBusy(_))
        ));

        registry
            .finish_assembly(session.id, Some("x.txt".to_string()))
            .await;
        let done = registry.get(session.id).await.unwrap();
        assert_eq!(done.status, SessionStatus::Done);
        assert_eq!(done.file_name.as_deref(), Some("x.txt"));
        assert!(matches!(
            registry.begin_assembly(session.id).await,
            Err(AppError::SessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_release_reopens() {
        let registry = SessionRegistry::new();
        let session = registry.create(None).await;

        registry.begin_assembly(session.id).await.unwrap();
        registry.release(session.id).await;
        assert_eq!(registry.open_session_count().await, 1);
        registry.require_open(session.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_assembly() {
        let registry = SessionRegistry::new();
        let session = registry.create(None).await;

        registry.begin_assembly(session.id).await.unwrap();
        registry.finish_assembly(session.id, None).await;
        assert_eq!(
            registry.get(session.id).await.unwrap().status,
            SessionStatus::Failed
        );
    }

    #[tokio::test]
    async fn test_sweep_expired() {
        let registry = SessionRegistry::new();
        let old = registry.create(None).await;
        let busy = registry.create(None).await;
        registry.begin_assembly(busy.id).await.unwrap();

        // Zero TTL expires everything not mid-assembly
        tokio::time::sleep(Duration::from_millis(5)).await;
        let expired = registry.sweep_expired(Duration::ZERO).await;
        assert_eq!(expired, vec![old.id]);
        assert!(registry.get(old.id).await.is_err());
        assert!(registry.get(busy.id).await.is_ok());

        let kept = registry.sweep_expired(Duration::from_secs(3600)).await;
        assert!(kept.is_empty());
    }
}

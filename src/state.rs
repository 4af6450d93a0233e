//! Application state management

use std::sync::Arc;

use crate::auth::{IdentityVerifier, StaticTokenVerifier};
use crate::config::Config;
use crate::range::RangeReader;
use crate::storage::BlobStore;
use crate::upload::{ChunkStore, SessionAssembler, SessionRegistry, StorageHandoff};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    sessions: SessionRegistry,
    chunk_store: ChunkStore,
    assembler: SessionAssembler,
    handoff: StorageHandoff,
    range_reader: RangeReader,
    verifier: Arc<dyn IdentityVerifier>,
}

impl AppState {
    /// Create the application state, creating the upload and temp roots.
    ///
    /// With no blob store, finished artifacts are served from the upload root only.
    pub async fn new(
        config: Config,
        blob_store: Option<Arc<dyn BlobStore>>,
    ) -> std::io::Result<Self> {
        let verifier = Arc::new(StaticTokenVerifier::new(config.auth.tokens.clone()));
        Self::with_verifier(config, blob_store, verifier).await
    }

    pub async fn with_verifier(
        config: Config,
        blob_store: Option<Arc<dyn BlobStore>>,
        verifier: Arc<dyn IdentityVerifier>,
    ) -> std::io::Result<Self> {
        tokio::fs::create_dir_all(&config.upload.upload_dir).await?;
        tokio::fs::create_dir_all(&config.upload.temp_dir).await?;

        let sessions = SessionRegistry::new();
        let chunk_store = ChunkStore::new(config.upload.temp_dir.clone());
        let handoff = StorageHandoff::new(blob_store, sessions.clone(), config.handoff.clone());
        let assembler = SessionAssembler::new(
            chunk_store.clone(),
            sessions.clone(),
            handoff.clone(),
            config.upload.upload_dir.clone(),
        );
        let range_reader = RangeReader::new(config.upload.upload_dir.clone());

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                sessions,
                chunk_store,
                assembler,
                handoff,
                range_reader,
                verifier,
            }),
        })
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.inner.sessions
    }

    pub fn chunk_store(&self) -> &ChunkStore {
        &self.inner.chunk_store
    }

    pub fn assembler(&self) -> &SessionAssembler {
        &self.inner.assembler
    }

    pub fn handoff(&self) -> &StorageHandoff {
        &self.inner.handoff
    }

    pub fn range_reader(&self) -> &RangeReader {
        &self.inner.range_reader
    }

    pub fn verifier(&self) -> &dyn IdentityVerifier {
        self.inner.verifier.as_ref()
    }

    /// Periodically expire abandoned sessions and reclaim their chunks
    pub fn start_session_sweeper(&self) -> tokio::task::JoinHandle<()> {
        let state = self.clone();
        tokio::spawn(async move {
            let upload = &state.config().upload;
            let mut interval = tokio::time::interval(upload.sweep_interval);

            loop {
                interval.tick().await;
                for id in state.sessions().sweep_expired(upload.session_ttl).await {
                    match state.chunk_store().remove_session_dir(id).await {
                        Ok(true) => tracing::debug!(upload_id = %id, "Removed expired chunks"),
                        Ok(false) => {}
                        Err(e) => tracing::warn!(
                            upload_id = %id,
                            error = %e,
                            "Failed to remove expired chunks"
                        ),
                    }
                }
            }
        })
    }
}

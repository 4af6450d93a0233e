//! Route modules for Vanish Server

use axum::Router;

use crate::state::AppState;

pub mod files;
pub mod health;
pub mod upload;

/// Build the full application router
pub fn router(state: AppState) -> Router {
    let max_chunk_bytes = state.config().upload.max_chunk_bytes;

    Router::new()
        .nest("/health", health::router())
        .nest("/files", files::router())
        .nest("/upload", upload::router(max_chunk_bytes))
        .with_state(state)
}

//! File routes
//!
//! Serves assembled artifacts with byte-range support, and lists or deletes
//! the caller's objects in remote storage.
//!
//! Endpoints:
//! - GET /files - List the caller's remote objects
//! - GET /files/:filename - Read a local artifact, honoring `Range`
//! - DELETE /files/:filename - Delete one of the caller's remote objects

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap},
    response::Response,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tokio_util::io::ReaderStream;

use crate::auth::Principal;
use crate::error::{AppError, Result};
use crate::state::AppState;
use crate::upload::{sanitize_file_name, RemoteObject};

/// Create the files router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_files))
        .route("/:filename", get(serve_file).delete(delete_file))
}

/// GET /files/:filename
async fn serve_file(
    State(state): State<AppState>,
    Path(filename): Path<String>,
    headers: HeaderMap,
) -> Result<Response> {
    let range = headers.get(header::RANGE).and_then(|v| v.to_str().ok());
    let served = state.range_reader().open(&filename, range).await?;

    let mut builder = Response::builder()
        .status(served.status)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CONTENT_LENGTH, served.content_length())
        .header(header::ACCEPT_RANGES, "bytes");

    if let Some(content_range) = served.content_range() {
        builder = builder.header(header::CONTENT_RANGE, content_range);
    }

    let body = Body::from_stream(ReaderStream::new(served.reader));

    builder
        .body(body)
        .map_err(|e| AppError::Internal(e.to_string()))
}

#[derive(Serialize)]
struct FileListResponse {
    files: Vec<RemoteObject>,
}

/// GET /files
async fn list_files(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<Json<FileListResponse>> {
    let files = state.handoff().list(&principal.user_id).await?;
    Ok(Json(FileListResponse { files }))
}

#[derive(Serialize)]
struct MessageResponse {
    message: &'static str,
}

/// DELETE /files/:filename
///
/// Only bare file names are accepted, so the key stays under the caller's prefix.
async fn delete_file(
    State(state): State<AppState>,
    principal: Principal,
    Path(filename): Path<String>,
) -> Result<Json<MessageResponse>> {
    if sanitize_file_name(&filename).as_deref() != Some(filename.as_str()) {
        return Err(AppError::InvalidFileName(filename));
    }

    state.handoff().delete(&principal.user_id, &filename).await?;
    Ok(Json(MessageResponse {
        message: "File deleted successfully",
    }))
}

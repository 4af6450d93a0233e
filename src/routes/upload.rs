//! Upload Routes
//!
//! HTTP endpoints for the chunked upload protocol.
//!
//! Endpoints:
//! - POST /upload/init - Open a session
//! - POST /upload/chunk - Store one chunk (`x-upload-id`, `Content-Range: bytes <start>-`)
//! - POST /upload/complete - Assemble the session into a file
//! - GET /upload/:upload_id - Session and remote handoff status

use axum::{
    body::Bytes,
    extract::{
        rejection::{BytesRejection, JsonRejection},
        DefaultBodyLimit, Path, State,
    },
    http::{header, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};

use crate::auth::Principal;
use crate::error::{AppError, Result};
use crate::state::AppState;
use crate::upload::{
    parse_content_range_start, CompleteRequest, CompleteResponse, InitRequest, InitResponse,
    SessionStatusResponse, UploadId, UPLOAD_ID_HEADER,
};

/// Create the upload router
pub fn router(max_chunk_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/init", post(init))
        .route(
            "/chunk",
            post(upload_chunk).layer(DefaultBodyLimit::max(max_chunk_bytes)),
        )
        .route("/complete", post(complete))
        .route("/:upload_id", get(session_status))
}

/// POST /upload/init
///
/// The body is optional; `{"totalSize": n}` enables a coverage check at completion.
async fn init(
    State(state): State<AppState>,
    body: Option<Json<InitRequest>>,
) -> Json<InitResponse> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let session = state.sessions().create(request.total_size).await;

    Json(InitResponse {
        upload_id: session.id,
    })
}

/// POST /upload/chunk
///
/// The chunk is the raw request body.
async fn upload_chunk(
    State(state): State<AppState>,
    principal: Principal,
    headers: HeaderMap,
    body: std::result::Result<Bytes, BytesRejection>,
) -> Result<StatusCode> {
    let upload_id = headers
        .get(UPLOAD_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::InvalidHeaders("Invalid headers".to_string()))?;
    let offset = headers
        .get(header::CONTENT_RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_content_range_start)
        .ok_or_else(|| AppError::InvalidHeaders("Invalid headers".to_string()))?;
    let id: UploadId = upload_id.parse()?;

    let max = state.config().upload.max_chunk_bytes;
    let body = body.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            AppError::PayloadTooLarge { max }
        } else {
            AppError::InvalidHeaders(rejection.body_text())
        }
    })?;
    if body.len() > max {
        return Err(AppError::PayloadTooLarge { max });
    }

    state.sessions().require_open(id).await?;
    state.chunk_store().put(id, offset, &body).await?;

    tracing::debug!(
        upload_id = %id,
        user_id = %principal.user_id,
        offset = offset,
        size = body.len(),
        "Chunk uploaded"
    );

    Ok(StatusCode::OK)
}

/// POST /upload/complete
///
/// Assemble chunks and store the final file.
async fn complete(
    State(state): State<AppState>,
    principal: Principal,
    body: std::result::Result<Json<CompleteRequest>, JsonRejection>,
) -> Result<Json<CompleteResponse>> {
    let Json(request) = body.map_err(|rejection| {
        AppError::MissingParameters(format!("Missing uploadId or fileName: {}", rejection.body_text()))
    })?;

    let response = state
        .assembler()
        .complete(request, &principal.user_id)
        .await?;

    Ok(Json(response))
}

/// GET /upload/:upload_id
async fn session_status(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
) -> Result<Json<SessionStatusResponse>> {
    let id: UploadId = upload_id
        .parse()
        .map_err(|_| AppError::SessionNotFound(upload_id.clone()))?;
    let session = state.sessions().get(id).await?;

    Ok(Json(session.into()))
}

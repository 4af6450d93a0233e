//! Error types for the Vanish server

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Application-wide result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Unauthorized: {0}")]
    Unauthenticated(#[from] AuthError),

    #[error("Invalid headers: {0}")]
    InvalidHeaders(String),

    #[error("Missing parameters: {0}")]
    MissingParameters(String),

    #[error("Invalid file name: {0}")]
    InvalidFileName(String),

    #[error("Chunk too large (max: {max} bytes)")]
    PayloadTooLarge { max: usize },

    #[error("Upload not found: {0}")]
    SessionNotFound(String),

    #[error("Upload already being assembled: {0}")]
    SessionBusy(String),

    #[error("No chunks found for upload {0}")]
    NoChunksFound(String),

    #[error("Upload incomplete: {0}")]
    IncompleteUpload(String),

    #[error("Failed to store chunk: {0}")]
    StorageWriteFailed(#[source] std::io::Error),

    #[error("Failed to assemble upload: {0}")]
    AssemblyFailed(#[source] std::io::Error),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Range not satisfiable for {size}-byte file")]
    RangeNotSatisfiable { size: u64 },

    #[error("Error serving file: {0}")]
    ServeFailed(#[source] std::io::Error),

    #[error("Remote storage error: {0}")]
    Remote(#[from] StorageError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Blob storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("S3 connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    #[error("Failed to read local file {path}: {message}")]
    LocalRead { path: String, message: String },

    #[error("S3 SDK error: {0}")]
    SdkError(String),
}

/// Identity verification errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("No token provided")]
    MissingToken,

    #[error("Empty token")]
    EmptyToken,

    #[error("Invalid or expired token")]
    InvalidToken,
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            AppError::InvalidHeaders(_)
            | AppError::MissingParameters(_)
            | AppError::InvalidFileName(_)
            | AppError::SessionNotFound(_)
            | AppError::NoChunksFound(_)
            | AppError::IncompleteUpload(_) => StatusCode::BAD_REQUEST,
            AppError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::SessionBusy(_) => StatusCode::CONFLICT,
            AppError::NotFound(_) | AppError::Remote(StorageError::ObjectNotFound(_)) => {
                StatusCode::NOT_FOUND
            }
            AppError::RangeNotSatisfiable { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
            AppError::StorageWriteFailed(_)
            | AppError::AssemblyFailed(_)
            | AppError::ServeFailed(_)
            | AppError::Remote(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            AppError::Unauthenticated(_) => "unauthenticated",
            AppError::InvalidHeaders(_) => "invalid_headers",
            AppError::MissingParameters(_) => "missing_parameters",
            AppError::InvalidFileName(_) => "invalid_file_name",
            AppError::PayloadTooLarge { .. } => "payload_too_large",
            AppError::SessionNotFound(_) => "session_not_found",
            AppError::SessionBusy(_) => "session_busy",
            AppError::NoChunksFound(_) => "no_chunks_found",
            AppError::IncompleteUpload(_) => "incomplete_upload",
            AppError::StorageWriteFailed(_) => "storage_write_failed",
            AppError::AssemblyFailed(_) => "assembly_failed",
            AppError::NotFound(_) => "not_found",
            AppError::RangeNotSatisfiable { .. } => "range_not_satisfiable",
            AppError::ServeFailed(_) => "serve_failed",
            AppError::Remote(StorageError::ObjectNotFound(_)) => "object_not_found",
            AppError::Remote(_) => "storage_error",
            AppError::Internal(_) => "internal_error",
        }
    }

    /// Byte-serving failures answer in plain text
    fn is_plain_text(&self) -> bool {
        matches!(
            self,
            AppError::NotFound(_) | AppError::RangeNotSatisfiable { .. } | AppError::ServeFailed(_)
        )
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let message = if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
            match &self {
                AppError::StorageWriteFailed(_) => "Failed to upload chunk".to_string(),
                AppError::AssemblyFailed(_) => "Failed to complete upload".to_string(),
                AppError::ServeFailed(_) => "Error serving file".to_string(),
                AppError::Remote(_) => "Storage error".to_string(),
                _ => "An internal error occurred".to_string(),
            }
        } else {
            self.to_string()
        };

        if self.is_plain_text() {
            let mut response = (status, message).into_response();
            if let AppError::RangeNotSatisfiable { size } = self {
                if let Ok(value) = format!("bytes */{}", size).parse() {
                    response.headers_mut().insert(header::CONTENT_RANGE, value);
                }
            }
            return response;
        }

        let body = Json(ErrorResponse {
            error: self.code().to_string(),
            message,
        });

        (status, body).into_response()
    }
}

//! Upload types for the chunked upload protocol

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

// ============================================================================
// Constants
// ============================================================================

/// Chunk files are named `chunk-<offset>`
pub const CHUNK_PREFIX: &str = "chunk-";

/// Header carrying the session id on chunk uploads
pub const UPLOAD_ID_HEADER: &str = "x-upload-id";

// ============================================================================
// Upload Id
// ============================================================================

/// Opaque session identifier (random UUID v4)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UploadId(Uuid);

impl UploadId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UploadId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for UploadId {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| AppError::InvalidHeaders(format!("malformed upload id: {}", s)))
    }
}

// ============================================================================
// Session Types
// ============================================================================

/// Session lifecycle: `Open -> Assembling -> Done | Failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Accepting chunks
    Open,
    /// A completion request owns the session
    Assembling,
    /// Artifact written
    Done,
    /// Assembly failed after consuming chunks
    Failed,
}

/// State of the remote copy of a finished artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum HandoffStatus {
    NotStarted,
    Pending { attempts: u32 },
    Stored { key: String },
    /// No remote store configured; the local artifact is the only copy
    Local,
    Failed {
        error: String,
        /// Whether the local artifact still existed when the upload gave up
        #[serde(rename = "localKept")]
        local_kept: bool,
    },
}

/// Upload session record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSession {
    pub id: UploadId,
    pub created_at: DateTime<Utc>,
    /// Declared total size, checked against chunk coverage on completion
    pub total_size: Option<u64>,
    pub status: SessionStatus,
    pub handoff: HandoffStatus,
    /// Sanitized artifact name, once assembled
    pub file_name: Option<String>,
}

impl UploadSession {
    pub fn new(total_size: Option<u64>) -> Self {
        Self {
            id: UploadId::new(),
            created_at: Utc::now(),
            total_size,
            status: SessionStatus::Open,
            handoff: HandoffStatus::NotStarted,
            file_name: None,
        }
    }

    pub fn is_older_than(&self, cutoff: DateTime<Utc>) -> bool {
        self.created_at < cutoff
    }
}

// ============================================================================
// Chunk Types
// ============================================================================

/// A stored chunk, keyed by its starting offset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredChunk {
    pub offset: u64,
    pub len: u64,
    pub path: std::path::PathBuf,
}

/// Parse a chunk file name (`chunk-<offset>`) back to its offset
pub fn parse_chunk_name(name: &str) -> Option<u64> {
    let digits = name.strip_prefix(CHUNK_PREFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Parse the start offset from a `Content-Range: bytes <start>-...` header
pub fn parse_content_range_start(value: &str) -> Option<u64> {
    let rest = value.trim().strip_prefix("bytes ")?;
    let (start, _) = rest.trim_start().split_once('-')?;
    let start = start.trim();
    if start.is_empty() || !start.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    start.parse().ok()
}

/// Reduce a client-supplied file name to its final path component.
///
/// Both `/` and `\` count as separators. Returns `None` when nothing usable
/// remains (empty, `.`, `..`).
pub fn sanitize_file_name(name: &str) -> Option<String> {
    let base = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();

    match base {
        "" | "." | ".." => None,
        _ if base.contains('\0') => None,
        _ => Some(base.to_string()),
    }
}

// ============================================================================
// Wire Types
// ============================================================================

/// Optional body of `POST /upload/init`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitRequest {
    #[serde(default)]
    pub total_size: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitResponse {
    pub upload_id: UploadId,
}

/// Body of `POST /upload/complete`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteRequest {
    #[serde(default)]
    pub upload_id: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteResponse {
    pub message: String,
    pub url: String,
    pub file_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatusResponse {
    pub upload_id: UploadId,
    pub status: SessionStatus,
    pub handoff: HandoffStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<UploadSession> for SessionStatusResponse {
    fn from(session: UploadSession) -> Self {
        Self {
            upload_id: session.id,
            status: session.status,
            handoff: session.handoff,
            file_name: session.file_name,
            created_at: session.created_at,
        }
    }
}

/// Public read-back path for an artifact
pub fn artifact_url(file_name: &str) -> String {
    format!("/files/{}", urlencoding::encode(file_name))
}

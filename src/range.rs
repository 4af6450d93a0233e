//! Range Reader
//!
//! Serves stored artifacts whole or as a single `bytes=<start>-[<end>]`
//! slice.

use std::io::{ErrorKind, SeekFrom};
use std::path::PathBuf;

use axum::http::StatusCode;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt};

use crate::error::AppError;
use crate::upload::sanitize_file_name;

/// An inclusive byte span of a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn length(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn content_range(&self, size: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, size)
    }
}

/// Parse a single-range `Range` header against a file of `size` bytes.
///
/// Returns `Ok(None)` for expressions that are not a single
/// `bytes=<start>-[<end>]` range (suffix ranges, multiple ranges, garbage),
/// which are served as the full file. An end past the file is clamped.
pub fn parse_range(header: &str, size: u64) -> Result<Option<ByteRange>, AppError> {
    let Some(ranges) = header.trim().strip_prefix("bytes=") else {
        return Ok(None);
    };
    if ranges.contains(',') {
        return Ok(None);
    }
    let Some((start, end)) = ranges.split_once('-') else {
        return Ok(None);
    };

    let Ok(start) = start.trim().parse::<u64>() else {
        return Ok(None);
    };
    let end = match end.trim() {
        "" => None,
        raw => match raw.parse::<u64>() {
            Ok(end) => Some(end),
            Err(_) => return Ok(None),
        },
    };

    if size == 0 || start >= size {
        return Err(AppError::RangeNotSatisfiable { size });
    }

    let end = end.unwrap_or(size - 1).min(size - 1);
    if start > end {
        return Err(AppError::RangeNotSatisfiable { size });
    }

    Ok(Some(ByteRange { start, end }))
}

/// An opened artifact ready to stream
pub struct ServedFile {
    pub status: StatusCode,
    pub size: u64,
    pub range: Option<ByteRange>,
    pub reader: Box<dyn AsyncRead + Send + Unpin>,
}

impl ServedFile {
    /// Bytes this response will carry
    pub fn content_length(&self) -> u64 {
        self.range.map(|r| r.length()).unwrap_or(self.size)
    }

    pub fn content_range(&self) -> Option<String> {
        self.range.map(|r| r.content_range(self.size))
    }
}

/// Opens artifacts in the public upload directory
#[derive(Debug, Clone)]
pub struct RangeReader {
    root: PathBuf,
}

impl RangeReader {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Open `file_name`, honoring an optional `Range` header value
    pub async fn open(&self, file_name: &str, range: Option<&str>) -> Result<ServedFile, AppError> {
        let safe_name =
            sanitize_file_name(file_name).ok_or_else(|| AppError::NotFound(file_name.to_string()))?;
        let path = self.root.join(&safe_name);

        let mut file = match File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(AppError::NotFound(safe_name))
            }
            Err(e) => return Err(AppError::ServeFailed(e)),
        };

        let metadata = file.metadata().await.map_err(AppError::ServeFailed)?;
        if !metadata.is_file() {
            return Err(AppError::NotFound(safe_name));
        }
        let size = metadata.len();

        let range = match range {
            Some(header) => parse_range(header, size)?,
            None => None,
        };

        match range {
            Some(range) => {
                file.seek(SeekFrom::Start(range.start))
                    .await
                    .map_err(AppError::ServeFailed)?;
                tracing::debug!(
                    file_name = %safe_name,
                    start = range.start,
                    end = range.end,
                    length = range.length(),
                    "Range request accepted"
                );
                Ok(ServedFile {
                    status: StatusCode::PARTIAL_CONTENT,
                    size,
                    range: Some(range),
                    reader: Box::new(file.take(range.length())),
                })
            }
            None => Ok(ServedFile {
                status: StatusCode::OK,
                size,
                range: None,
                reader: Box::new(file),
            }),
        }
    }
}

//! Error types for capture operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while opening or reading a video source.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    #[error("FFprobe command failed: {message}")]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("Failed to open source {source_uri}: {message}")]
    OpenFailed { source_uri: String, message: String },

    #[error("Frame read failed: {0}")]
    ReadFailed(String),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Invalid video: {0}")]
    InvalidVideo(String),
}

impl MediaError {
    /// Create an open failure error.
    pub fn open_failed(source_uri: impl Into<String>, message: impl Into<String>) -> Self {
        Self::OpenFailed {
            source_uri: source_uri.into(),
            message: message.into(),
        }
    }

    /// Create a read failure error.
    pub fn read_failed(message: impl Into<String>) -> Self {
        Self::ReadFailed(message.into())
    }
}

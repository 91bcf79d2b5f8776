//! Storage error types.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur while encoding or persisting evidence.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to encode evidence image: {0}")]
    EncodeFailed(String),

    #[error("Frame buffer too short: expected {expected} bytes, got {actual}")]
    TruncatedFrame { expected: usize, actual: usize },

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Invalid name: {0}")]
    InvalidName(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub fn encode_failed(msg: impl Into<String>) -> Self {
        Self::EncodeFailed(msg.into())
    }

    pub fn write_failed(msg: impl Into<String>) -> Self {
        Self::WriteFailed(msg.into())
    }

    pub fn invalid_name(name: impl Into<String>) -> Self {
        Self::InvalidName(name.into())
    }
}

impl From<image::ImageError> for StorageError {
    fn from(e: image::ImageError) -> Self {
        Self::EncodeFailed(e.to_string())
    }
}

//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Job failed: {0}")]
    JobFailed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid status transition: {0}")]
    Transition(#[from] guardian_models::InvalidTransition),

    #[error("Media error: {0}")]
    Media(#[from] guardian_media::MediaError),

    #[error("Detector error: {0}")]
    Detector(#[from] guardian_detector::DetectorError),

    #[error("Backend error: {0}")]
    Backend(#[from] guardian_backend::BackendError),

    #[error("Queue error: {0}")]
    Queue(#[from] guardian_queue::QueueError),

    #[error("Storage error: {0}")]
    Storage(#[from] guardian_storage::StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn job_failed(msg: impl Into<String>) -> Self {
        Self::JobFailed(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Check if error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkerError::Backend(e) => e.is_retryable(),
            WorkerError::Detector(e) => e.is_retryable(),
            WorkerError::Queue(e) => !e.is_malformed(),
            WorkerError::Media(guardian_media::MediaError::ReadFailed(_))
            | WorkerError::Media(guardian_media::MediaError::Timeout(_))
            | WorkerError::Io(_) => true,
            _ => false,
        }
    }
}

//! Queue error types.

use thiserror::Error;

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Enqueue failed: {0}")]
    EnqueueFailed(String),

    #[error("Malformed job payload ({reason}): {payload}")]
    MalformedJob { payload: String, reason: String },

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl QueueError {
    pub fn connection_failed(msg: impl Into<String>) -> Self {
        Self::ConnectionFailed(msg.into())
    }

    pub fn enqueue_failed(msg: impl Into<String>) -> Self {
        Self::EnqueueFailed(msg.into())
    }

    pub fn malformed(payload: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedJob {
            payload: payload.into(),
            reason: reason.into(),
        }
    }

    /// Malformed entries are dropped; consumers move on without backing off.
    pub fn is_malformed(&self) -> bool {
        matches!(self, QueueError::MalformedJob { .. })
    }
}

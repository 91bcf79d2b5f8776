//! Backend error types.

use thiserror::Error;

/// Result type for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;

/// Errors that can occur while talking to the backend.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Failed to configure backend client: {0}")]
    ConfigError(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Server error {0}: {1}")]
    ServerError(u16, String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Evidence unavailable: {0}")]
    Evidence(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BackendError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn request_failed(msg: impl Into<String>) -> Self {
        Self::RequestFailed(msg.into())
    }

    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    /// Map a non-success HTTP status to an error.
    pub fn from_http_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 | 403 => Self::Unauthorized(message),
            404 => Self::NotFound(message),
            429 => Self::RateLimited,
            500..=599 => Self::ServerError(status, message),
            _ => Self::RequestFailed(format!("HTTP {}: {}", status, message)),
        }
    }

    /// Check if error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BackendError::Network(_) | BackendError::ServerError(..) | BackendError::RateLimited
        )
    }
}

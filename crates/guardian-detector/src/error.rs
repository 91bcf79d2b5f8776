//! Detector error types.

use thiserror::Error;

/// Result type for detector operations.
pub type DetectorResult<T> = Result<T, DetectorError>;

/// Errors that can occur while running detection.
#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("Failed to configure detector client: {0}")]
    ConfigError(String),

    #[error("Failed to encode frame: {0}")]
    EncodeFailed(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Server error {0}: {1}")]
    ServerError(u16, String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DetectorError {
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
    pub fn from_http_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        match status {
            429 => Self::RateLimited,
            500..=599 => Self::ServerError(status, body),
            _ => Self::RequestFailed(format!("HTTP {}: {}", status, body)),
        }
    }

    /// Check if error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            DetectorError::Network(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            DetectorError::ServerError(..) | DetectorError::RateLimited => true,
            _ => false,
        }
    }
}

impl From<guardian_storage::StorageError> for DetectorError {
    fn from(e: guardian_storage::StorageError) -> Self {
        Self::EncodeFailed(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_http_status() {
        assert!(matches!(DetectorError::from_http_status(429, ""), DetectorError::RateLimited));
        assert!(DetectorError::from_http_status(503, "busy").is_retryable());
        let err = DetectorError::from_http_status(422, "bad frame");
        assert!(matches!(err, DetectorError::RequestFailed(_)));
        assert!(!err.is_retryable());
    }
}

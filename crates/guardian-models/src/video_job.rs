//! Batch video jobs and their status lifecycle.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Job descriptor as pushed onto the video queue by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoJob {
    pub video_id: String,
    pub file_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl VideoJob {
    pub fn new(video_id: impl Into<String>, file_path: impl Into<String>) -> Self {
        Self {
            video_id: video_id.into(),
            file_path: file_path.into(),
            user_id: None,
        }
    }

    /// A job is usable only when both id and path are present.
    pub fn is_complete(&self) -> bool {
        !self.video_id.trim().is_empty() && !self.file_path.trim().is_empty()
    }
}

/// Video processing status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum VideoJobStatus {
    /// Uploaded and waiting for a worker
    #[default]
    Queued,
    /// A worker has picked the job up
    Processing,
    /// All frames were processed
    Completed,
    /// The job was abandoned
    Failed,
}

impl VideoJobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoJobStatus::Queued => "queued",
            VideoJobStatus::Processing => "processing",
            VideoJobStatus::Completed => "completed",
            VideoJobStatus::Failed => "failed",
        }
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, VideoJobStatus::Completed | VideoJobStatus::Failed)
    }

    /// Whether `next` is a legal forward move from this status.
    ///
    /// `queued -> failed` is allowed so an unopenable file can be reported
    /// without a preceding `processing`.
    pub fn can_transition_to(&self, next: VideoJobStatus) -> bool {
        use VideoJobStatus::*;
        matches!(
            (self, next),
            (Queued, Processing) | (Queued, Failed) | (Processing, Completed) | (Processing, Failed)
        )
    }

    /// Move to `next`, rejecting backwards or post-terminal transitions.
    pub fn transition(&mut self, next: VideoJobStatus) -> Result<(), InvalidTransition> {
        if !self.can_transition_to(next) {
            return Err(InvalidTransition {
                from: *self,
                to: next,
            });
        }
        *self = next;
        Ok(())
    }
}

impl fmt::Display for VideoJobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Invalid job status transition: {from} -> {to}")]
pub struct InvalidTransition {
    pub from: VideoJobStatus,
    pub to: VideoJobStatus,
}

/// Body for `PATCH /videos/{id}/status`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub status: VideoJobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
}

impl StatusUpdate {
    pub fn processing() -> Self {
        Self {
            status: VideoJobStatus::Processing,
            duration_seconds: None,
        }
    }

    pub fn completed(duration_seconds: f64) -> Self {
        Self {
            status: VideoJobStatus::Completed,
            duration_seconds: Some(duration_seconds),
        }
    }

    pub fn failed() -> Self {
        Self {
            status: VideoJobStatus::Failed,
            duration_seconds: None,
        }
    }
}

//! Structured logging.
//!
//! Subscriber setup for the binary plus a job logger giving every video
//! job the same lifecycle log lines.

use tracing::{error, info, warn, Span};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global tracing subscriber.
///
/// JSON lines when `LOG_FORMAT=json`, ANSI text otherwise. `RUST_LOG`
/// overrides the default `guardian=info` level.
pub fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("guardian=info,guardian_worker=info,tower_http=warn"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

/// Job logger for structured logging with consistent formatting.
#[derive(Debug, Clone)]
pub struct JobLogger {
    video_id: String,
    operation: String,
}

impl JobLogger {
    pub fn new(video_id: &str, operation: &str) -> Self {
        Self {
            video_id: video_id.to_string(),
            operation: operation.to_string(),
        }
    }

    pub fn log_start(&self, file_path: &str) {
        info!(
            video_id = %self.video_id,
            operation = %self.operation,
            file_path = %file_path,
            "Job started"
        );
    }

    /// Progress at a decile boundary.
    pub fn log_progress(&self, processed: u64, total: u64) {
        let percent = if total > 0 { processed * 100 / total } else { 0 };
        info!(
            video_id = %self.video_id,
            operation = %self.operation,
            processed,
            total,
            "Job progress: {}%", percent
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            video_id = %self.video_id,
            operation = %self.operation,
            "Job warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            video_id = %self.video_id,
            operation = %self.operation,
            "Job error: {}", message
        );
    }

    pub fn log_completion(&self, frames: u64, duration_seconds: f64) {
        info!(
            video_id = %self.video_id,
            operation = %self.operation,
            frames,
            duration_seconds,
            "Job completed"
        );
    }

    pub fn video_id(&self) -> &str {
        &self.video_id
    }

    /// Span carrying the job's identifiers.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "job",
            video_id = %self.video_id,
            operation = %self.operation
        )
    }
}

//! Prometheus metrics.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::error::{WorkerError, WorkerResult};

/// Install the Prometheus recorder and return its render handle.
pub fn init_metrics() -> WorkerResult<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| WorkerError::config_error(format!("Failed to install Prometheus recorder: {}", e)))
}

/// Metric names as constants for consistency.
pub mod names {
    // Streams
    pub const ACTIVE_STREAMS: &str = "guardian_active_streams";
    pub const FRAMES_PROCESSED_TOTAL: &str = "guardian_frames_processed_total";
    pub const FROZEN_FRAMES_TOTAL: &str = "guardian_frozen_frames_total";
    pub const STREAM_RECONNECTS_TOTAL: &str = "guardian_stream_reconnects_total";
    pub const STREAMS_EXHAUSTED_TOTAL: &str = "guardian_streams_exhausted_total";
    pub const INFERENCE_LATENCY_SECONDS: &str = "guardian_inference_latency_seconds";
    pub const HEARTBEATS_TOTAL: &str = "guardian_heartbeats_total";

    // Violations
    pub const VIOLATIONS_TOTAL: &str = "guardian_violations_total";

    // Jobs
    pub const JOBS_TOTAL: &str = "guardian_jobs_total";
    pub const JOB_DURATION_SECONDS: &str = "guardian_job_duration_seconds";
}

fn outcome(ok: bool) -> &'static str {
    if ok {
        "ok"
    } else {
        "error"
    }
}

pub fn set_active_streams(count: usize) {
    gauge!(names::ACTIVE_STREAMS).set(count as f64);
}

pub fn record_frame(source: &'static str) {
    counter!(names::FRAMES_PROCESSED_TOTAL, "source" => source).increment(1);
}

pub fn record_frozen_frame(camera_id: &str) {
    counter!(names::FROZEN_FRAMES_TOTAL, "camera" => camera_id.to_string()).increment(1);
}

pub fn record_reconnect(camera_id: &str) {
    counter!(names::STREAM_RECONNECTS_TOTAL, "camera" => camera_id.to_string()).increment(1);
}

pub fn record_stream_exhausted() {
    counter!(names::STREAMS_EXHAUSTED_TOTAL).increment(1);
}

pub fn record_inference_latency(source: &'static str, latency_secs: f64) {
    histogram!(names::INFERENCE_LATENCY_SECONDS, "source" => source).record(latency_secs);
}

pub fn record_heartbeat(ok: bool) {
    counter!(names::HEARTBEATS_TOTAL, "result" => outcome(ok)).increment(1);
}

pub fn record_violation(source: &'static str, ok: bool) {
    counter!(names::VIOLATIONS_TOTAL, "source" => source, "result" => outcome(ok)).increment(1);
}

pub fn record_job(status: &'static str, duration_secs: f64) {
    counter!(names::JOBS_TOTAL, "status" => status).increment(1);
    histogram!(names::JOB_DURATION_SECONDS, "status" => status).record(duration_secs);
}

//! Per-camera runtime state.

use serde::Serialize;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Runtime state owned by one stream worker.
#[derive(Debug)]
pub struct StreamSession {
    frame_times: VecDeque<Instant>,
    window: usize,
    last_region: Option<Vec<u8>>,
    /// When the current run of identical regions began
    region_since: Option<Instant>,
    freeze_started: Option<Instant>,
    frozen: bool,
    failure_count: u64,
    started_at: Instant,
    retry: u32,
    last_heartbeat: Option<Instant>,
    last_latency_ms: u64,
    frames: u64,
}

impl StreamSession {
    pub fn new(window: usize) -> Self {
        Self {
            frame_times: VecDeque::with_capacity(window),
            window: window.max(2),
            last_region: None,
            region_since: None,
            freeze_started: None,
            frozen: false,
            failure_count: 0,
            started_at: Instant::now(),
            retry: 0,
            last_heartbeat: None,
            last_latency_ms: 0,
            frames: 0,
        }
    }

    /// Record a successfully read frame. Resets the retry counter.
    pub fn record_frame(&mut self, now: Instant) {
        if self.frame_times.len() == self.window {
            self.frame_times.pop_front();
        }
        self.frame_times.push_back(now);
        self.frames += 1;
        self.retry = 0;
    }

    /// Frames per second over the window: `(n - 1) / (newest - oldest)`.
    pub fn fps(&self) -> f64 {
        let (Some(oldest), Some(newest)) = (self.frame_times.front(), self.frame_times.back()) else {
            return 0.0;
        };
        let n = self.frame_times.len();
        let span = newest.duration_since(*oldest).as_secs_f64();
        if n < 2 || span <= 0.0 {
            return 0.0;
        }
        (n - 1) as f64 / span
    }

    /// Compare the freeze region with the previous frame's.
    ///
    /// Returns whether the stream is frozen: the region has been identical
    /// for longer than `threshold`. Every frozen frame counts as a failure.
    pub fn observe_region(&mut self, region: Vec<u8>, now: Instant, threshold: Duration) -> bool {
        let unchanged = self.last_region.as_deref() == Some(region.as_slice());

        if !unchanged {
            self.last_region = Some(region);
            self.region_since = Some(now);
            self.freeze_started = None;
            self.frozen = false;
            return false;
        }

        let since = *self.region_since.get_or_insert(now);
        self.freeze_started.get_or_insert(since);
        self.frozen = now.duration_since(since) > threshold;
        if self.frozen {
            self.failure_count += 1;
        }
        self.frozen
    }

    /// Whether a heartbeat is owed: none sent yet, or more than `interval` since the last.
    pub fn heartbeat_due(&self, now: Instant, interval: Duration) -> bool {
        match self.last_heartbeat {
            None => true,
            Some(last) => now.duration_since(last) > interval,
        }
    }

    /// Mark a heartbeat attempt, successful or not.
    pub fn mark_heartbeat(&mut self, now: Instant) {
        self.last_heartbeat = Some(now);
    }

    /// Count a failed (re)connection attempt and return the new retry count.
    pub fn record_connection_failure(&mut self) -> u32 {
        self.retry += 1;
        self.retry
    }

    pub fn set_latency(&mut self, latency_ms: u64) {
        self.last_latency_ms = latency_ms;
    }

    pub fn latency_ms(&self) -> u64 {
        self.last_latency_ms
    }

    pub fn failure_count(&self) -> u64 {
        self.failure_count
    }

    pub fn retry(&self) -> u32 {
        self.retry
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn freeze_started(&self) -> Option<Instant> {
        self.freeze_started
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Time since the worker started.
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// Lifecycle state of a stream worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamState {
    Connecting,
    Streaming,
    Backoff,
    Terminated,
}

/// Point-in-time view of a stream worker, published for the health endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamHealth {
    pub camera_id: String,
    pub state: StreamState,
    pub fps: f64,
    pub latency_ms: u64,
    pub failure_count: u64,
    pub retry: u32,
    pub frozen: bool,
    pub frames: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_frame_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl StreamHealth {
    pub fn connecting(camera_id: impl Into<String>) -> Self {
        Self {
            camera_id: camera_id.into(),
            state: StreamState::Connecting,
            fps: 0.0,
            latency_ms: 0,
            failure_count: 0,
            retry: 0,
            frozen: false,
            frames: 0,
            last_frame_at: None,
        }
    }
}

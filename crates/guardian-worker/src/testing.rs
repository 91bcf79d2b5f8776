//! In-process fakes for the worker's collaborators.
//!
//! Used by the unit tests and the integration tests under `tests/`; none of
//! these touch the network or spawn FFmpeg.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use guardian_backend::{BackendClient, BackendError, BackendResult};
use guardian_detector::{Detector, DetectorError, DetectorResult};
use guardian_media::{Frame, FrameSource, MediaError, MediaResult, SourceInfo, SourceOpener};
use guardian_models::{
    CameraDescriptor, ClassTaxonomy, DetectionResult, Heartbeat, JobViolation, StatusUpdate,
    VideoJobStatus, ViolationEvent, ViolationType,
};

use crate::policy::{ViolationDraft, ViolationPolicy};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One scripted result of `read_frame`.
#[derive(Debug, Clone)]
pub enum SourceStep {
    Frame(Frame),
    Error(String),
    /// Never return; only cancellation gets past this step
    Hang,
}

/// Frame source replaying a fixed script, then reporting end of stream.
pub struct ScriptedSource {
    info: SourceInfo,
    steps: VecDeque<SourceStep>,
    interval: Duration,
    released: Arc<AtomicUsize>,
}

impl ScriptedSource {
    pub fn new(info: SourceInfo, steps: Vec<SourceStep>) -> Self {
        Self {
            info,
            steps: steps.into(),
            interval: Duration::ZERO,
            released: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// `count` uniform frames of the given geometry.
    pub fn uniform(info: SourceInfo, count: u64) -> Self {
        let steps = (0..count)
            .map(|i| SourceStep::Frame(Frame::filled(info.width, info.height, i, 42)))
            .collect();
        Self::new(info, steps)
    }

    /// Wait `interval` before every read.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn release_counter(&self) -> Arc<AtomicUsize> {
        self.released.clone()
    }
}

#[async_trait]
impl FrameSource for ScriptedSource {
    async fn read_frame(&mut self) -> MediaResult<Option<Frame>> {
        if !self.interval.is_zero() {
            tokio::time::sleep(self.interval).await;
        }
        match self.steps.pop_front() {
            None => Ok(None),
            Some(SourceStep::Frame(frame)) => Ok(Some(frame)),
            Some(SourceStep::Error(message)) => Err(MediaError::read_failed(message)),
            Some(SourceStep::Hang) => std::future::pending().await,
        }
    }

    fn info(&self) -> &SourceInfo {
        &self.info
    }

    async fn release(&mut self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// One scripted result of `open`.
pub enum OpenStep {
    Source(ScriptedSource),
    Fail(String),
}

enum WhenExhausted {
    Fail,
    Hang,
}

/// Opener handing out scripted sources in order.
pub struct ScriptedOpener {
    steps: Mutex<VecDeque<OpenStep>>,
    when_exhausted: WhenExhausted,
    opened: Mutex<Vec<String>>,
    released: Arc<AtomicUsize>,
}

impl ScriptedOpener {
    /// Replays `steps`; every later open fails.
    pub fn new(steps: Vec<OpenStep>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            when_exhausted: WhenExhausted::Fail,
            opened: Mutex::new(Vec::new()),
            released: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Every open succeeds with a source that never yields a frame.
    pub fn always_hanging() -> Self {
        Self {
            when_exhausted: WhenExhausted::Hang,
            ..Self::new(Vec::new())
        }
    }

    /// Number of open attempts.
    pub fn opens(&self) -> usize {
        lock(&self.opened).len()
    }

    /// URIs passed to `open`, in order.
    pub fn opened(&self) -> Vec<String> {
        lock(&self.opened).clone()
    }

    /// Releases across every source this opener handed out.
    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceOpener for ScriptedOpener {
    async fn open(&self, uri: &str) -> MediaResult<Box<dyn FrameSource>> {
        lock(&self.opened).push(uri.to_string());
        let step = lock(&self.steps).pop_front();

        let mut source = match step {
            Some(OpenStep::Source(source)) => source,
            Some(OpenStep::Fail(message)) => return Err(MediaError::open_failed(uri, message)),
            None => match self.when_exhausted {
                WhenExhausted::Fail => return Err(MediaError::open_failed(uri, "no scripted source")),
                WhenExhausted::Hang => {
                    ScriptedSource::new(SourceInfo::new(64, 48, None, None), vec![SourceStep::Hang])
                }
            },
        };
        source.released = self.released.clone();
        Ok(Box::new(source))
    }
}

/// A backend call recorded by `RecordingBackend`.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    FetchCameras,
    Heartbeat { camera_id: String, heartbeat: Heartbeat },
    Violation(ViolationEvent),
    VideoStatus { video_id: String, update: StatusUpdate },
    JobViolation { video_id: String, violation: JobViolation },
    Offline { camera_id: String },
}

/// Backend that records every call and serves a configurable camera list.
#[derive(Default)]
pub struct RecordingBackend {
    cameras: Mutex<Vec<CameraDescriptor>>,
    calls: Mutex<Vec<BackendCall>>,
    fail_fetch: AtomicBool,
    fail_heartbeats: AtomicBool,
    fail_status: AtomicBool,
    heartbeat_delay: Mutex<Duration>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_cameras(&self, cameras: Vec<CameraDescriptor>) {
        *lock(&self.cameras) = cameras;
    }

    pub fn set_fail_fetch(&self, fail: bool) {
        self.fail_fetch.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_heartbeats(&self, fail: bool) {
        self.fail_heartbeats.store(fail, Ordering::SeqCst);
    }

    /// Hold every heartbeat for `delay` before answering.
    pub fn set_heartbeat_delay(&self, delay: Duration) {
        *lock(&self.heartbeat_delay) = delay;
    }

    pub fn set_fail_status(&self, fail: bool) {
        self.fail_status.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        lock(&self.calls).clone()
    }

    /// Heartbeat attempts for a camera, failed ones included.
    pub fn heartbeats(&self, camera_id: &str) -> Vec<Heartbeat> {
        lock(&self.calls)
            .iter()
            .filter_map(|c| match c {
                BackendCall::Heartbeat { camera_id: id, heartbeat } if id == camera_id => Some(*heartbeat),
                _ => None,
            })
            .collect()
    }

    /// Status updates sent for a video, in order.
    pub fn statuses(&self, video_id: &str) -> Vec<StatusUpdate> {
        lock(&self.calls)
            .iter()
            .filter_map(|c| match c {
                BackendCall::VideoStatus { video_id: id, update } if id == video_id => Some(*update),
                _ => None,
            })
            .collect()
    }

    pub fn status_sequence(&self, video_id: &str) -> Vec<VideoJobStatus> {
        self.statuses(video_id).into_iter().map(|u| u.status).collect()
    }

    pub fn job_violations(&self, video_id: &str) -> Vec<JobViolation> {
        lock(&self.calls)
            .iter()
            .filter_map(|c| match c {
                BackendCall::JobViolation { video_id: id, violation } if id == video_id => {
                    Some(violation.clone())
                }
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: BackendCall) {
        lock(&self.calls).push(call);
    }
}

#[async_trait]
impl BackendClient for RecordingBackend {
    async fn fetch_cameras(&self) -> BackendResult<Vec<CameraDescriptor>> {
        self.record(BackendCall::FetchCameras);
        // Let concurrent reconciliations interleave.
        tokio::task::yield_now().await;
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(BackendError::from_http_status(503, "registry unavailable"));
        }
        Ok(lock(&self.cameras).clone())
    }

    async fn send_heartbeat(&self, camera_id: &str, heartbeat: &Heartbeat) -> BackendResult<()> {
        self.record(BackendCall::Heartbeat {
            camera_id: camera_id.to_string(),
            heartbeat: *heartbeat,
        });
        let delay = *lock(&self.heartbeat_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.fail_heartbeats.load(Ordering::SeqCst) {
            return Err(BackendError::request_failed("heartbeat refused"));
        }
        Ok(())
    }

    async fn submit_violation(&self, event: &ViolationEvent) -> BackendResult<()> {
        self.record(BackendCall::Violation(event.clone()));
        Ok(())
    }

    async fn update_video_status(&self, video_id: &str, update: &StatusUpdate) -> BackendResult<()> {
        self.record(BackendCall::VideoStatus {
            video_id: video_id.to_string(),
            update: *update,
        });
        if self.fail_status.load(Ordering::SeqCst) {
            return Err(BackendError::from_http_status(500, "status update failed"));
        }
        Ok(())
    }

    async fn submit_job_violation(&self, video_id: &str, violation: &JobViolation) -> BackendResult<()> {
        self.record(BackendCall::JobViolation {
            video_id: video_id.to_string(),
            violation: violation.clone(),
        });
        Ok(())
    }

    async fn report_offline(&self, camera_id: &str) -> BackendResult<()> {
        self.record(BackendCall::Offline {
            camera_id: camera_id.to_string(),
        });
        Ok(())
    }
}

enum DetectorMode {
    Fixed(Vec<DetectionResult>),
    Fail,
}

/// Detector returning a fixed answer and recording which frames it saw.
pub struct ScriptedDetector {
    mode: DetectorMode,
    frames: Mutex<Vec<u64>>,
}

impl ScriptedDetector {
    pub fn empty() -> Self {
        Self::always(Vec::new())
    }

    pub fn always(detections: Vec<DetectionResult>) -> Self {
        Self {
            mode: DetectorMode::Fixed(detections),
            frames: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            mode: DetectorMode::Fail,
            frames: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        lock(&self.frames).len()
    }

    /// Indices of the frames passed to `detect`, in order.
    pub fn frame_indices(&self) -> Vec<u64> {
        lock(&self.frames).clone()
    }
}

#[async_trait]
impl Detector for ScriptedDetector {
    async fn detect(&self, frame: &Frame) -> DetectorResult<Vec<DetectionResult>> {
        lock(&self.frames).push(frame.index);
        match &self.mode {
            DetectorMode::Fixed(detections) => Ok(detections.clone()),
            DetectorMode::Fail => Err(DetectorError::from_http_status(503, "model loading")),
        }
    }
}

/// Deterministic violation policy.
#[derive(Debug, Clone)]
pub struct FixedPolicy {
    trigger: bool,
    violation_type: ViolationType,
}

impl FixedPolicy {
    pub fn never() -> Self {
        Self {
            trigger: false,
            violation_type: ViolationType::Speeding,
        }
    }

    pub fn always(violation_type: ViolationType) -> Self {
        Self {
            trigger: true,
            violation_type,
        }
    }
}

impl ViolationPolicy for FixedPolicy {
    fn should_trigger(&self) -> bool {
        self.trigger
    }

    fn draft(&self, _detection: &DetectionResult, _taxonomy: ClassTaxonomy) -> ViolationDraft {
        ViolationDraft {
            violation_type: self.violation_type,
            plate_number: "TST-001".to_string(),
            severity: 50.0,
        }
    }
}

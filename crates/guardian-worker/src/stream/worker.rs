//! Per-camera stream worker.

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use guardian_backend::BackendClient;
use guardian_detector::Detector;
use guardian_media::{Frame, FrameSource, SourceOpener};
use guardian_models::{CameraDescriptor, ClassTaxonomy, DetectionResult, GeoPoint, Heartbeat, ViolationEvent};
use guardian_storage::EvidenceStore;

use crate::config::StreamConfig;
use crate::metrics;
use crate::policy::ViolationPolicy;
use crate::retry::FailureTracker;
use crate::stream::session::{StreamHealth, StreamSession, StreamState};

/// Shared dependencies handed to every stream worker.
#[derive(Clone)]
pub struct StreamContext {
    pub opener: Arc<dyn SourceOpener>,
    pub detector: Arc<dyn Detector>,
    pub backend: Arc<dyn BackendClient>,
    pub evidence: Arc<dyn EvidenceStore>,
    pub policy: Arc<dyn ViolationPolicy>,
    pub taxonomy: ClassTaxonomy,
    pub config: StreamConfig,
}

/// The camera a worker streams from.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamTarget {
    pub camera_id: String,
    pub source: String,
    pub name: String,
    pub location: GeoPoint,
}

impl StreamTarget {
    /// Target for a descriptor with both an id and a source address.
    pub fn from_descriptor(camera: &CameraDescriptor) -> Option<Self> {
        Some(Self {
            camera_id: camera.camera_id()?.to_string(),
            source: camera.source()?.to_string(),
            name: camera.display_name().to_string(),
            location: camera.location(),
        })
    }
}

/// Why a stream worker stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamExit {
    /// Cancelled by the supervisor or shutdown
    Cancelled,
    /// Gave up after `attempts` consecutive failed connections
    Exhausted { attempts: u32 },
}

enum ReadLoopEnd {
    Cancelled,
    Ended(String),
}

/// Resolves once cancellation is requested. A dropped sender counts as a request.
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

/// Long-lived task owning one camera's capture session.
pub struct StreamWorker {
    target: StreamTarget,
    ctx: StreamContext,
    session: StreamSession,
    cancel_rx: watch::Receiver<bool>,
    health_tx: watch::Sender<StreamHealth>,
    heartbeats: FailureTracker,
    last_frame_at: Option<chrono::DateTime<Utc>>,
}

impl StreamWorker {
    pub fn new(target: StreamTarget, ctx: StreamContext, cancel_rx: watch::Receiver<bool>) -> Self {
        let (health_tx, _) = watch::channel(StreamHealth::connecting(target.camera_id.clone()));
        let session = StreamSession::new(ctx.config.fps_window);
        Self {
            target,
            ctx,
            session,
            cancel_rx,
            health_tx,
            heartbeats: FailureTracker::new("heartbeat", 3),
            last_frame_at: None,
        }
    }

    /// Receiver for this worker's health snapshots.
    pub fn health(&self) -> watch::Receiver<StreamHealth> {
        self.health_tx.subscribe()
    }

    pub fn target(&self) -> &StreamTarget {
        &self.target
    }

    /// Connect, stream and reconnect until cancelled or out of retries.
    pub async fn run(mut self) -> StreamExit {
        info!(
            camera_id = %self.target.camera_id,
            name = %self.target.name,
            "Stream worker started"
        );

        loop {
            if *self.cancel_rx.borrow() {
                return self.finish(StreamExit::Cancelled);
            }

            self.publish(StreamState::Connecting);
            let opened = tokio::select! {
                biased;
                _ = cancelled(&mut self.cancel_rx) => return self.finish(StreamExit::Cancelled),
                opened = self.ctx.opener.open(&self.target.source) => opened,
            };

            match opened {
                Ok(mut source) => {
                    info!(camera_id = %self.target.camera_id, "Stream connected");
                    let end = self.read_loop(source.as_mut()).await;
                    source.release().await;
                    match end {
                        ReadLoopEnd::Cancelled => return self.finish(StreamExit::Cancelled),
                        ReadLoopEnd::Ended(reason) => {
                            warn!(camera_id = %self.target.camera_id, reason = %reason, "Stream interrupted");
                        }
                    }
                }
                Err(e) => {
                    warn!(camera_id = %self.target.camera_id, error = %e, "Failed to open stream");
                }
            }

            let attempts = self.session.record_connection_failure();
            metrics::record_reconnect(&self.target.camera_id);

            if attempts >= self.ctx.config.max_retries {
                warn!(
                    camera_id = %self.target.camera_id,
                    attempts,
                    "Stream offline after exhausting retries"
                );
                metrics::record_stream_exhausted();
                return self.finish(StreamExit::Exhausted { attempts });
            }

            debug!(
                camera_id = %self.target.camera_id,
                attempt = attempts,
                backoff_secs = self.ctx.config.backoff.as_secs_f64(),
                "Reconnecting after backoff"
            );
            self.publish(StreamState::Backoff);
            tokio::select! {
                biased;
                _ = cancelled(&mut self.cancel_rx) => return self.finish(StreamExit::Cancelled),
                _ = tokio::time::sleep(self.ctx.config.backoff) => {}
            }
        }
    }

    fn finish(&self, exit: StreamExit) -> StreamExit {
        self.publish(StreamState::Terminated);
        info!(camera_id = %self.target.camera_id, exit = ?exit, "Stream worker stopped");
        exit
    }

    async fn read_loop(&mut self, source: &mut dyn FrameSource) -> ReadLoopEnd {
        loop {
            let read_started = Instant::now();
            let read = tokio::select! {
                biased;
                _ = cancelled(&mut self.cancel_rx) => return ReadLoopEnd::Cancelled,
                read = source.read_frame() => read,
            };

            match read {
                Ok(Some(frame)) => self.process_frame(&frame, read_started).await,
                Ok(None) => return ReadLoopEnd::Ended("end of stream".to_string()),
                Err(e) => return ReadLoopEnd::Ended(e.to_string()),
            }
        }
    }

    async fn process_frame(&mut self, frame: &Frame, read_started: Instant) {
        let now = Instant::now();
        self.session.record_frame(now);
        self.last_frame_at = Some(Utc::now());
        metrics::record_frame("stream");

        if self
            .session
            .observe_region(frame.freeze_region(), now, self.ctx.config.freeze_threshold)
        {
            metrics::record_frozen_frame(&self.target.camera_id);
            debug!(
                camera_id = %self.target.camera_id,
                failure_count = self.session.failure_count(),
                "Stream frozen"
            );
        }

        let detections = match self.ctx.detector.detect(frame).await {
            Ok(detections) => detections,
            Err(e) => {
                warn!(camera_id = %self.target.camera_id, error = %e, "Detection failed");
                Vec::new()
            }
        };
        let latency = read_started.elapsed();
        self.session.set_latency(latency.as_millis() as u64);
        metrics::record_inference_latency("stream", latency.as_secs_f64());

        let now = Instant::now();
        if self.session.heartbeat_due(now, self.ctx.config.heartbeat_interval) {
            self.session.mark_heartbeat(now);
            self.send_heartbeat().await;
        }

        self.maybe_report_violation(frame, &detections).await;
        self.publish(StreamState::Streaming);
    }

    async fn send_heartbeat(&mut self) {
        let heartbeat = Heartbeat {
            fps: (self.session.fps() * 10.0).round() / 10.0,
            latency_ms: self.session.latency_ms(),
            failure_count: self.session.failure_count(),
        };

        match self
            .ctx
            .backend
            .send_heartbeat(&self.target.camera_id, &heartbeat)
            .await
        {
            Ok(()) => {
                self.heartbeats.record_success();
                metrics::record_heartbeat(true);
            }
            Err(e) => {
                self.heartbeats.record_failure(&e);
                metrics::record_heartbeat(false);
            }
        }
    }

    async fn maybe_report_violation(&self, frame: &Frame, detections: &[DetectionResult]) {
        let taxonomy = self.ctx.taxonomy;
        let Some(best) = DetectionResult::best(detections.iter().filter(|d| taxonomy.is_relevant(d.class_id)))
        else {
            return;
        };
        if !self.ctx.policy.should_trigger() {
            return;
        }

        let draft = self.ctx.policy.draft(best, taxonomy);
        let hint = format!("ev_{}", self.target.camera_id);
        let evidence = match self.ctx.evidence.encode(frame) {
            Ok(bytes) => self.ctx.evidence.persist(bytes, &hint).await,
            Err(e) => Err(e),
        };
        let evidence = match evidence {
            Ok(evidence) => evidence,
            Err(e) => {
                warn!(camera_id = %self.target.camera_id, error = %e, "Failed to capture evidence");
                metrics::record_violation("stream", false);
                return;
            }
        };

        let event = ViolationEvent {
            violation_type: draft.violation_type,
            plate_number: draft.plate_number,
            vehicle_type: taxonomy.vehicle_tag(best.class_id).to_string(),
            confidence: best.confidence,
            severity: draft.severity,
            camera_id: self.target.camera_id.clone(),
            location: self.target.location,
            timestamp_offset: self.session.elapsed().as_secs_f64(),
            bbox: best.bbox,
            captured_at: Utc::now(),
            evidence,
        };

        match self.ctx.backend.submit_violation(&event).await {
            Ok(()) => {
                info!(
                    camera_id = %self.target.camera_id,
                    violation_type = %event.violation_type,
                    plate = %event.plate_number,
                    "Violation reported"
                );
                metrics::record_violation("stream", true);
            }
            Err(e) => {
                warn!(camera_id = %self.target.camera_id, error = %e, "Failed to report violation");
                metrics::record_violation("stream", false);
            }
        }
    }

    fn publish(&self, state: StreamState) {
        self.health_tx.send_replace(StreamHealth {
            camera_id: self.target.camera_id.clone(),
            state,
            fps: self.session.fps(),
            latency_ms: self.session.latency_ms(),
            failure_count: self.session.failure_count(),
            retry: self.session.retry(),
            frozen: self.session.is_frozen(),
            frames: self.session.frames(),
            last_frame_at: self.last_frame_at,
        });
    }

    #[cfg(test)]
    fn session(&self) -> &StreamSession {
        &self.session
    }
}

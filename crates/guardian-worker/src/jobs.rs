//! Uploaded video processing.
//!
//! Workers pop jobs from the queue, sample every Nth frame through the
//! detector, report violations against the video and finish with a terminal
//! status. Several workers may share one queue.

use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{error, info, warn, Instrument};

use guardian_backend::BackendClient;
use guardian_detector::Detector;
use guardian_media::{Frame, FrameSource, SourceOpener};
use guardian_models::{ClassTaxonomy, DetectionResult, JobViolation, StatusUpdate, VideoJob, VideoJobStatus};
use guardian_queue::JobQueue;
use guardian_storage::EvidenceStore;

use crate::config::JobConfig;
use crate::error::WorkerResult;
use crate::logging::JobLogger;
use crate::metrics;
use crate::policy::ViolationPolicy;

/// Receives job progress at decile boundaries.
pub trait ProgressHook: Send + Sync {
    fn on_progress(&self, video_id: &str, processed: u64, total: u64);
}

/// Shared dependencies for video job workers.
#[derive(Clone)]
pub struct JobContext {
    pub queue: Arc<dyn JobQueue>,
    pub opener: Arc<dyn SourceOpener>,
    pub detector: Arc<dyn Detector>,
    pub backend: Arc<dyn BackendClient>,
    pub evidence: Arc<dyn EvidenceStore>,
    pub policy: Arc<dyn ViolationPolicy>,
    pub taxonomy: ClassTaxonomy,
    pub config: JobConfig,
    pub progress: Option<Arc<dyn ProgressHook>>,
}

/// How a job ended.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum JobOutcome {
    Completed { frames: u64, duration_seconds: f64 },
    /// The source could not be opened
    Unopenable,
}

fn stop_requested(rx: &watch::Receiver<bool>) -> bool {
    // A dropped sender also stops the worker.
    *rx.borrow() || rx.has_changed().is_err()
}

/// A single queue consumer.
pub struct VideoJobWorker {
    id: usize,
    ctx: JobContext,
}

impl VideoJobWorker {
    pub fn new(id: usize, ctx: JobContext) -> Self {
        Self { id, ctx }
    }

    /// Consume jobs until a stop is requested. The job in flight always runs
    /// to completion.
    pub async fn run(&self, mut stop_rx: watch::Receiver<bool>) {
        info!(worker_id = self.id, "Video job worker started");

        while !stop_requested(&stop_rx) {
            let job = match self.ctx.queue.pop(self.ctx.config.pop_timeout).await {
                Ok(Some(job)) => job,
                Ok(None) => continue,
                Err(e) if e.is_malformed() => {
                    warn!(worker_id = self.id, error = %e, "Skipping malformed queue entry");
                    continue;
                }
                Err(e) => {
                    error!(worker_id = self.id, error = %e, "Queue pop failed");
                    self.cooldown(&mut stop_rx).await;
                    continue;
                }
            };

            if let Err(e) = self.process(&job).await {
                error!(worker_id = self.id, video_id = %job.video_id, error = %e, "Video job failed");
                self.cooldown(&mut stop_rx).await;
            }
        }

        info!(worker_id = self.id, "Video job worker stopped");
    }

    async fn cooldown(&self, stop_rx: &mut watch::Receiver<bool>) {
        tokio::select! {
            _ = tokio::time::sleep(self.ctx.config.cooldown) => {}
            _ = stop_rx.changed() => {}
        }
    }

    /// Process one job end to end, reporting its status transitions.
    pub async fn process(&self, job: &VideoJob) -> WorkerResult<JobOutcome> {
        let logger = JobLogger::new(&job.video_id, "video_analysis");
        let span = logger.create_span();
        self.process_inner(job, &logger).instrument(span).await
    }

    async fn process_inner(&self, job: &VideoJob, logger: &JobLogger) -> WorkerResult<JobOutcome> {
        let started = Instant::now();
        let mut status = VideoJobStatus::Queued;
        logger.log_start(&job.file_path);

        status.transition(VideoJobStatus::Processing)?;
        self.report_status(logger, &job.video_id, StatusUpdate::processing()).await;

        let mut source = match self.ctx.opener.open(&job.file_path).await {
            Ok(source) => source,
            Err(e) => {
                logger.log_error(&format!("Could not open {}: {}", job.file_path, e));
                status.transition(VideoJobStatus::Failed)?;
                self.report_status(logger, &job.video_id, StatusUpdate::failed()).await;
                metrics::record_job(VideoJobStatus::Failed.as_str(), started.elapsed().as_secs_f64());
                return Ok(JobOutcome::Unopenable);
            }
        };

        let info = source.info().clone();
        let result = self.analyse(job, source.as_mut(), logger).await;
        source.release().await;

        match result {
            Ok(frames) => {
                let total = info.total_frames.unwrap_or(frames);
                let duration_seconds = match info.fps {
                    Some(fps) if fps > 0.0 => total as f64 / fps,
                    _ => 0.0,
                };

                status.transition(VideoJobStatus::Completed)?;
                self.report_status(logger, &job.video_id, StatusUpdate::completed(duration_seconds))
                    .await;
                logger.log_completion(frames, duration_seconds);
                metrics::record_job(VideoJobStatus::Completed.as_str(), started.elapsed().as_secs_f64());
                Ok(JobOutcome::Completed {
                    frames,
                    duration_seconds,
                })
            }
            Err(e) => {
                logger.log_error(&e.to_string());
                status.transition(VideoJobStatus::Failed)?;
                self.report_status(logger, &job.video_id, StatusUpdate::failed()).await;
                metrics::record_job(VideoJobStatus::Failed.as_str(), started.elapsed().as_secs_f64());
                Err(e)
            }
        }
    }

    /// Read every frame, analysing every Nth. Returns the number of frames read.
    async fn analyse(&self, job: &VideoJob, source: &mut dyn FrameSource, logger: &JobLogger) -> WorkerResult<u64> {
        let info = source.info().clone();
        let stride = self.ctx.config.frame_stride.max(1);
        let total = info.total_frames.filter(|t| *t > 0);
        let mut processed = 0u64;
        let mut last_decile = 0u64;

        while let Some(frame) = source.read_frame().await? {
            let index = processed;
            processed += 1;
            metrics::record_frame("job");

            if index % stride == 0 {
                self.analyse_frame(job, &frame, index, info.fps, logger).await;
            }

            if let Some(total) = total {
                let decile = (processed * 10 / total).min(10);
                if decile > last_decile {
                    last_decile = decile;
                    logger.log_progress(processed, total);
                    if let Some(hook) = &self.ctx.progress {
                        hook.on_progress(&job.video_id, processed, total);
                    }
                }
            }
        }

        Ok(processed)
    }

    async fn analyse_frame(&self, job: &VideoJob, frame: &Frame, index: u64, fps: Option<f64>, logger: &JobLogger) {
        let started = Instant::now();
        let detections = match self.ctx.detector.detect(frame).await {
            Ok(detections) => detections,
            Err(e) => {
                logger.log_warning(&format!("Detection failed on frame {}: {}", index, e));
                return;
            }
        };
        metrics::record_inference_latency("job", started.elapsed().as_secs_f64());

        let taxonomy = self.ctx.taxonomy;
        let Some(best) = DetectionResult::best(detections.iter().filter(|d| taxonomy.is_relevant(d.class_id)))
        else {
            return;
        };
        if !self.ctx.policy.should_trigger() {
            return;
        }

        let draft = self.ctx.policy.draft(best, taxonomy);
        let hint = format!("{}_{}", job.video_id, index);
        let evidence = match self.ctx.evidence.encode(frame) {
            Ok(bytes) => self.ctx.evidence.persist(bytes, &hint).await,
            Err(e) => Err(e),
        };
        let evidence = match evidence {
            Ok(evidence) => evidence,
            Err(e) => {
                logger.log_warning(&format!("Failed to store evidence for frame {}: {}", index, e));
                metrics::record_violation("job", false);
                return;
            }
        };

        let frame_timestamp = match fps {
            Some(fps) if fps > 0.0 => index as f64 / fps,
            _ => 0.0,
        };
        let violation = JobViolation {
            violation_type: draft.violation_type,
            confidence_score: best.confidence_percent(),
            frame_timestamp,
            plate_number: draft.plate_number,
            bbox: best.bbox,
            evidence_path: evidence.reference().to_string(),
        };

        match self.ctx.backend.submit_job_violation(&job.video_id, &violation).await {
            Ok(()) => {
                info!(
                    video_id = %job.video_id,
                    frame = index,
                    violation_type = %violation.violation_type,
                    "Job violation reported"
                );
                metrics::record_violation("job", true);
            }
            Err(e) => {
                logger.log_warning(&format!("Failed to report violation on frame {}: {}", index, e));
                metrics::record_violation("job", false);
            }
        }
    }

    async fn report_status(&self, logger: &JobLogger, video_id: &str, update: StatusUpdate) {
        if let Err(e) = self.ctx.backend.update_video_status(video_id, &update).await {
            logger.log_warning(&format!("Failed to report status {}: {}", update.status, e));
        }
    }
}

/// Fixed pool of video job workers sharing one queue.
pub struct JobWorkerPool {
    ctx: JobContext,
}

impl JobWorkerPool {
    pub fn new(ctx: JobContext) -> Self {
        Self { ctx }
    }

    /// Run every worker until a stop is requested and all in-flight jobs finish.
    pub async fn run(&self, stop_rx: watch::Receiver<bool>) {
        let count = self.ctx.config.workers.max(1);
        info!(workers = count, "Starting video job workers");

        let handles: Vec<_> = (0..count)
            .map(|id| {
                let worker = VideoJobWorker::new(id, self.ctx.clone());
                let stop_rx = stop_rx.clone();
                tokio::spawn(async move { worker.run(stop_rx).await })
            })
            .collect();

        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Video job worker task failed");
            }
        }
        info!("Video job workers stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        FixedPolicy, OpenStep, RecordingBackend, ScriptedDetector, ScriptedOpener, ScriptedSource, SourceStep,
    };
    use guardian_media::SourceInfo;
    use guardian_models::{BoundingBox, ViolationType};
    use guardian_queue::MemoryJobQueue;
    use guardian_storage::{EvidenceConfig, FileEvidenceStore};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingHook {
        events: Mutex<Vec<(String, u64, u64)>>,
    }

    impl ProgressHook for RecordingHook {
        fn on_progress(&self, video_id: &str, processed: u64, total: u64) {
            self.events.lock().unwrap().push((video_id.to_string(), processed, total));
        }
    }

    struct Harness {
        queue: Arc<MemoryJobQueue>,
        opener: Arc<ScriptedOpener>,
        backend: Arc<RecordingBackend>,
        detector: Arc<ScriptedDetector>,
        hook: Arc<RecordingHook>,
        ctx: JobContext,
        dir: tempfile::TempDir,
    }

    fn harness(steps: Vec<OpenStep>, detector: ScriptedDetector, policy: FixedPolicy) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let queue = Arc::new(MemoryJobQueue::new());
        let opener = Arc::new(ScriptedOpener::new(steps));
        let backend = Arc::new(RecordingBackend::new());
        let detector = Arc::new(detector);
        let hook = Arc::new(RecordingHook::default());
        let evidence = FileEvidenceStore::new(EvidenceConfig {
            dir: dir.path().to_path_buf(),
            ..EvidenceConfig::default()
        });
        let ctx = JobContext {
            queue: queue.clone(),
            opener: opener.clone(),
            detector: detector.clone(),
            backend: backend.clone(),
            evidence: Arc::new(evidence),
            policy: Arc::new(policy),
            taxonomy: ClassTaxonomy::Coco,
            config: JobConfig::default(),
            progress: Some(hook.clone()),
        };
        Harness {
            queue,
            opener,
            backend,
            detector,
            hook,
            ctx,
            dir,
        }
    }

    fn v42_source() -> ScriptedSource {
        ScriptedSource::uniform(SourceInfo::new(64, 48, Some(10.0), Some(50)), 50)
    }

    #[tokio::test]
    async fn test_v42_scenario() {
        let h = harness(
            vec![OpenStep::Source(v42_source())],
            ScriptedDetector::empty(),
            FixedPolicy::never(),
        );
        let worker = VideoJobWorker::new(0, h.ctx.clone());

        let outcome = worker.process(&VideoJob::new("v42", "/tmp/v42.mp4")).await.unwrap();

        assert_eq!(
            outcome,
            JobOutcome::Completed {
                frames: 50,
                duration_seconds: 5.0
            }
        );
        assert_eq!(h.opener.opened(), vec!["/tmp/v42.mp4".to_string()]);
        assert_eq!(h.detector.frame_indices(), vec![0, 5, 10, 15, 20, 25, 30, 35, 40, 45]);
        let statuses = h.backend.statuses("v42");
        assert_eq!(statuses.len(), 2);
        assert_eq!(statuses[0], StatusUpdate::processing());
        assert_eq!(statuses[1], StatusUpdate::completed(5.0));
        assert_eq!(h.opener.released(), 1);
    }

    #[tokio::test]
    async fn test_progress_published_at_deciles() {
        let h = harness(
            vec![OpenStep::Source(v42_source())],
            ScriptedDetector::empty(),
            FixedPolicy::never(),
        );
        VideoJobWorker::new(0, h.ctx.clone())
            .process(&VideoJob::new("v42", "/tmp/v42.mp4"))
            .await
            .unwrap();

        let events = h.hook.events.lock().unwrap().clone();
        let processed: Vec<u64> = events.iter().map(|(_, p, _)| *p).collect();
        assert_eq!(processed, vec![5, 10, 15, 20, 25, 30, 35, 40, 45, 50]);
        assert!(events.iter().all(|(id, _, total)| id == "v42" && *total == 50));
    }

    #[tokio::test]
    async fn test_unopenable_file_reports_failed() {
        let h = harness(
            vec![OpenStep::Fail("No such file".into())],
            ScriptedDetector::empty(),
            FixedPolicy::never(),
        );

        let outcome = VideoJobWorker::new(0, h.ctx.clone())
            .process(&VideoJob::new("v7", "/missing.mp4"))
            .await
            .unwrap();

        assert_eq!(outcome, JobOutcome::Unopenable);
        assert_eq!(
            h.backend.status_sequence("v7"),
            vec![VideoJobStatus::Processing, VideoJobStatus::Failed]
        );
        assert_eq!(h.detector.calls(), 0);
    }

    #[tokio::test]
    async fn test_read_error_reports_failed() {
        let mut steps: Vec<SourceStep> = (0..3)
            .map(|i| SourceStep::Frame(Frame::filled(64, 48, i, 0)))
            .collect();
        steps.push(SourceStep::Error("corrupt packet".into()));
        let source = ScriptedSource::new(SourceInfo::new(64, 48, Some(25.0), Some(100)), steps);
        let h = harness(
            vec![OpenStep::Source(source)],
            ScriptedDetector::empty(),
            FixedPolicy::never(),
        );

        let result = VideoJobWorker::new(0, h.ctx.clone())
            .process(&VideoJob::new("v8", "/tmp/v8.mp4"))
            .await;

        assert!(result.is_err());
        assert_eq!(
            h.backend.status_sequence("v8"),
            vec![VideoJobStatus::Processing, VideoJobStatus::Failed]
        );
        assert_eq!(h.opener.released(), 1);
    }

    #[tokio::test]
    async fn test_violation_persists_evidence_and_reports() {
        let detections = vec![DetectionResult::new(2, 0.8765, BoundingBox::new(1.0, 2.0, 3.0, 4.0))];
        let h = harness(
            vec![OpenStep::Source(v42_source())],
            ScriptedDetector::always(detections),
            FixedPolicy::always(ViolationType::WrongWay),
        );

        VideoJobWorker::new(0, h.ctx.clone())
            .process(&VideoJob::new("v42", "/tmp/v42.mp4"))
            .await
            .unwrap();

        let violations = h.backend.job_violations("v42");
        assert_eq!(violations.len(), 10);
        let sixth = &violations[5];
        assert_eq!(sixth.violation_type, ViolationType::WrongWay);
        assert!((sixth.frame_timestamp - 2.5).abs() < 1e-9);
        assert!((sixth.confidence_score - 87.7).abs() < 1e-9);
        assert!(sixth.evidence_path.starts_with("/uploads/evidence/v42_25_"));

        let files = std::fs::read_dir(h.dir.path()).unwrap().count();
        assert_eq!(files, 10);
    }

    #[tokio::test]
    async fn test_detector_failure_does_not_fail_job() {
        let h = harness(
            vec![OpenStep::Source(v42_source())],
            ScriptedDetector::failing(),
            FixedPolicy::always(ViolationType::Speeding),
        );

        let outcome = VideoJobWorker::new(0, h.ctx.clone())
            .process(&VideoJob::new("v42", "/tmp/v42.mp4"))
            .await
            .unwrap();

        assert!(matches!(outcome, JobOutcome::Completed { frames: 50, .. }));
        assert!(h.backend.job_violations("v42").is_empty());
    }

    #[tokio::test]
    async fn test_status_update_failure_is_not_fatal() {
        let h = harness(
            vec![OpenStep::Source(v42_source())],
            ScriptedDetector::empty(),
            FixedPolicy::never(),
        );
        h.backend.set_fail_status(true);

        let outcome = VideoJobWorker::new(0, h.ctx.clone())
            .process(&VideoJob::new("v42", "/tmp/v42.mp4"))
            .await
            .unwrap();

        assert!(matches!(outcome, JobOutcome::Completed { .. }));
        assert_eq!(h.detector.calls(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_queue_makes_no_status_calls() {
        let h = harness(Vec::new(), ScriptedDetector::empty(), FixedPolicy::never());
        let worker = VideoJobWorker::new(0, h.ctx.clone());
        let (stop_tx, stop_rx) = watch::channel(false);

        let task = tokio::spawn(async move { worker.run(stop_rx).await });
        tokio::time::sleep(Duration::from_secs(95)).await;
        assert!(!task.is_finished());

        stop_tx.send(true).unwrap();
        task.await.unwrap();
        assert!(h.backend.calls().is_empty());
        assert_eq!(h.opener.opens(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_entry_skipped_without_cooldown() {
        let h = harness(
            vec![OpenStep::Source(v42_source())],
            ScriptedDetector::empty(),
            FixedPolicy::never(),
        );
        h.queue.push_raw("{not json").await;
        h.queue.enqueue(&VideoJob::new("v42", "/tmp/v42.mp4")).await.unwrap();

        let worker = VideoJobWorker::new(0, h.ctx.clone());
        let (stop_tx, stop_rx) = watch::channel(false);
        let started = tokio::time::Instant::now();
        let task = tokio::spawn(async move { worker.run(stop_rx).await });

        while h.backend.status_sequence("v42").len() < 2 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert!(started.elapsed() < Duration::from_secs(1));

        stop_tx.send(true).unwrap();
        task.await.unwrap();
        assert_eq!(
            h.backend.status_sequence("v42"),
            vec![VideoJobStatus::Processing, VideoJobStatus::Completed]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_error_cools_down_then_continues() {
        let steps = vec![
            SourceStep::Frame(Frame::filled(64, 48, 0, 0)),
            SourceStep::Error("corrupt packet".into()),
        ];
        let broken = ScriptedSource::new(SourceInfo::new(64, 48, Some(25.0), Some(100)), steps);
        let h = harness(
            vec![OpenStep::Source(broken), OpenStep::Source(v42_source())],
            ScriptedDetector::empty(),
            FixedPolicy::never(),
        );
        h.queue.enqueue(&VideoJob::new("v8", "/tmp/v8.mp4")).await.unwrap();
        h.queue.enqueue(&VideoJob::new("v42", "/tmp/v42.mp4")).await.unwrap();
        let cooldown = h.ctx.config.cooldown;

        let worker = VideoJobWorker::new(0, h.ctx.clone());
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(async move { worker.run(stop_rx).await });

        while h.backend.status_sequence("v8").len() < 2 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        let failed_at = tokio::time::Instant::now();
        while h.backend.status_sequence("v42").is_empty() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert!(failed_at.elapsed() >= cooldown);
        assert!(!task.is_finished());

        while h.backend.status_sequence("v42").len() < 2 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        stop_tx.send(true).unwrap();
        task.await.unwrap();

        assert_eq!(
            h.backend.status_sequence("v8"),
            vec![VideoJobStatus::Processing, VideoJobStatus::Failed]
        );
        assert_eq!(
            h.backend.status_sequence("v42"),
            vec![VideoJobStatus::Processing, VideoJobStatus::Completed]
        );
        assert_eq!(h.opener.released(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pool_drains_queue_across_workers() {
        let sources = (0..4).map(|_| OpenStep::Source(v42_source())).collect();
        let h = harness(sources, ScriptedDetector::empty(), FixedPolicy::never());
        for i in 0..4 {
            h.queue
                .enqueue(&VideoJob::new(format!("v{}", i), format!("/tmp/v{}.mp4", i)))
                .await
                .unwrap();
        }

        let pool = JobWorkerPool::new(h.ctx.clone());
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(async move { pool.run(stop_rx).await });

        while h.queue.len().await.unwrap() > 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        stop_tx.send(true).unwrap();
        task.await.unwrap();

        for i in 0..4 {
            assert_eq!(
                h.backend.status_sequence(&format!("v{}", i)),
                vec![VideoJobStatus::Processing, VideoJobStatus::Completed]
            );
        }
        assert_eq!(h.opener.opens(), 4);
    }
}

//! End-to-end video job processing through the in-memory queue.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use guardian_media::SourceInfo;
use guardian_models::{BoundingBox, ClassTaxonomy, DetectionResult, StatusUpdate, VideoJob, VideoJobStatus, ViolationType};
use guardian_queue::{JobQueue, MemoryJobQueue};
use guardian_storage::{EvidenceConfig, FileEvidenceStore};
use guardian_worker::testing::{
    FixedPolicy, OpenStep, RecordingBackend, ScriptedDetector, ScriptedOpener, ScriptedSource,
};
use guardian_worker::{JobConfig, JobContext, JobWorkerPool};

struct Pipeline {
    queue: Arc<MemoryJobQueue>,
    backend: Arc<RecordingBackend>,
    detector: Arc<ScriptedDetector>,
    ctx: JobContext,
    dir: tempfile::TempDir,
}

fn pipeline(steps: Vec<OpenStep>, detector: ScriptedDetector, policy: FixedPolicy) -> Pipeline {
    let dir = tempfile::tempdir().unwrap();
    let queue = Arc::new(MemoryJobQueue::new());
    let backend = Arc::new(RecordingBackend::new());
    let detector = Arc::new(detector);
    let ctx = JobContext {
        queue: queue.clone(),
        opener: Arc::new(ScriptedOpener::new(steps)),
        detector: detector.clone(),
        backend: backend.clone(),
        evidence: Arc::new(FileEvidenceStore::new(EvidenceConfig {
            dir: dir.path().to_path_buf(),
            ..EvidenceConfig::default()
        })),
        policy: Arc::new(policy),
        taxonomy: ClassTaxonomy::Coco,
        config: JobConfig {
            workers: 1,
            pop_timeout: Duration::from_millis(50),
            ..JobConfig::default()
        },
        progress: None,
    };
    Pipeline {
        queue,
        backend,
        detector,
        ctx,
        dir,
    }
}

async fn run_until(p: &Pipeline, done: impl Fn(&RecordingBackend) -> bool) {
    let pool = JobWorkerPool::new(p.ctx.clone());
    let (stop_tx, stop_rx) = watch::channel(false);
    let task = tokio::spawn(async move { pool.run(stop_rx).await });

    tokio::time::timeout(Duration::from_secs(10), async {
        while !done(&p.backend) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("pipeline did not finish in time");

    stop_tx.send(true).unwrap();
    task.await.unwrap();
}

fn v42_source() -> ScriptedSource {
    ScriptedSource::uniform(SourceInfo::new(64, 48, Some(10.0), Some(50)), 50)
}

#[tokio::test]
async fn test_v42_job_end_to_end() {
    let p = pipeline(
        vec![OpenStep::Source(v42_source())],
        ScriptedDetector::always(vec![DetectionResult::new(
            3,
            0.72,
            BoundingBox::new(10.0, 12.0, 40.0, 44.0),
        )]),
        FixedPolicy::always(ViolationType::NoHelmet),
    );
    p.queue
        .enqueue(&VideoJob::new("v42", "/tmp/v42.mp4"))
        .await
        .unwrap();

    run_until(&p, |b| b.status_sequence("v42").len() == 2).await;

    assert_eq!(
        p.backend.statuses("v42"),
        vec![StatusUpdate::processing(), StatusUpdate::completed(5.0)]
    );
    assert_eq!(p.detector.frame_indices(), vec![0, 5, 10, 15, 20, 25, 30, 35, 40, 45]);

    let violations = p.backend.job_violations("v42");
    assert_eq!(violations.len(), 10);
    for (i, violation) in violations.iter().enumerate() {
        assert_eq!(violation.violation_type, ViolationType::NoHelmet);
        assert!((violation.frame_timestamp - i as f64 * 0.5).abs() < 1e-9);
        let file_name = violation
            .evidence_path
            .strip_prefix("/uploads/evidence/")
            .unwrap();
        assert!(p.dir.path().join(file_name).exists());
    }
    assert_eq!(p.queue.len().await.unwrap(), 0);
}

#[tokio::test]
async fn test_bad_entries_do_not_stop_the_pool() {
    let p = pipeline(
        vec![
            OpenStep::Fail("No such file or directory".into()),
            OpenStep::Source(v42_source()),
        ],
        ScriptedDetector::empty(),
        FixedPolicy::never(),
    );
    p.queue.push_raw("not json at all").await;
    p.queue
        .enqueue(&VideoJob::new("gone", "/tmp/gone.mp4"))
        .await
        .unwrap();
    p.queue.push_raw(r#"{"videoId": "", "filePath": "/tmp/x.mp4"}"#).await;
    p.queue
        .enqueue(&VideoJob::new("v42", "/tmp/v42.mp4"))
        .await
        .unwrap();

    run_until(&p, |b| b.status_sequence("v42").len() == 2).await;

    assert_eq!(
        p.backend.status_sequence("gone"),
        vec![VideoJobStatus::Processing, VideoJobStatus::Failed]
    );
    assert_eq!(
        p.backend.status_sequence("v42"),
        vec![VideoJobStatus::Processing, VideoJobStatus::Completed]
    );
}

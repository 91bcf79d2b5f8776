//! Traffic monitoring worker binary.

use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

use guardian_backend::{BackendClient, HttpBackendClient};
use guardian_detector::{Detector, HttpDetector, SerializedDetector};
use guardian_media::{FfmpegOpener, FfmpegOpenerConfig, SourceOpener};
use guardian_queue::{JobQueue, RedisJobQueue};
use guardian_storage::{EvidenceConfig, FileEvidenceStore, InlineEvidenceStore};
use guardian_worker::logging::init_tracing;
use guardian_worker::metrics::init_metrics;
use guardian_worker::{
    create_router, FleetSupervisor, HealthState, JobContext, JobWorkerPool, RandomViolationPolicy,
    StreamContext, WorkerConfig,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider (required for rustls 0.23+)
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing();
    info!("Starting guardian-worker");

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    let metrics_handle = if config.health.metrics_enabled {
        info!("Prometheus metrics enabled at /metrics");
        Some(init_metrics()?)
    } else {
        None
    };

    let http_detector: Arc<dyn Detector> =
        Arc::new(HttpDetector::from_env().context("Failed to create detector client")?);
    let detector: Arc<dyn Detector> = if config.serialize_detector {
        Arc::new(SerializedDetector::new(http_detector))
    } else {
        http_detector
    };

    let backend: Arc<dyn BackendClient> =
        Arc::new(HttpBackendClient::from_env().context("Failed to create backend client")?);
    let queue: Arc<dyn JobQueue> =
        Arc::new(RedisJobQueue::from_env().context("Failed to create job queue")?);
    let opener: Arc<dyn SourceOpener> = Arc::new(FfmpegOpener::new(FfmpegOpenerConfig::from_env()));
    let evidence_config = EvidenceConfig::from_env();

    let stream_ctx = StreamContext {
        opener: opener.clone(),
        detector: detector.clone(),
        backend: backend.clone(),
        evidence: Arc::new(InlineEvidenceStore::new(evidence_config.jpeg_quality)),
        policy: Arc::new(RandomViolationPolicy::new(config.stream.trigger_probability)),
        taxonomy: config.taxonomy,
        config: config.stream.clone(),
    };
    let job_ctx = JobContext {
        queue: queue.clone(),
        opener,
        detector,
        backend,
        evidence: Arc::new(FileEvidenceStore::new(evidence_config)),
        policy: Arc::new(RandomViolationPolicy::new(config.jobs.trigger_probability)),
        taxonomy: config.taxonomy,
        config: config.jobs.clone(),
        progress: None,
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let fleet = Arc::new(FleetSupervisor::new(stream_ctx, config.fleet.clone()));
    let fleet_task = {
        let fleet = fleet.clone();
        let shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move { fleet.run(shutdown_rx).await })
    };

    let pool = JobWorkerPool::new(job_ctx);
    let pool_task = {
        let shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move { pool.run(shutdown_rx).await })
    };

    let app = create_router(
        HealthState {
            fleet,
            queue: Some(queue),
        },
        metrics_handle,
    );
    let addr: SocketAddr = format!("{}:{}", config.health.host, config.health.port)
        .parse()
        .context("Invalid bind address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Health endpoint listening on {}", addr);

    let mut server_shutdown = shutdown_rx.clone();
    let server_task = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                server_shutdown.wait_for(|stop| *stop).await.ok();
            })
            .await
    });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Received shutdown signal");
    shutdown_tx.send_replace(true);

    // Streams stop promptly; in-flight jobs are drained.
    if let Err(e) = fleet_task.await {
        error!("Fleet supervisor task failed: {}", e);
    }
    if let Err(e) = pool_task.await {
        error!("Job worker pool task failed: {}", e);
    }
    match server_task.await {
        Ok(Err(e)) => error!("Health server error: {}", e),
        Err(e) => error!("Health server task failed: {}", e),
        Ok(Ok(())) => {}
    }

    info!("Worker shutdown complete");
    Ok(())
}

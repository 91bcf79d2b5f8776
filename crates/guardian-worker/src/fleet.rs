//! Fleet reconciliation.
//!
//! The supervisor polls the camera registry and keeps exactly one stream
//! worker per `ONLINE` camera. Membership is only mutated while holding the
//! supervisor's lock, so overlapping reconciliations cannot start duplicates.
//! Workers are joined after the lock is released; a camera whose worker is
//! still draining is not restarted until the join completes.

use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn, Instrument};

use guardian_models::CameraStatus;

use crate::config::FleetConfig;
use crate::error::WorkerResult;
use crate::metrics;
use crate::retry::FailureTracker;
use crate::stream::{StreamContext, StreamExit, StreamHealth, StreamTarget, StreamWorker};

/// Cancellation and join handles for one running stream worker.
pub struct WorkerHandle {
    cancel: watch::Sender<bool>,
    task: JoinHandle<StreamExit>,
    health: watch::Receiver<StreamHealth>,
}

impl WorkerHandle {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub fn health(&self) -> StreamHealth {
        self.health.borrow().clone()
    }

    /// Request cancellation without waiting.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    async fn join(self) -> Option<StreamExit> {
        match self.task.await {
            Ok(exit) => Some(exit),
            Err(e) => {
                warn!(error = %e, "Stream worker task failed");
                None
            }
        }
    }
}

/// Camera id to running worker.
#[derive(Default)]
pub struct FleetMembership {
    workers: HashMap<String, WorkerHandle>,
    draining: HashSet<String>,
}

impl FleetMembership {
    /// Register a worker. Returns `false` (and keeps the existing one) if
    /// the camera already has a worker.
    pub fn add(&mut self, camera_id: &str, handle: WorkerHandle) -> bool {
        if self.workers.contains_key(camera_id) {
            handle.cancel();
            return false;
        }
        self.workers.insert(camera_id.to_string(), handle);
        true
    }

    pub fn remove(&mut self, camera_id: &str) -> Option<WorkerHandle> {
        self.workers.remove(camera_id)
    }

    pub fn contains(&self, camera_id: &str) -> bool {
        self.workers.contains_key(camera_id)
    }

    /// Remove and cancel a worker. The camera stays draining until
    /// `finish_stop` is called for it.
    pub fn begin_stop(&mut self, camera_id: &str) -> Option<WorkerHandle> {
        let handle = self.workers.remove(camera_id)?;
        handle.cancel();
        self.draining.insert(camera_id.to_string());
        Some(handle)
    }

    pub fn finish_stop(&mut self, camera_id: &str) {
        self.draining.remove(camera_id);
    }

    /// A stopped worker for this camera has not exited yet.
    pub fn is_draining(&self, camera_id: &str) -> bool {
        self.draining.contains(camera_id)
    }

    /// Remove workers whose task already ended.
    pub fn reap_finished(&mut self) -> Vec<(String, WorkerHandle)> {
        let finished: Vec<String> = self
            .workers
            .iter()
            .filter(|(_, h)| h.is_finished())
            .map(|(id, _)| id.clone())
            .collect();

        finished
            .into_iter()
            .filter_map(|id| self.workers.remove(&id).map(|h| (id, h)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn camera_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.workers.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Health of every registered worker, ordered by camera id.
    pub fn health(&self) -> Vec<StreamHealth> {
        let mut health: Vec<StreamHealth> = self.workers.values().map(WorkerHandle::health).collect();
        health.sort_by(|a, b| a.camera_id.cmp(&b.camera_id));
        health
    }

    fn drain(&mut self) -> Vec<(String, WorkerHandle)> {
        self.workers.drain().collect()
    }
}

/// What one reconciliation pass changed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub started: Vec<String>,
    pub stopped: Vec<String>,
    pub reaped: Vec<String>,
    /// Descriptors without a source address
    pub skipped_no_source: usize,
    /// Descriptors without a usable id
    pub skipped_invalid: usize,
}

impl ReconcileReport {
    pub fn changed(&self) -> bool {
        !(self.started.is_empty() && self.stopped.is_empty() && self.reaped.is_empty())
    }
}

/// Keeps one stream worker per online camera.
pub struct FleetSupervisor {
    ctx: StreamContext,
    config: FleetConfig,
    membership: Mutex<FleetMembership>,
}

impl FleetSupervisor {
    pub fn new(ctx: StreamContext, config: FleetConfig) -> Self {
        Self {
            ctx,
            config,
            membership: Mutex::new(FleetMembership::default()),
        }
    }

    /// Fetch the camera list and start or stop workers to match it.
    pub async fn reconcile(&self) -> WorkerResult<ReconcileReport> {
        let cameras = self.ctx.backend.fetch_cameras().await?;

        let mut report = ReconcileReport::default();
        let reaped;
        let mut stopping = Vec::new();
        {
            let mut membership = self.membership.lock().await;
            reaped = membership.reap_finished();

            for camera in &cameras {
                if camera.source().is_none() {
                    report.skipped_no_source += 1;
                    continue;
                }
                let Some(camera_id) = camera.camera_id() else {
                    warn!(name = %camera.display_name(), "Skipping camera without id");
                    report.skipped_invalid += 1;
                    continue;
                };

                match camera.status {
                    CameraStatus::Online
                        if !membership.contains(camera_id) && !membership.is_draining(camera_id) =>
                    {
                        let Some(target) = StreamTarget::from_descriptor(camera) else {
                            report.skipped_invalid += 1;
                            continue;
                        };
                        info!(camera_id = %camera_id, source = %target.source, "Starting stream worker");
                        if membership.add(camera_id, self.spawn_worker(target)) {
                            report.started.push(camera_id.to_string());
                        }
                    }
                    CameraStatus::Offline => {
                        if let Some(handle) = membership.begin_stop(camera_id) {
                            info!(camera_id = %camera_id, "Camera offline, stopping stream worker");
                            stopping.push((camera_id.to_string(), handle));
                        }
                    }
                    _ => {}
                }
            }

            metrics::set_active_streams(membership.len());
        }

        for (camera_id, handle) in reaped {
            let exit = handle.join().await;
            debug!(camera_id = %camera_id, exit = ?exit, "Reaped stream worker");
            report.reaped.push(camera_id);
        }

        let stopped = stopping.iter().map(|(id, _)| id.clone()).collect::<Vec<_>>();
        for (camera_id, handle) in stopping {
            let exit = handle.join().await;
            debug!(camera_id = %camera_id, exit = ?exit, "Stopped stream worker");
        }
        if !stopped.is_empty() {
            let mut membership = self.membership.lock().await;
            for camera_id in &stopped {
                membership.finish_stop(camera_id);
            }
        }
        report.stopped = stopped;

        Ok(report)
    }

    fn spawn_worker(&self, target: StreamTarget) -> WorkerHandle {
        let (cancel, cancel_rx) = watch::channel(false);
        let camera_id = target.camera_id.clone();
        let worker = StreamWorker::new(target, self.ctx.clone(), cancel_rx);
        let health = worker.health();
        let backend = self.ctx.backend.clone();
        let notify_offline = self.config.notify_offline;

        let span = tracing::info_span!("stream", camera_id = %camera_id);
        let task = tokio::spawn(
            async move {
                let exit = worker.run().await;
                if let StreamExit::Exhausted { attempts } = exit {
                    warn!(attempts, "Camera offline");
                    if notify_offline {
                        if let Err(e) = backend.report_offline(&camera_id).await {
                            warn!(error = %e, "Failed to report camera offline");
                        }
                    }
                }
                exit
            }
            .instrument(span),
        );

        WorkerHandle {
            cancel,
            task,
            health,
        }
    }

    /// Reconcile every poll interval until shutdown, then stop every worker.
    pub async fn run(&self, mut shutdown_rx: watch::Receiver<bool>) {
        let period = self.config.poll_interval.max(Duration::from_millis(10));
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut polls = FailureTracker::new("camera_registry_poll", 3);

        info!(poll_secs = period.as_secs_f64(), "Fleet supervisor started");

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.reconcile().await {
                        Ok(report) => {
                            polls.record_success();
                            if report.changed() {
                                let active = self.active_streams().await;
                                info!(
                                    started = report.started.len(),
                                    stopped = report.stopped.len(),
                                    reaped = report.reaped.len(),
                                    active,
                                    "Fleet reconciled"
                                );
                            }
                        }
                        Err(e) => {
                            polls.record_failure(&e);
                        }
                    }
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        self.shutdown_all().await;
    }

    /// Cancel every worker and wait for all of them.
    pub async fn shutdown_all(&self) {
        let workers = {
            let mut membership = self.membership.lock().await;
            let workers = membership.drain();
            for (_, handle) in &workers {
                handle.cancel();
            }
            metrics::set_active_streams(0);
            workers
        };
        info!(count = workers.len(), "Stopping stream workers");

        for (camera_id, handle) in workers {
            let exit = handle.join().await;
            debug!(camera_id = %camera_id, exit = ?exit, "Stream worker joined");
        }
    }

    pub async fn active_streams(&self) -> usize {
        self.membership.lock().await.len()
    }

    pub async fn camera_ids(&self) -> Vec<String> {
        self.membership.lock().await.camera_ids()
    }

    /// Health of every running stream.
    pub async fn snapshot(&self) -> Vec<StreamHealth> {
        self.membership.lock().await.health()
    }
}

//! Traffic monitoring worker.
//!
//! This crate provides:
//! - Per-camera stream workers with reconnect, freeze detection and heartbeats
//! - A fleet supervisor reconciling workers against the camera registry
//! - A pool of uploaded-video job workers fed from the job queue
//! - Violation sampling policy
//! - Health and Prometheus endpoints
//! - In-process fakes for tests (`testing` feature)

pub mod config;
pub mod error;
pub mod fleet;
pub mod health;
pub mod jobs;
pub mod logging;
pub mod metrics;
pub mod policy;
pub mod retry;
pub mod stream;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::{FleetConfig, HealthConfig, JobConfig, StreamConfig, WorkerConfig};
pub use error::{WorkerError, WorkerResult};
pub use fleet::{FleetMembership, FleetSupervisor, ReconcileReport, WorkerHandle};
pub use health::{create_router, HealthState};
pub use jobs::{JobContext, JobOutcome, JobWorkerPool, ProgressHook, VideoJobWorker};
pub use logging::JobLogger;
pub use policy::{RandomViolationPolicy, ViolationDraft, ViolationPolicy};
pub use stream::{StreamContext, StreamExit, StreamHealth, StreamState, StreamTarget, StreamWorker};

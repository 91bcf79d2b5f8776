//! Video job queue.
//!
//! This crate provides:
//! - The `JobQueue` trait consumed by video job workers
//! - A Redis list implementation (`LPUSH` producers, `BRPOP` consumers)
//! - An in-process implementation for tests and single-node tooling

pub mod error;
pub mod memory;
pub mod queue;

pub use error::{QueueError, QueueResult};
pub use memory::MemoryJobQueue;
pub use queue::{decode_job, JobQueue, QueueConfig, RedisJobQueue};

//! Live camera streams.
//!
//! One `StreamWorker` per camera: it connects, reads frames, tracks FPS and
//! freezes, runs detection, sends heartbeats and samples violations, then
//! reconnects with a fixed backoff until it is cancelled or runs out of
//! retries.

pub mod session;
pub mod worker;

pub use session::{StreamHealth, StreamSession, StreamState};
pub use worker::{StreamContext, StreamExit, StreamTarget, StreamWorker};

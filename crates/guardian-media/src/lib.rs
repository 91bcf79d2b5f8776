//! Frame capture for camera streams and recorded videos.
//!
//! This crate provides:
//! - Raw RGB frames and the freeze-comparison region
//! - `FrameSource` / `SourceOpener` traits, the seam workers read through
//! - An FFmpeg-backed implementation for RTSP/HTTP streams and local files
//! - FFprobe metadata (dimensions, fps, frame count)

pub mod capture;
pub mod error;
pub mod frame;
pub mod probe;
pub mod source;

pub use capture::{FfmpegCapture, FfmpegOpener, FfmpegOpenerConfig};
pub use error::{MediaError, MediaResult};
pub use frame::{Frame, FREEZE_REGION_SIZE};
pub use probe::{probe_source, SourceInfo};
pub use source::{FrameSource, SourceOpener};

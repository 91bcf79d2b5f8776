//! Shared data models for the Neon Guardian AI service.
//!
//! This crate provides Serde-serializable types for:
//! - Camera descriptors and heartbeats exchanged with the backend
//! - Detector output (classes, confidences, bounding boxes)
//! - Class taxonomies mapping detector classes to vehicle tags
//! - Live and video-scoped violation events
//! - Batch video jobs and their status lifecycle

pub mod camera;
pub mod detection;
pub mod taxonomy;
pub mod video_job;
pub mod violation;

// Re-export common types
pub use camera::{CameraDescriptor, CameraStatus, GeoPoint, Heartbeat};
pub use detection::{BoundingBox, DetectionResult};
pub use taxonomy::{ClassTaxonomy, UnknownTaxonomy};
pub use video_job::{InvalidTransition, StatusUpdate, VideoJob, VideoJobStatus};
pub use violation::{EvidenceRef, JobViolation, ViolationEvent, ViolationType};

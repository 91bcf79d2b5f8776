//! Evidence storage.
//!
//! This crate provides:
//! - JPEG encoding of captured frames
//! - Collision-free evidence naming within a process
//! - Inline (multipart upload) and file-backed evidence stores

pub mod encode;
pub mod error;
pub mod naming;
pub mod store;

pub use encode::{encode_jpeg, DEFAULT_JPEG_QUALITY};
pub use error::{StorageError, StorageResult};
pub use naming::evidence_file_name;
pub use store::{EvidenceConfig, EvidenceStore, FileEvidenceStore, InlineEvidenceStore};

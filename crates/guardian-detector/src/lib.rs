//! Object detection.
//!
//! This crate provides:
//! - The `Detector` trait every worker runs frames through
//! - An HTTP client for the inference service with retry
//! - A serializing wrapper for detectors that are not safe to call concurrently

pub mod detector;
pub mod error;
pub mod http;
pub mod retry;

pub use detector::{Detector, SerializedDetector};
pub use error::{DetectorError, DetectorResult};
pub use http::{HttpDetector, HttpDetectorConfig};
pub use retry::RetryConfig;

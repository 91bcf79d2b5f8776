//! Violation events reported to the backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::camera::GeoPoint;
use crate::detection::BoundingBox;

/// Kind of traffic infraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ViolationType {
    #[serde(rename = "SPEEDING")]
    Speeding,
    #[serde(rename = "RED LIGHT")]
    RedLight,
    #[serde(rename = "WRONG WAY")]
    WrongWay,
    #[serde(rename = "NO HELMET")]
    NoHelmet,
    #[serde(rename = "LANE VIOLATION")]
    LaneViolation,
}

impl ViolationType {
    pub const ALL: [ViolationType; 5] = [
        ViolationType::Speeding,
        ViolationType::RedLight,
        ViolationType::WrongWay,
        ViolationType::NoHelmet,
        ViolationType::LaneViolation,
    ];

    /// Backend wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationType::Speeding => "SPEEDING",
            ViolationType::RedLight => "RED LIGHT",
            ViolationType::WrongWay => "WRONG WAY",
            ViolationType::NoHelmet => "NO HELMET",
            ViolationType::LaneViolation => "LANE VIOLATION",
        }
    }
}

impl fmt::Display for ViolationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where the evidence image for a violation lives.
#[derive(Debug, Clone, PartialEq)]
pub enum EvidenceRef {
    /// Encoded image shipped with the report as a multipart file part
    Upload {
        file_name: String,
        content_type: String,
        bytes: Vec<u8>,
    },
    /// Image written to shared storage; `relative` is what the backend serves
    File { path: PathBuf, relative: String },
}

impl EvidenceRef {
    /// Reference string suitable for a JSON report.
    pub fn reference(&self) -> &str {
        match self {
            EvidenceRef::Upload { file_name, .. } => file_name,
            EvidenceRef::File { relative, .. } => relative,
        }
    }
}

/// A violation observed on a live camera stream.
#[derive(Debug, Clone, PartialEq)]
pub struct ViolationEvent {
    pub violation_type: ViolationType,
    pub plate_number: String,
    /// Vehicle tag from the class taxonomy (`CAR`, `MOTORCYCLE`, ...)
    pub vehicle_type: String,
    /// Detection confidence [0, 1]
    pub confidence: f32,
    /// Synthetic threat score [0, 100]
    pub severity: f64,
    pub camera_id: String,
    pub location: GeoPoint,
    /// Seconds since the stream session started
    pub timestamp_offset: f64,
    pub bbox: BoundingBox,
    pub captured_at: DateTime<Utc>,
    pub evidence: EvidenceRef,
}

/// A violation found while processing an uploaded video.
///
/// Serializes to the `POST /videos/{id}/violations` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobViolation {
    pub violation_type: ViolationType,
    /// Confidence percentage [0, 100]
    #[serde(rename = "confidenceScore")]
    pub confidence_score: f64,
    /// Position in the video, seconds
    pub frame_timestamp: f64,
    pub plate_number: String,
    #[serde(rename = "boundingBox")]
    pub bbox: BoundingBox,
    #[serde(rename = "evidenceImagePath")]
    pub evidence_path: String,
}

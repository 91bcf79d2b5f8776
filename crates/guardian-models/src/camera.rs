//! Camera registry models.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Declared camera status as reported by the backend registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CameraStatus {
    /// Camera should be streamed
    Online,
    /// Camera should not be streamed
    Offline,
    /// Any status this service does not act on
    #[default]
    #[serde(other)]
    Unknown,
}

impl CameraStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CameraStatus::Online => "ONLINE",
            CameraStatus::Offline => "OFFLINE",
            CameraStatus::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for CameraStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Geographic location of a camera.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self {
            lat: Some(lat),
            lng: Some(lng),
        }
    }
}

/// A camera entry from `GET /cameras`.
///
/// Every field is optional on the wire; entries without an id or a source
/// address are skipped by the fleet supervisor rather than rejected as a
/// whole list.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraDescriptor {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    /// Stream URI (RTSP/HTTP) or local file path
    #[serde(default, rename = "rtspUrl")]
    pub source_address: Option<String>,
    #[serde(default)]
    pub status: CameraStatus,
    #[serde(default)]
    pub location_lat: Option<f64>,
    #[serde(default)]
    pub location_lng: Option<f64>,
}

impl CameraDescriptor {
    /// Build an online descriptor (mostly useful for tests and tooling).
    pub fn online(id: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            source_address: Some(source.into()),
            status: CameraStatus::Online,
            ..Default::default()
        }
    }

    /// Camera id, if present and non-empty.
    pub fn camera_id(&self) -> Option<&str> {
        self.id.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    /// Source address, if present and non-empty.
    pub fn source(&self) -> Option<&str> {
        self.source_address
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn location(&self) -> GeoPoint {
        GeoPoint {
            lat: self.location_lat,
            lng: self.location_lng,
        }
    }

    /// Human readable name for logs, falling back to the id.
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.id.as_deref())
            .unwrap_or("<unnamed>")
    }
}

/// Stream health heartbeat body for `POST /cameras/{id}/heartbeat`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub fps: f64,
    pub latency_ms: u64,
    pub failure_count: u64,
}

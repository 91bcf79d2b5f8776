//! Detector output types.

use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }
}

/// A single detection produced by the detector for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    /// Model class id (meaning depends on the configured taxonomy)
    pub class_id: u32,
    /// Detection confidence [0, 1]
    pub confidence: f32,
    pub bbox: BoundingBox,
}

impl DetectionResult {
    pub fn new(class_id: u32, confidence: f32, bbox: BoundingBox) -> Self {
        Self {
            class_id,
            confidence,
            bbox,
        }
    }

    /// Confidence as a percentage rounded to one decimal place.
    pub fn confidence_percent(&self) -> f64 {
        ((self.confidence as f64) * 1000.0).round() / 10.0
    }

    /// Pick the highest-confidence detection.
    pub fn best<'a, I>(detections: I) -> Option<&'a DetectionResult>
    where
        I: IntoIterator<Item = &'a DetectionResult>,
    {
        detections
            .into_iter()
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
    }
}

//! Detector class taxonomies.
//!
//! The detector only returns class ids; which ids count as traffic
//! participants and what vehicle tag they map to is configured here. Two
//! model families are deployed: the stock COCO-trained YOLO weights and the
//! six-class custom traffic model.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Class-id to vehicle-tag mapping for a detector model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ClassTaxonomy {
    /// Generic 80-class COCO model
    #[default]
    Coco,
    /// Custom six-class traffic model
    Traffic,
}

/// COCO ids considered relevant: car, motorcycle, bus, truck.
const COCO_RELEVANT: &[(u32, &str)] = &[(2, "CAR"), (3, "MOTORCYCLE"), (5, "BUS"), (7, "TRUCK")];

/// Custom model ids. Class 4 (`helmet`) is a compliant rider and is not
/// relevant for violations.
const TRAFFIC_RELEVANT: &[(u32, &str)] = &[
    (0, "CAR"),
    (1, "MOTORCYCLE"),
    (2, "BUS"),
    (3, "TRUCK"),
    (5, "MOTORCYCLE"),
];

const TRAFFIC_CLASS_NAMES: &[&str] = &["car", "motorcycle", "bus", "truck", "helmet", "no_helmet"];

impl ClassTaxonomy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClassTaxonomy::Coco => "coco",
            ClassTaxonomy::Traffic => "traffic",
        }
    }

    fn table(&self) -> &'static [(u32, &'static str)] {
        match self {
            ClassTaxonomy::Coco => COCO_RELEVANT,
            ClassTaxonomy::Traffic => TRAFFIC_RELEVANT,
        }
    }

    /// Whether detections of this class can trigger a violation.
    pub fn is_relevant(&self, class_id: u32) -> bool {
        self.table().iter().any(|(id, _)| *id == class_id)
    }

    /// All relevant class ids.
    pub fn relevant_classes(&self) -> Vec<u32> {
        self.table().iter().map(|(id, _)| *id).collect()
    }

    /// Vehicle tag reported to the backend (`CAR`, `MOTORCYCLE`, ...).
    pub fn vehicle_tag(&self, class_id: u32) -> &'static str {
        self.table()
            .iter()
            .find(|(id, _)| *id == class_id)
            .map(|(_, tag)| *tag)
            .unwrap_or("UNKNOWN")
    }

    /// Raw model class name, where known.
    pub fn class_name(&self, class_id: u32) -> Option<&'static str> {
        match self {
            ClassTaxonomy::Coco => match class_id {
                0 => Some("person"),
                1 => Some("bicycle"),
                2 => Some("car"),
                3 => Some("motorcycle"),
                5 => Some("bus"),
                7 => Some("truck"),
                _ => None,
            },
            ClassTaxonomy::Traffic => TRAFFIC_CLASS_NAMES.get(class_id as usize).copied(),
        }
    }

    /// Whether the custom model flagged a rider without a helmet.
    pub fn is_helmetless_rider(&self, class_id: u32) -> bool {
        matches!(self, ClassTaxonomy::Traffic) && class_id == 5
    }
}

impl fmt::Display for ClassTaxonomy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("Unknown class taxonomy: {0}")]
pub struct UnknownTaxonomy(pub String);

impl FromStr for ClassTaxonomy {
    type Err = UnknownTaxonomy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "coco" | "yolov8" | "generic" => Ok(ClassTaxonomy::Coco),
            "traffic" | "custom" => Ok(ClassTaxonomy::Traffic),
            other => Err(UnknownTaxonomy(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coco_relevance() {
        let tax = ClassTaxonomy::Coco;
        assert!(tax.is_relevant(2));
        assert!(tax.is_relevant(7));
        assert!(!tax.is_relevant(0));
        assert_eq!(tax.vehicle_tag(3), "MOTORCYCLE");
        assert_eq!(tax.vehicle_tag(0), "UNKNOWN");
        assert_eq!(tax.relevant_classes(), vec![2, 3, 5, 7]);
    }

    #[test]
    fn test_traffic_taxonomy() {
        let tax = ClassTaxonomy::Traffic;
        assert!(!tax.is_relevant(4));
        assert!(tax.is_relevant(5));
        assert!(tax.is_helmetless_rider(5));
        assert!(!ClassTaxonomy::Coco.is_helmetless_rider(5));
        assert_eq!(tax.class_name(5), Some("no_helmet"));
        assert_eq!(tax.class_name(6), None);
    }

    #[test]
    fn test_parse() {
        assert_eq!("COCO".parse::<ClassTaxonomy>().unwrap(), ClassTaxonomy::Coco);
        assert_eq!(" custom ".parse::<ClassTaxonomy>().unwrap(), ClassTaxonomy::Traffic);
        assert!("imagenet".parse::<ClassTaxonomy>().is_err());
    }
}

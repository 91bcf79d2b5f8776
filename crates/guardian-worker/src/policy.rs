//! Violation sampling policy.
//!
//! Violations are synthesized: detection only tells us a vehicle is in
//! frame. The policy decides whether an analysed frame produces a report and
//! what that report says, so a real rule engine can replace it later.

use guardian_models::{ClassTaxonomy, DetectionResult, ViolationType};
use rand::seq::IndexedRandom;
use rand::Rng;

/// Details synthesized for a selected detection.
#[derive(Debug, Clone, PartialEq)]
pub struct ViolationDraft {
    pub violation_type: ViolationType,
    pub plate_number: String,
    /// Threat score [0, 100]
    pub severity: f64,
}

pub trait ViolationPolicy: Send + Sync {
    /// Draw whether a frame with relevant detections produces a violation.
    fn should_trigger(&self) -> bool;

    /// Synthesize the violation for the chosen detection.
    fn draft(&self, detection: &DetectionResult, taxonomy: ClassTaxonomy) -> ViolationDraft;
}

/// Uniform random trigger with random type, plate and severity.
#[derive(Debug, Clone)]
pub struct RandomViolationPolicy {
    probability: f64,
}

impl RandomViolationPolicy {
    pub fn new(probability: f64) -> Self {
        Self {
            probability: probability.clamp(0.0, 1.0),
        }
    }

    pub fn probability(&self) -> f64 {
        self.probability
    }
}

impl ViolationPolicy for RandomViolationPolicy {
    fn should_trigger(&self) -> bool {
        rand::random::<f64>() < self.probability
    }

    fn draft(&self, detection: &DetectionResult, taxonomy: ClassTaxonomy) -> ViolationDraft {
        let mut rng = rand::rng();

        // The custom model sees helmets directly; everything else is a guess.
        let violation_type = if taxonomy.is_helmetless_rider(detection.class_id) {
            ViolationType::NoHelmet
        } else {
            *ViolationType::ALL
                .choose(&mut rng)
                .unwrap_or(&ViolationType::Speeding)
        };

        let severity: f64 = rng.random_range(20.0..=95.0);

        ViolationDraft {
            violation_type,
            plate_number: generate_mock_plate(&mut rng),
            severity: (severity * 10.0).round() / 10.0,
        }
    }
}

/// Plate in the `ABC-123` format.
pub fn generate_mock_plate<R: Rng + ?Sized>(rng: &mut R) -> String {
    const LETTERS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
    const DIGITS: &[u8] = b"0123456789";

    let mut plate = String::with_capacity(7);
    for _ in 0..3 {
        plate.push(LETTERS[rng.random_range(0..LETTERS.len())] as char);
    }
    plate.push('-');
    for _ in 0..3 {
        plate.push(DIGITS[rng.random_range(0..DIGITS.len())] as char);
    }
    plate
}

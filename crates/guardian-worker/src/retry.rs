//! Log suppression for repeated background failures.

use std::fmt::Display;
use tracing::{info, warn};

/// Tracks consecutive failures of a recurring call (heartbeats, registry
/// polls) and stops logging each one after the first few.
#[derive(Debug)]
pub struct FailureTracker {
    label: &'static str,
    consecutive_failures: u32,
    max_logged_failures: u32,
}

impl FailureTracker {
    pub fn new(label: &'static str, max_logged_failures: u32) -> Self {
        Self {
            label,
            consecutive_failures: 0,
            max_logged_failures,
        }
    }

    /// Record a success, logging recovery if failures had been suppressed.
    pub fn record_success(&mut self) {
        if self.consecutive_failures > self.max_logged_failures {
            info!(
                operation = self.label,
                failures = self.consecutive_failures,
                "Recovered after consecutive failures"
            );
        }
        self.consecutive_failures = 0;
    }

    /// Record a failure. Returns `true` if it was logged.
    pub fn record_failure(&mut self, error: &dyn Display) -> bool {
        self.consecutive_failures += 1;

        if self.consecutive_failures <= self.max_logged_failures {
            warn!(operation = self.label, attempt = self.consecutive_failures, "{} failed: {}", self.label, error);
            true
        } else {
            if self.consecutive_failures == self.max_logged_failures + 1 {
                warn!(
                    operation = self.label,
                    "Suppressing further {} failure logs after {} consecutive failures",
                    self.label,
                    self.max_logged_failures
                );
            }
            false
        }
    }

    pub fn failure_count(&self) -> u32 {
        self.consecutive_failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_tracker_suppression() {
        let mut tracker = FailureTracker::new("heartbeat", 2);
        assert!(tracker.record_failure(&"timeout"));
        assert!(tracker.record_failure(&"timeout"));
        assert!(!tracker.record_failure(&"timeout"));
        assert!(!tracker.record_failure(&"timeout"));
        assert_eq!(tracker.failure_count(), 4);

        tracker.record_success();
        assert_eq!(tracker.failure_count(), 0);
        assert!(tracker.record_failure(&"refused"));
    }
}

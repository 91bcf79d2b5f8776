//! Detector trait and wrappers.

use async_trait::async_trait;
use guardian_media::Frame;
use guardian_models::DetectionResult;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::DetectorResult;

/// Maps a frame to classified, confidence-scored boxes.
#[async_trait]
pub trait Detector: Send + Sync {
    async fn detect(&self, frame: &Frame) -> DetectorResult<Vec<DetectionResult>>;
}

/// Allows at most one inference in flight on the wrapped detector.
///
/// Used for models that are shared across workers but not safe to run
/// concurrently.
pub struct SerializedDetector {
    inner: Arc<dyn Detector>,
    slot: Mutex<()>,
}

impl SerializedDetector {
    pub fn new(inner: Arc<dyn Detector>) -> Self {
        Self {
            inner,
            slot: Mutex::new(()),
        }
    }
}

#[async_trait]
impl Detector for SerializedDetector {
    async fn detect(&self, frame: &Frame) -> DetectorResult<Vec<DetectionResult>> {
        let _slot = self.slot.lock().await;
        self.inner.detect(frame).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use guardian_models::BoundingBox;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct SlowDetector {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl Detector for SlowDetector {
        async fn detect(&self, _frame: &Frame) -> DetectorResult<Vec<DetectionResult>> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(vec![DetectionResult::new(2, 0.9, BoundingBox::new(0.0, 0.0, 1.0, 1.0))])
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_serialized_detector_single_slot() {
        let inner = Arc::new(SlowDetector {
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let detector = Arc::new(SerializedDetector::new(inner.clone()));

        let mut handles = Vec::new();
        for i in 0..4 {
            let detector = detector.clone();
            handles.push(tokio::spawn(async move {
                detector.detect(&Frame::filled(4, 4, i, 0)).await
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap().len(), 1);
        }
        assert_eq!(inner.peak.load(Ordering::SeqCst), 1);
    }
}

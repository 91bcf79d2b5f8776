//! Retry with exponential backoff and jitter.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::error::DetectorResult;

/// Retry policy configuration.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts.
    pub max_retries: u32,
    /// Base delay for exponential backoff (in milliseconds).
    pub base_delay_ms: u64,
    /// Maximum delay cap (in milliseconds).
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        // Detection sits on the frame loop; keep retries short.
        Self {
            max_retries: 1,
            base_delay_ms: 50,
            max_delay_ms: 500,
        }
    }
}

impl RetryConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_retries: std::env::var("DETECTOR_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_retries),
            base_delay_ms: std::env::var("DETECTOR_RETRY_BASE_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.base_delay_ms),
            max_delay_ms: defaults.max_delay_ms,
        }
    }

    /// No retries at all.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }
}

/// Execute an async operation, retrying retryable failures.
pub async fn with_retry<T, F, Fut>(config: &RetryConfig, operation: &str, op: F) -> DetectorResult<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = DetectorResult<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < config.max_retries => {
                let delay = calculate_delay(config, attempt);
                warn!(
                    operation = %operation,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    "Detector call failed, retrying: {}",
                    e
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Exponential backoff with full jitter, floored at the base delay.
fn calculate_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let exp_delay = config
        .base_delay_ms
        .saturating_mul(2u64.saturating_pow(attempt));
    let capped = exp_delay.min(config.max_delay_ms);
    let jittered = if capped > 0 {
        rand::rng().random_range(0..=capped)
    } else {
        0
    };
    Duration::from_millis(jittered.max(config.base_delay_ms))
}

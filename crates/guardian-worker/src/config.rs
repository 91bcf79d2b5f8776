//! Worker configuration.

use guardian_models::ClassTaxonomy;
use std::str::FromStr;
use std::time::Duration;

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|s| *s >= 0.0)
        .map(Duration::from_secs_f64)
        .unwrap_or(default)
}

fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(default)
}

/// Per-camera stream settings.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Failed connection attempts before a worker gives up
    pub max_retries: u32,
    /// Fixed wait between connection attempts
    pub backoff: Duration,
    /// Minimum time between heartbeats
    pub heartbeat_interval: Duration,
    /// Identical-region duration after which a stream counts as frozen
    pub freeze_threshold: Duration,
    /// Frame timestamps kept for FPS
    pub fps_window: usize,
    /// Chance that an analysed frame with relevant detections yields a violation
    pub trigger_probability: f64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            backoff: Duration::from_secs(5),
            heartbeat_interval: Duration::from_secs(10),
            freeze_threshold: Duration::from_secs(5),
            fps_window: 30,
            trigger_probability: 0.01,
        }
    }
}

impl StreamConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            max_retries: env_or("STREAM_MAX_RETRIES", d.max_retries).max(1),
            backoff: env_secs("STREAM_BACKOFF_SECS", d.backoff),
            heartbeat_interval: env_secs("STREAM_HEARTBEAT_SECS", d.heartbeat_interval),
            freeze_threshold: env_secs("STREAM_FREEZE_SECS", d.freeze_threshold),
            fps_window: env_or("STREAM_FPS_WINDOW", d.fps_window).max(2),
            trigger_probability: env_or("STREAM_TRIGGER_PROBABILITY", d.trigger_probability)
                .clamp(0.0, 1.0),
        }
    }
}

/// Fleet reconciliation settings.
#[derive(Debug, Clone)]
pub struct FleetConfig {
    /// Time between camera registry polls
    pub poll_interval: Duration,
    /// Call the backend when a worker exhausts its retries
    pub notify_offline: bool,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            notify_offline: false,
        }
    }
}

impl FleetConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            poll_interval: env_secs("FLEET_POLL_SECS", d.poll_interval),
            notify_offline: env_flag("FLEET_NOTIFY_OFFLINE", d.notify_offline),
        }
    }
}

/// Uploaded video processing settings.
#[derive(Debug, Clone)]
pub struct JobConfig {
    /// Concurrent queue consumers
    pub workers: usize,
    /// Bounded wait for a queue pop
    pub pop_timeout: Duration,
    /// Run detection on every Nth frame
    pub frame_stride: u64,
    /// Chance that an analysed frame with relevant detections yields a violation
    pub trigger_probability: f64,
    /// Pause after a failed job before consuming again
    pub cooldown: Duration,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            pop_timeout: Duration::from_secs(30),
            frame_stride: 5,
            trigger_probability: 0.05,
            cooldown: Duration::from_secs(5),
        }
    }
}

impl JobConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            workers: env_or("JOB_WORKERS", d.workers),
            pop_timeout: env_secs("JOB_POP_TIMEOUT_SECS", d.pop_timeout),
            frame_stride: env_or("JOB_FRAME_STRIDE", d.frame_stride).max(1),
            trigger_probability: env_or("JOB_TRIGGER_PROBABILITY", d.trigger_probability)
                .clamp(0.0, 1.0),
            cooldown: env_secs("JOB_COOLDOWN_SECS", d.cooldown),
        }
    }
}

/// Health/metrics HTTP server settings.
#[derive(Debug, Clone)]
pub struct HealthConfig {
    pub host: String,
    pub port: u16,
    pub metrics_enabled: bool,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            metrics_enabled: true,
        }
    }
}

impl HealthConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            host: std::env::var("HEALTH_HOST").unwrap_or(d.host),
            port: env_or("HEALTH_PORT", d.port),
            metrics_enabled: env_flag("METRICS_ENABLED", d.metrics_enabled),
        }
    }
}

/// Worker configuration.
#[derive(Debug, Clone, Default)]
pub struct WorkerConfig {
    pub stream: StreamConfig,
    pub fleet: FleetConfig,
    pub jobs: JobConfig,
    pub health: HealthConfig,
    /// Class-id mapping of the deployed model
    pub taxonomy: ClassTaxonomy,
    /// Allow only one inference in flight across all workers
    pub serialize_detector: bool,
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let taxonomy = std::env::var("CLASS_TAXONOMY")
            .ok()
            .and_then(|s| match ClassTaxonomy::from_str(&s) {
                Ok(t) => Some(t),
                Err(e) => {
                    tracing::warn!("{}; using default taxonomy", e);
                    None
                }
            })
            .unwrap_or_default();

        Self {
            stream: StreamConfig::from_env(),
            fleet: FleetConfig::from_env(),
            jobs: JobConfig::from_env(),
            health: HealthConfig::from_env(),
            taxonomy,
            serialize_detector: env_flag("DETECTOR_SERIALIZE", false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.stream.max_retries, 5);
        assert_eq!(config.stream.backoff, Duration::from_secs(5));
        assert_eq!(config.stream.fps_window, 30);
        assert_eq!(config.fleet.poll_interval, Duration::from_secs(30));
        assert_eq!(config.jobs.frame_stride, 5);
        assert_eq!(config.jobs.pop_timeout, Duration::from_secs(30));
        assert!((config.jobs.trigger_probability - 0.05).abs() < f64::EPSILON);
        assert_eq!(config.taxonomy, ClassTaxonomy::Coco);
    }

    #[test]
    fn test_env_helpers_fall_back() {
        assert_eq!(env_or("GUARDIAN_TEST_UNSET_VAR", 7u32), 7);
        assert_eq!(
            env_secs("GUARDIAN_TEST_UNSET_VAR", Duration::from_secs(3)),
            Duration::from_secs(3)
        );
        assert!(env_flag("GUARDIAN_TEST_UNSET_VAR", true));
    }
}

//! HTTP client for the inference service.

use async_trait::async_trait;
use guardian_media::Frame;
use guardian_models::{BoundingBox, DetectionResult};
use guardian_storage::encode_jpeg;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::detector::Detector;
use crate::error::{DetectorError, DetectorResult};
use crate::retry::{with_retry, RetryConfig};

/// Inference client configuration.
#[derive(Debug, Clone)]
pub struct HttpDetectorConfig {
    /// Base URL of the inference service
    pub url: String,
    /// Request timeout
    pub timeout: Duration,
    /// Minimum confidence the service should return
    pub confidence_threshold: f32,
    /// JPEG quality for frames sent over the wire
    pub jpeg_quality: u8,
    /// Retry configuration
    pub retry: RetryConfig,
}

impl Default for HttpDetectorConfig {
    fn default() -> Self {
        Self {
            url: "http://detector:8000".to_string(),
            timeout: Duration::from_secs(5),
            confidence_threshold: 0.25,
            jpeg_quality: 90,
            retry: RetryConfig::default(),
        }
    }
}

impl HttpDetectorConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            url: std::env::var("DETECTOR_URL").unwrap_or(defaults.url),
            timeout: std::env::var("DETECTOR_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            confidence_threshold: std::env::var("DETECTOR_CONFIDENCE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.confidence_threshold),
            jpeg_quality: defaults.jpeg_quality,
            retry: RetryConfig::from_env(),
        }
    }
}

/// Wire format of a single detection.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireDetection {
    #[serde(alias = "class_id", alias = "cls")]
    class_id: u32,
    #[serde(alias = "conf")]
    confidence: f32,
    #[serde(alias = "xyxy")]
    bbox: [f32; 4],
}

#[derive(Debug, Deserialize)]
struct DetectResponse {
    #[serde(default)]
    detections: Vec<WireDetection>,
}

impl From<WireDetection> for DetectionResult {
    fn from(d: WireDetection) -> Self {
        let [x1, y1, x2, y2] = d.bbox;
        DetectionResult::new(d.class_id, d.confidence, BoundingBox::new(x1, y1, x2, y2))
    }
}

/// Detector backed by a remote inference service.
///
/// Frames are sent as JPEG bodies to `POST {url}/detect`.
#[derive(Clone)]
pub struct HttpDetector {
    http: Client,
    config: HttpDetectorConfig,
    endpoint: String,
}

impl HttpDetector {
    pub fn new(config: HttpDetectorConfig) -> DetectorResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(Duration::from_secs(5))
            .pool_max_idle_per_host(4)
            .user_agent(concat!("guardian-detector/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DetectorError::config_error(e.to_string()))?;

        let endpoint = format!("{}/detect", config.url.trim_end_matches('/'));

        Ok(Self {
            http,
            config,
            endpoint,
        })
    }

    pub fn from_env() -> DetectorResult<Self> {
        Self::new(HttpDetectorConfig::from_env())
    }

    async fn send(&self, body: Vec<u8>) -> DetectorResult<Vec<DetectionResult>> {
        let response = self
            .http
            .post(&self.endpoint)
            .query(&[("conf", self.config.confidence_threshold)])
            .header(reqwest::header::CONTENT_TYPE, "image/jpeg")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(DetectorError::from_http_status(status.as_u16(), body));
        }

        let text = response.text().await?;
        let parsed: DetectResponse = serde_json::from_str(&text)
            .map_err(|e| DetectorError::invalid_response(format!("{}: {}", e, text)))?;
        Ok(parsed.detections.into_iter().map(Into::into).collect())
    }
}

#[async_trait]
impl Detector for HttpDetector {
    async fn detect(&self, frame: &Frame) -> DetectorResult<Vec<DetectionResult>> {
        let start = Instant::now();
        let jpeg = encode_jpeg(frame, self.config.jpeg_quality)?;

        let detections = with_retry(&self.config.retry, "detect", || self.send(jpeg.clone())).await?;

        debug!(
            frame = frame.index,
            detections = detections.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Detection complete"
        );
        Ok(detections)
    }
}

//! Backend REST client.

use async_trait::async_trait;
use guardian_models::{
    CameraDescriptor, EvidenceRef, Heartbeat, JobViolation, StatusUpdate, ViolationEvent,
};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{BackendError, BackendResult};

/// Header carrying the internal service credential.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Camera registry, violation ingestion and video status.
#[async_trait]
pub trait BackendClient: Send + Sync {
    /// Desired camera set.
    async fn fetch_cameras(&self) -> BackendResult<Vec<CameraDescriptor>>;

    async fn send_heartbeat(&self, camera_id: &str, heartbeat: &Heartbeat) -> BackendResult<()>;

    /// Report a live-stream violation with its evidence image.
    async fn submit_violation(&self, event: &ViolationEvent) -> BackendResult<()>;

    async fn update_video_status(&self, video_id: &str, update: &StatusUpdate) -> BackendResult<()>;

    /// Report a violation found in an uploaded video.
    async fn submit_job_violation(
        &self,
        video_id: &str,
        violation: &JobViolation,
    ) -> BackendResult<()>;

    /// Notify that a camera's worker gave up reconnecting.
    ///
    /// The backend marks cameras offline on missed heartbeats, so the
    /// default does nothing.
    async fn report_offline(&self, camera_id: &str) -> BackendResult<()> {
        let _ = camera_id;
        Ok(())
    }
}

/// Backend client configuration.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// API base URL, including the `/api` prefix
    pub base_url: String,
    /// Internal API key sent with every request
    pub api_key: Option<String>,
    /// Request timeout
    pub timeout: Duration,
    /// Connect timeout
    pub connect_timeout: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://backend:5000/api".to_string(),
            api_key: None,
            timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

impl BackendConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("BACKEND_API_URL").unwrap_or(defaults.base_url),
            api_key: std::env::var("INTERNAL_API_KEY")
                .ok()
                .filter(|k| !k.is_empty()),
            timeout: std::env::var("BACKEND_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            connect_timeout: defaults.connect_timeout,
        }
    }
}

/// reqwest implementation of [`BackendClient`].
#[derive(Clone)]
pub struct HttpBackendClient {
    http: Client,
    config: BackendConfig,
    base_url: String,
}

impl HttpBackendClient {
    pub fn new(config: BackendConfig) -> BackendResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .user_agent(concat!("guardian-backend/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BackendError::config_error(e.to_string()))?;

        let base_url = config.base_url.trim_end_matches('/').to_string();

        Ok(Self {
            http,
            config,
            base_url,
        })
    }

    pub fn from_env() -> BackendResult<Self> {
        Self::new(BackendConfig::from_env())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_key {
            Some(key) => request.header(API_KEY_HEADER, key),
            None => request,
        }
    }

    /// Turn a non-2xx response into an error.
    async fn check(response: Response, url: &str) -> BackendResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(BackendError::from_http_status(
            status.as_u16(),
            format!("{} failed: {}", url, body),
        ))
    }

    async fn evidence_part(evidence: &EvidenceRef) -> BackendResult<Part> {
        let (file_name, content_type, bytes) = match evidence {
            EvidenceRef::Upload {
                file_name,
                content_type,
                bytes,
            } => (file_name.clone(), content_type.as_str(), bytes.clone()),
            EvidenceRef::File { path, .. } => {
                let bytes = tokio::fs::read(path)
                    .await
                    .map_err(|e| BackendError::Evidence(format!("{}: {}", path.display(), e)))?;
                let file_name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "evidence.jpg".to_string());
                (file_name, "image/jpeg", bytes)
            }
        };

        Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(content_type)
            .map_err(|e| BackendError::Evidence(e.to_string()))
    }

    async fn violation_form(event: &ViolationEvent) -> BackendResult<Form> {
        let confidence = ((event.confidence as f64) * 1000.0).round() / 10.0;
        let severity = (event.severity * 10.0).round() / 10.0;

        let mut form = Form::new()
            .text("type", event.violation_type.as_str())
            .text("plateNumber", event.plate_number.clone())
            .text("vehicleType", event.vehicle_type.clone())
            .text("confidenceScore", confidence.to_string())
            .text("threatScore", severity.to_string())
            .text("cameraId", event.camera_id.clone())
            .text("timestampOffset", format!("{:.3}", event.timestamp_offset))
            .text("boundingBox", serde_json::to_string(&event.bbox)?);

        if let Some(lat) = event.location.lat {
            form = form.text("locationLat", lat.to_string());
        }
        if let Some(lng) = event.location.lng {
            form = form.text("locationLng", lng.to_string());
        }

        Ok(form.part("evidenceImage", Self::evidence_part(&event.evidence).await?))
    }
}

#[async_trait]
impl BackendClient for HttpBackendClient {
    async fn fetch_cameras(&self) -> BackendResult<Vec<CameraDescriptor>> {
        let url = self.url("/cameras");
        let response = self.authorize(self.http.get(&url)).send().await?;
        let response = Self::check(response, &url).await?;

        let entries: Vec<serde_json::Value> = response
            .json()
            .await
            .map_err(|e| BackendError::invalid_response(format!("{}: {}", url, e)))?;

        // One bad entry must not hide the rest of the fleet.
        let cameras = entries
            .into_iter()
            .filter_map(|entry| match serde_json::from_value::<CameraDescriptor>(entry) {
                Ok(camera) => Some(camera),
                Err(e) => {
                    warn!(error = %e, "Skipping malformed camera entry");
                    None
                }
            })
            .collect::<Vec<_>>();

        debug!(count = cameras.len(), "Fetched camera registry");
        Ok(cameras)
    }

    async fn send_heartbeat(&self, camera_id: &str, heartbeat: &Heartbeat) -> BackendResult<()> {
        let url = self.url(&format!("/cameras/{}/heartbeat", urlencoding::encode(camera_id)));
        let response = self
            .authorize(self.http.post(&url))
            .json(heartbeat)
            .send()
            .await?;
        Self::check(response, &url).await?;
        Ok(())
    }

    async fn submit_violation(&self, event: &ViolationEvent) -> BackendResult<()> {
        let url = self.url("/violations");
        let form = Self::violation_form(event).await?;
        let response = self
            .authorize(self.http.post(&url))
            .multipart(form)
            .send()
            .await?;
        Self::check(response, &url).await?;
        Ok(())
    }

    async fn update_video_status(&self, video_id: &str, update: &StatusUpdate) -> BackendResult<()> {
        let url = self.url(&format!("/videos/{}/status", urlencoding::encode(video_id)));
        let response = self
            .authorize(self.http.patch(&url))
            .json(update)
            .send()
            .await?;
        Self::check(response, &url).await?;
        Ok(())
    }

    async fn submit_job_violation(
        &self,
        video_id: &str,
        violation: &JobViolation,
    ) -> BackendResult<()> {
        let url = self.url(&format!("/videos/{}/violations", urlencoding::encode(video_id)));
        let response = self
            .authorize(self.http.post(&url))
            .json(violation)
            .send()
            .await?;
        Self::check(response, &url).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use guardian_models::{BoundingBox, CameraStatus, GeoPoint, ViolationType};
    use wiremock::matchers::{body_json, body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> HttpBackendClient {
        HttpBackendClient::new(BackendConfig {
            base_url: format!("{}/api/", server.uri()),
            api_key: Some("secret".to_string()),
            timeout: Duration::from_secs(2),
            connect_timeout: Duration::from_secs(1),
        })
        .unwrap()
    }

    fn event(evidence: EvidenceRef) -> ViolationEvent {
        ViolationEvent {
            violation_type: ViolationType::RedLight,
            plate_number: "ABC-123".to_string(),
            vehicle_type: "CAR".to_string(),
            confidence: 0.876,
            severity: 55.56,
            camera_id: "cam-1".to_string(),
            location: GeoPoint::new(27.7, 85.3),
            timestamp_offset: 12.5,
            bbox: BoundingBox::new(1.0, 2.0, 3.0, 4.0),
            captured_at: Utc::now(),
            evidence,
        }
    }

    #[tokio::test]
    async fn test_fetch_cameras_skips_malformed_entries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/cameras"))
            .and(header("x-api-key", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"id": "cam-1", "rtspUrl": "rtsp://a/1", "status": "ONLINE"},
                {"id": 42, "rtspUrl": "rtsp://a/2"},
                {"id": "cam-3", "rtspUrl": "", "status": "OFFLINE", "locationLat": 1.0}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let cameras = client(&server).fetch_cameras().await.unwrap();
        assert_eq!(cameras.len(), 2);
        assert_eq!(cameras[0].status, CameraStatus::Online);
        assert_eq!(cameras[1].source(), None);
    }

    #[tokio::test]
    async fn test_fetch_cameras_maps_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/cameras"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = client(&server).fetch_cameras().await.unwrap_err();
        assert!(matches!(err, BackendError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_send_heartbeat_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/cameras/cam-1/heartbeat"))
            .and(header("x-api-key", "secret"))
            .and(body_json(serde_json::json!({
                "fps": 24.5, "latency_ms": 40, "failure_count": 2
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true, "health": "HEALTHY"
            })))
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .send_heartbeat(
                "cam-1",
                &Heartbeat {
                    fps: 24.5,
                    latency_ms: 40,
                    failure_count: 2,
                },
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_path_ids_are_encoded() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/cameras/gate%202%2Fnorth/heartbeat"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/api/videos/v%3F42/status"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server);
        client
            .send_heartbeat(
                "gate 2/north",
                &Heartbeat {
                    fps: 10.0,
                    latency_ms: 5,
                    failure_count: 0,
                },
            )
            .await
            .unwrap();
        client
            .update_video_status("v?42", &StatusUpdate::processing())
            .await
            .unwrap();
    }

    // Evidence bytes are kept UTF-8 so the body matchers can inspect them.
    #[tokio::test]
    async fn test_submit_violation_multipart() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/violations"))
            .and(body_string_contains("name=\"type\""))
            .and(body_string_contains("RED LIGHT"))
            .and(body_string_contains("name=\"confidenceScore\""))
            .and(body_string_contains("87.6"))
            .and(body_string_contains("name=\"threatScore\""))
            .and(body_string_contains("55.6"))
            .and(body_string_contains("name=\"locationLat\""))
            .and(body_string_contains("name=\"evidenceImage\"; filename=\"ev_cam-1_1.jpg\""))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let evidence = EvidenceRef::Upload {
            file_name: "ev_cam-1_1.jpg".to_string(),
            content_type: "image/jpeg".to_string(),
            bytes: b"jpeg-bytes".to_vec(),
        };
        client(&server).submit_violation(&event(evidence)).await.unwrap();
    }

    #[tokio::test]
    async fn test_submit_violation_reads_file_evidence() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/violations"))
            .and(body_string_contains("filename=\"a.jpg\""))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.jpg");
        std::fs::write(&file, b"jpeg-bytes").unwrap();
        let evidence = EvidenceRef::File {
            path: file,
            relative: "/uploads/evidence/a.jpg".to_string(),
        };
        client(&server).submit_violation(&event(evidence)).await.unwrap();

        let missing = EvidenceRef::File {
            path: dir.path().join("gone.jpg"),
            relative: "/uploads/evidence/gone.jpg".to_string(),
        };
        let err = client(&server)
            .submit_violation(&event(missing))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Evidence(_)));
    }

    #[tokio::test]
    async fn test_update_video_status() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/api/videos/v42/status"))
            .and(body_json(serde_json::json!({"status": "completed", "durationSeconds": 5.0})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .update_video_status("v42", &StatusUpdate::completed(5.0))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_submit_job_violation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/videos/v42/violations"))
            .and(body_string_contains("\"violationType\":\"SPEEDING\""))
            .and(body_string_contains("\"evidenceImagePath\":\"/uploads/evidence/x.jpg\""))
            .respond_with(ResponseTemplate::new(500).set_body_string("db down"))
            .expect(1)
            .mount(&server)
            .await;

        let violation = JobViolation {
            violation_type: ViolationType::Speeding,
            confidence_score: 90.0,
            frame_timestamp: 1.5,
            plate_number: "ABC-123".to_string(),
            bbox: BoundingBox::default(),
            evidence_path: "/uploads/evidence/x.jpg".to_string(),
        };
        let err = client(&server)
            .submit_job_violation("v42", &violation)
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::ServerError(500, _)));
    }

    #[tokio::test]
    async fn test_report_offline_defaults_to_noop() {
        let server = MockServer::start().await;
        client(&server).report_offline("cam-1").await.unwrap();
        assert!(server.received_requests().await.unwrap_or_default().is_empty());
    }
}

//! Evidence stores.

use async_trait::async_trait;
use guardian_media::Frame;
use guardian_models::EvidenceRef;
use std::path::PathBuf;
use tracing::debug;

use crate::encode::{encode_jpeg, DEFAULT_JPEG_QUALITY};
use crate::error::{StorageError, StorageResult};
use crate::naming::evidence_file_name;

const JPEG_CONTENT_TYPE: &str = "image/jpeg";

/// Encodes frames and makes the bytes available to the backend.
#[async_trait]
pub trait EvidenceStore: Send + Sync {
    /// Encode a frame to an image blob.
    fn encode(&self, frame: &Frame) -> StorageResult<Vec<u8>> {
        encode_jpeg(frame, DEFAULT_JPEG_QUALITY)
    }

    /// Persist an encoded blob under a unique name derived from `name_hint`.
    async fn persist(&self, bytes: Vec<u8>, name_hint: &str) -> StorageResult<EvidenceRef>;
}

/// Evidence storage configuration.
#[derive(Debug, Clone)]
pub struct EvidenceConfig {
    /// Directory evidence files are written to
    pub dir: PathBuf,
    /// Prefix the backend serves `dir` under
    pub url_prefix: String,
    pub jpeg_quality: u8,
}

impl Default for EvidenceConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("uploads/evidence"),
            url_prefix: "/uploads/evidence".to_string(),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl EvidenceConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            dir: std::env::var("EVIDENCE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.dir),
            url_prefix: std::env::var("EVIDENCE_URL_PREFIX").unwrap_or(defaults.url_prefix),
            jpeg_quality: std::env::var("EVIDENCE_JPEG_QUALITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|q| (1..=100).contains(q))
                .unwrap_or(defaults.jpeg_quality),
        }
    }
}

/// Keeps evidence in memory for shipping as a multipart file part.
#[derive(Debug, Clone)]
pub struct InlineEvidenceStore {
    jpeg_quality: u8,
}

impl Default for InlineEvidenceStore {
    fn default() -> Self {
        Self {
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl InlineEvidenceStore {
    pub fn new(jpeg_quality: u8) -> Self {
        Self { jpeg_quality }
    }
}

#[async_trait]
impl EvidenceStore for InlineEvidenceStore {
    fn encode(&self, frame: &Frame) -> StorageResult<Vec<u8>> {
        encode_jpeg(frame, self.jpeg_quality)
    }

    async fn persist(&self, bytes: Vec<u8>, name_hint: &str) -> StorageResult<EvidenceRef> {
        Ok(EvidenceRef::Upload {
            file_name: evidence_file_name(name_hint)?,
            content_type: JPEG_CONTENT_TYPE.to_string(),
            bytes,
        })
    }
}

/// Writes evidence into a directory shared with the backend.
#[derive(Debug, Clone)]
pub struct FileEvidenceStore {
    config: EvidenceConfig,
}

impl FileEvidenceStore {
    pub fn new(config: EvidenceConfig) -> Self {
        Self { config }
    }

    pub fn from_env() -> Self {
        Self::new(EvidenceConfig::from_env())
    }

    pub fn dir(&self) -> &std::path::Path {
        &self.config.dir
    }

    fn relative(&self, file_name: &str) -> String {
        format!("{}/{}", self.config.url_prefix.trim_end_matches('/'), file_name)
    }
}

#[async_trait]
impl EvidenceStore for FileEvidenceStore {
    fn encode(&self, frame: &Frame) -> StorageResult<Vec<u8>> {
        encode_jpeg(frame, self.config.jpeg_quality)
    }

    async fn persist(&self, bytes: Vec<u8>, name_hint: &str) -> StorageResult<EvidenceRef> {
        let file_name = evidence_file_name(name_hint)?;
        let path = self.config.dir.join(&file_name);

        tokio::fs::create_dir_all(&self.config.dir).await?;
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| StorageError::write_failed(format!("{}: {}", path.display(), e)))?;

        debug!(path = %path.display(), size = bytes.len(), "Evidence written");

        Ok(EvidenceRef::File {
            relative: self.relative(&file_name),
            path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_inline_store() {
        let store = InlineEvidenceStore::default();
        let bytes = store.encode(&Frame::filled(32, 32, 0, 10)).unwrap();
        let evidence = store.persist(bytes.clone(), "ev_cam-1").await.unwrap();
        match evidence {
            EvidenceRef::Upload {
                file_name,
                content_type,
                bytes: stored,
            } => {
                assert!(file_name.starts_with("ev_cam-1_"));
                assert_eq!(content_type, "image/jpeg");
                assert_eq!(stored, bytes);
            }
            other => panic!("unexpected evidence {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_file_store_writes_and_references() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileEvidenceStore::new(EvidenceConfig {
            dir: dir.path().join("evidence"),
            url_prefix: "/uploads/evidence/".to_string(),
            jpeg_quality: 80,
        });

        let bytes = store.encode(&Frame::filled(16, 16, 0, 200)).unwrap();
        let first = store.persist(bytes.clone(), "job_v42_5").await.unwrap();
        let second = store.persist(bytes.clone(), "job_v42_5").await.unwrap();
        assert_ne!(first, second);

        match first {
            EvidenceRef::File { path, relative } => {
                assert_eq!(std::fs::read(&path).unwrap(), bytes);
                assert!(relative.starts_with("/uploads/evidence/job_v42_5_"));
                assert!(!relative.contains("//"));
            }
            other => panic!("unexpected evidence {:?}", other),
        }
    }
}

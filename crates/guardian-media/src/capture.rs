//! FFmpeg-backed frame capture.
//!
//! FFmpeg decodes the source and writes packed RGB24 frames to stdout; each
//! read pulls exactly `width * height * 3` bytes.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};
use crate::frame::Frame;
use crate::probe::{probe_source, SourceInfo};
use crate::source::{FrameSource, SourceOpener};

/// Timeouts for opening and reading sources.
#[derive(Debug, Clone)]
pub struct FfmpegOpenerConfig {
    /// Upper bound for probing a source
    pub open_timeout: Duration,
    /// Upper bound for a single frame read; a stalled stream counts as failed
    pub read_timeout: Duration,
}

impl Default for FfmpegOpenerConfig {
    fn default() -> Self {
        Self {
            open_timeout: Duration::from_secs(15),
            read_timeout: Duration::from_secs(10),
        }
    }
}

impl FfmpegOpenerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            open_timeout: std::env::var("STREAM_OPEN_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.open_timeout),
            read_timeout: std::env::var("STREAM_READ_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.read_timeout),
        }
    }
}

/// Opens camera streams and video files through FFmpeg.
#[derive(Debug, Clone, Default)]
pub struct FfmpegOpener {
    config: FfmpegOpenerConfig,
}

impl FfmpegOpener {
    pub fn new(config: FfmpegOpenerConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SourceOpener for FfmpegOpener {
    async fn open(&self, uri: &str) -> MediaResult<Box<dyn FrameSource>> {
        let capture = FfmpegCapture::open(uri, &self.config).await?;
        Ok(Box::new(capture))
    }
}

/// A running FFmpeg decode of one source.
pub struct FfmpegCapture {
    uri: String,
    info: SourceInfo,
    child: Option<Child>,
    stdout: Option<ChildStdout>,
    read_timeout: Duration,
    next_index: u64,
}

impl FfmpegCapture {
    /// Probe the source and start decoding it.
    pub async fn open(uri: &str, config: &FfmpegOpenerConfig) -> MediaResult<Self> {
        which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)?;

        let info = probe_source(uri, config.open_timeout)
            .await
            .map_err(|e| MediaError::open_failed(uri, e.to_string()))?;

        let mut cmd = Command::new("ffmpeg");
        cmd.args(["-hide_banner", "-loglevel", "error", "-nostdin"]);
        if uri.starts_with("rtsp://") {
            cmd.args(["-rtsp_transport", "tcp"]);
        }
        cmd.arg("-i")
            .arg(uri)
            .args(["-an", "-f", "rawvideo", "-pix_fmt", "rgb24", "pipe:1"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        debug!(uri = %uri, width = info.width, height = info.height, "Starting FFmpeg capture");

        let mut child = cmd
            .spawn()
            .map_err(|e| MediaError::open_failed(uri, e.to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MediaError::open_failed(uri, "FFmpeg stdout unavailable"))?;

        Ok(Self {
            uri: uri.to_string(),
            info,
            child: Some(child),
            stdout: Some(stdout),
            read_timeout: config.read_timeout,
            next_index: 0,
        })
    }
}

#[async_trait]
impl FrameSource for FfmpegCapture {
    async fn read_frame(&mut self) -> MediaResult<Option<Frame>> {
        let Some(stdout) = self.stdout.as_mut() else {
            return Ok(None);
        };

        let len = Frame::byte_len(self.info.width, self.info.height);
        let mut data = vec![0u8; len];

        match tokio::time::timeout(self.read_timeout, stdout.read_exact(&mut data)).await {
            Err(_) => Err(MediaError::read_failed(format!(
                "No frame from {} within {:?}",
                self.uri, self.read_timeout
            ))),
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                debug!(uri = %self.uri, frames = self.next_index, "Source reached end of stream");
                self.stdout = None;
                Ok(None)
            }
            Ok(Err(e)) => Err(MediaError::read_failed(e.to_string())),
            Ok(Ok(_)) => {
                let frame = Frame::new(self.info.width, self.info.height, self.next_index, data);
                self.next_index += 1;
                Ok(Some(frame))
            }
        }
    }

    fn info(&self) -> &SourceInfo {
        &self.info
    }

    async fn release(&mut self) {
        self.stdout = None;
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.start_kill() {
                debug!(uri = %self.uri, error = %e, "FFmpeg already exited");
            }
            if let Err(e) = child.wait().await {
                warn!(uri = %self.uri, error = %e, "Failed to reap FFmpeg process");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = FfmpegOpenerConfig::default();
        assert_eq!(config.open_timeout, Duration::from_secs(15));
        assert_eq!(config.read_timeout, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_open_missing_file_fails() {
        let opener = FfmpegOpener::default();
        // Either FFmpeg is absent or the probe rejects the path; both are open failures.
        let result = opener.open("/definitely/not/here.mp4").await;
        assert!(matches!(
            result,
            Err(MediaError::FfmpegNotFound) | Err(MediaError::OpenFailed { .. })
        ));
    }
}

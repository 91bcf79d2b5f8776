//! FFprobe source information.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::error::{MediaError, MediaResult};

/// Metadata about an opened source.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SourceInfo {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Frame rate, when the container declares one
    pub fps: Option<f64>,
    /// Total frame count, for finite sources
    pub total_frames: Option<u64>,
    /// Duration in seconds, for finite sources
    pub duration: Option<f64>,
    /// Video codec
    pub codec: String,
}

impl SourceInfo {
    /// Source info for raw frames of a known geometry.
    pub fn new(width: u32, height: u32, fps: Option<f64>, total_frames: Option<u64>) -> Self {
        Self {
            width,
            height,
            fps,
            total_frames,
            duration: None,
            codec: String::new(),
        }
    }
}

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Option<FfprobeFormat>,
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    nb_frames: Option<String>,
}

/// Whether the source is a network stream rather than a local file.
pub fn is_network_source(uri: &str) -> bool {
    uri.contains("://") && !uri.starts_with("file://")
}

/// Probe a stream URI or file path.
pub async fn probe_source(uri: &str, timeout: Duration) -> MediaResult<SourceInfo> {
    if !is_network_source(uri) {
        let path = Path::new(uri.strip_prefix("file://").unwrap_or(uri));
        if !path.exists() {
            return Err(MediaError::FileNotFound(path.to_path_buf()));
        }
    }

    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)?;

    let mut cmd = Command::new("ffprobe");
    cmd.args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"]);
    if uri.starts_with("rtsp://") {
        cmd.args(["-rtsp_transport", "tcp"]);
    }
    cmd.arg(uri)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = tokio::time::timeout(timeout, cmd.output())
        .await
        .map_err(|_| MediaError::Timeout(timeout.as_secs()))??;

    if !output.status.success() {
        return Err(MediaError::FfprobeFailed {
            message: format!("FFprobe failed for {}", uri),
            stderr: Some(String::from_utf8_lossy(&output.stderr).to_string()),
        });
    }

    parse_probe_output(&output.stdout)
}

fn parse_probe_output(stdout: &[u8]) -> MediaResult<SourceInfo> {
    let probe: FfprobeOutput = serde_json::from_slice(stdout)?;

    let video_stream = probe
        .streams
        .iter()
        .find(|s| s.codec_type == "video")
        .ok_or_else(|| MediaError::InvalidVideo("No video stream found".to_string()))?;

    let width = video_stream.width.unwrap_or(0);
    let height = video_stream.height.unwrap_or(0);
    if width == 0 || height == 0 {
        return Err(MediaError::InvalidVideo("Video stream has no dimensions".to_string()));
    }

    let fps = video_stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .or_else(|| video_stream.r_frame_rate.as_deref().and_then(parse_frame_rate));

    let duration = probe
        .format
        .as_ref()
        .and_then(|f| f.duration.as_ref())
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| *d > 0.0);

    // Prefer the container's frame count; estimate from duration otherwise.
    let total_frames = video_stream
        .nb_frames
        .as_ref()
        .and_then(|n| n.parse::<u64>().ok())
        .filter(|n| *n > 0)
        .or_else(|| match (duration, fps) {
            (Some(d), Some(f)) => Some((d * f).round() as u64),
            _ => None,
        });

    Ok(SourceInfo {
        width,
        height,
        fps,
        total_frames,
        duration,
        codec: video_stream.codec_name.clone().unwrap_or_default(),
    })
}

/// Parse frame rate string (e.g., "30/1" or "29.97"). Zero rates are `None`.
fn parse_frame_rate(s: &str) -> Option<f64> {
    let rate = if let Some((num, den)) = s.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        if den <= 0.0 {
            return None;
        }
        num / den
    } else {
        s.parse().ok()?
    };
    (rate > 0.0).then_some(rate)
}

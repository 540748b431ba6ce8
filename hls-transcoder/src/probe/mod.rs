//! Source media inspection via `ffprobe`.
//!
//! Runs `ffprobe -v error -print_format json -show_format -show_streams` and
//! reduces the output to a [`ProbeResult`]. The first video and first audio
//! stream are reported; a missing stream or field becomes `"Unknown"` instead
//! of failing the probe.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use process_utils::tokio_command;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Placeholder for metadata the inspector did not report.
pub const UNKNOWN: &str = "Unknown";

/// Probe failures.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to run ffprobe: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("ffprobe failed ({}): {stderr}", describe_status(.status))]
    Failed { status: Option<i32>, stderr: String },

    #[error("Failed to parse ffprobe output: {0}")]
    Parse(#[from] serde_json::Error),
}

fn describe_status(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!("exit code {code}"),
        None => "terminated by signal".to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    /// `WxH`
    pub resolution: String,
    pub bitrate: String,
    pub codec: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioInfo {
    pub bitrate: String,
    pub codec: String,
}

/// Source characteristics reported to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub video: VideoInfo,
    pub audio: AudioInfo,
    /// Seconds, when the container reports it.
    pub duration: Option<f64>,
    /// Container format name.
    pub format: String,
    /// Probed file name.
    pub file: String,
}

impl ProbeResult {
    /// Build from raw `ffprobe` JSON output.
    pub fn from_ffprobe_json(file: &str, json: &str) -> Result<Self, ProbeError> {
        let output: FfprobeOutput = serde_json::from_str(json)?;
        Ok(Self::from_output(file, output))
    }

    fn from_output(file: &str, output: FfprobeOutput) -> Self {
        let video = output
            .streams
            .iter()
            .find(|s| s.codec_type.as_deref() == Some("video"));
        let audio = output
            .streams
            .iter()
            .find(|s| s.codec_type.as_deref() == Some("audio"));

        let video = VideoInfo {
            resolution: video
                .and_then(|s| Some(format!("{}x{}", s.width?, s.height?)))
                .unwrap_or_else(unknown),
            bitrate: video
                .and_then(|s| s.bit_rate.clone())
                .unwrap_or_else(unknown),
            codec: video
                .and_then(|s| s.codec_name.clone())
                .unwrap_or_else(unknown),
        };
        let audio = AudioInfo {
            bitrate: audio
                .and_then(|s| s.bit_rate.clone())
                .unwrap_or_else(unknown),
            codec: audio
                .and_then(|s| s.codec_name.clone())
                .unwrap_or_else(unknown),
        };

        let format = output.format.unwrap_or_default();
        Self {
            video,
            audio,
            duration: format.duration.and_then(|d| d.parse::<f64>().ok()),
            format: format.format_name.unwrap_or_else(unknown),
            file: file.to_string(),
        }
    }
}

fn unknown() -> String {
    UNKNOWN.to_string()
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeFormat {
    format_name: Option<String>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    bit_rate: Option<String>,
}

/// Runs the external inspector.
#[derive(Debug, Clone)]
pub struct MediaProber {
    ffprobe_path: PathBuf,
}

impl MediaProber {
    pub fn new(ffprobe_path: impl Into<PathBuf>) -> Self {
        Self {
            ffprobe_path: ffprobe_path.into(),
        }
    }

    pub fn is_available(&self) -> bool {
        process_utils::detect_version(&self.ffprobe_path).is_some()
    }

    /// Probe `path`. A missing file fails before ffprobe is started.
    pub async fn probe(&self, path: &Path) -> Result<ProbeResult, ProbeError> {
        if !crate::utils::fs::is_file(path).await {
            return Err(ProbeError::NotFound(path.to_path_buf()));
        }

        debug!(path = %path.display(), "Probing source");

        let output = tokio_command(&self.ffprobe_path)
            .args([
                "-v",
                "error",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(ProbeError::Spawn)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!(path = %path.display(), status = ?output.status.code(), "ffprobe failed");
            return Err(ProbeError::Failed {
                status: output.status.code(),
                stderr,
            });
        }

        let file = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let json = String::from_utf8_lossy(&output.stdout);
        ProbeResult::from_ffprobe_json(&file, &json)
    }
}

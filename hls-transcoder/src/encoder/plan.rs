//! Rendition ladder and the encoder invocation derived from it.
//!
//! A [`RenditionPlan`] is pure data: given the same ladder and settings it
//! always produces the same filter graph and argument list. The Nth rendition
//! (1-based) reads sub-stream `[vN]`, scales it into `[vNout]` and writes
//! output stream index `N-1`. Downstream components never see those internal
//! labels; they recover rendition identity from the `<label>p_<index>.ts`
//! file names alone.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Segment index width used in the segment filename template.
const SEGMENT_INDEX_WIDTH: usize = 3;

/// `<label>p.m3u8`
pub fn manifest_file_name(label: &str) -> String {
    format!("{label}p.m3u8")
}

/// `<label>p_<index>.ts`, index zero-padded to three digits.
pub fn segment_file_name(label: &str, index: u32) -> String {
    format!("{label}p_{index:0width$}.ts", width = SEGMENT_INDEX_WIDTH)
}

/// The encoder-side template matching [`segment_file_name`].
fn segment_file_template(label: &str) -> String {
    format!("{label}p_%0{SEGMENT_INDEX_WIDTH}d.ts")
}

/// Encoder settings shared by every rendition of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodeSettings {
    pub video_codec: String,
    pub audio_codec: String,
    pub audio_bitrate: String,
    pub preset: String,
    pub gop_size: u32,
    /// Target HLS segment duration in seconds.
    pub segment_duration_secs: u32,
}

impl Default for EncodeSettings {
    fn default() -> Self {
        Self {
            video_codec: "hevc_nvenc".to_string(),
            audio_codec: "aac".to_string(),
            audio_bitrate: "192k".to_string(),
            preset: "fast".to_string(),
            gop_size: 120,
            segment_duration_secs: 7,
        }
    }
}

/// One output quality tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rendition {
    /// Height token, e.g. `"720"`. Unique within a plan.
    pub label: String,
    /// Scale filter argument, e.g. `"1280:720"`.
    pub scale: String,
    /// Video bitrate, e.g. `"3000k"`.
    pub video_bitrate: String,
}

impl Rendition {
    /// Build a rendition from a `W:H` resolution and a bitrate.
    pub fn new(resolution: &str, video_bitrate: &str) -> Result<Self> {
        let resolution = resolution.trim();
        let video_bitrate = video_bitrate.trim();

        let (width, height) = resolution.split_once(':').ok_or_else(|| {
            Error::validation(format!("resolution '{resolution}' must look like W:H"))
        })?;
        if !is_dimension(width) || !is_dimension(height) {
            return Err(Error::validation(format!(
                "resolution '{resolution}' must contain two positive integers"
            )));
        }
        if !is_bitrate(video_bitrate) {
            return Err(Error::validation(format!(
                "bitrate '{video_bitrate}' must look like 3000k"
            )));
        }

        Ok(Self {
            label: height.to_string(),
            scale: resolution.to_string(),
            video_bitrate: video_bitrate.to_string(),
        })
    }

    pub fn manifest_name(&self) -> String {
        manifest_file_name(&self.label)
    }
}

fn is_dimension(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) && s.parse::<u32>().is_ok_and(|v| v > 0)
}

fn is_bitrate(s: &str) -> bool {
    let digits = s.trim_end_matches(['k', 'K', 'm', 'M']);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

/// Per-rendition slice of the encoder invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenditionOutput {
    /// Position-derived filter label, `v1`, `v2`, ...
    pub internal_label: String,
    /// Output stream index, `0`, `1`, ...
    pub stream_index: usize,
    /// Rendition label (height token).
    pub label: String,
    /// Output options followed by the manifest path.
    pub args: Vec<String>,
}

/// Immutable, ordered ladder for one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenditionPlan {
    renditions: Vec<Rendition>,
    settings: EncodeSettings,
}

impl RenditionPlan {
    /// Build a plan from ordered `(resolution, bitrate)` pairs.
    ///
    /// Fails on an empty ladder, a malformed pair, or a repeated height.
    pub fn new<R, B>(ladder: &[(R, B)], settings: EncodeSettings) -> Result<Self>
    where
        R: AsRef<str>,
        B: AsRef<str>,
    {
        if ladder.is_empty() {
            return Err(Error::validation("rendition ladder is empty"));
        }
        if settings.segment_duration_secs == 0 {
            return Err(Error::validation("segment duration must be positive"));
        }

        let mut seen = HashSet::new();
        let mut renditions = Vec::with_capacity(ladder.len());
        for (resolution, bitrate) in ladder {
            let rendition = Rendition::new(resolution.as_ref(), bitrate.as_ref())?;
            if !seen.insert(rendition.label.clone()) {
                return Err(Error::validation(format!(
                    "duplicate rendition label '{}'",
                    rendition.label
                )));
            }
            renditions.push(rendition);
        }

        Ok(Self {
            renditions,
            settings,
        })
    }

    /// Parse a ladder of the form `1920:1080@5000k,1280:720@3000k`.
    pub fn parse_ladder(ladder: &str) -> Result<Vec<(String, String)>> {
        ladder.split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(|entry| {
                entry
                    .split_once('@')
                    .map(|(res, rate)| (res.trim().to_string(), rate.trim().to_string()))
                    .ok_or_else(|| {
                        Error::config(format!(
                            "ladder entry '{entry}' must look like 1280:720@3000k"
                        ))
                    })
            })
            .collect()
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.renditions.iter().map(|r| r.label.as_str())
    }

    /// `[0:v]split=N[v1]..[vN];[v1]scale=..[v1out];...`
    pub fn filter_graph(&self) -> String {
        let mut graph = format!("[0:v]split={}", self.renditions.len());
        for n in 1..=self.renditions.len() {
            graph.push_str(&format!("[v{n}]"));
        }
        graph.push(';');
        for (i, rendition) in self.renditions.iter().enumerate() {
            let n = i + 1;
            graph.push_str(&format!("[v{n}]scale={}[v{n}out];", rendition.scale));
        }
        graph
    }

    /// Output options for every rendition, in ladder order.
    pub fn outputs(&self, output_dir: &Path) -> Vec<RenditionOutput> {
        let s = &self.settings;
        self.renditions
            .iter()
            .enumerate()
            .map(|(i, rendition)| {
                let internal_label = format!("v{}", i + 1);
                let segment_pattern = output_dir.join(segment_file_template(&rendition.label));
                let manifest = output_dir.join(rendition.manifest_name());

                let args = vec![
                    "-map".to_string(),
                    format!("[{internal_label}out]"),
                    "-map".to_string(),
                    "0:a".to_string(),
                    format!("-c:v:{i}"),
                    s.video_codec.clone(),
                    format!("-b:v:{i}"),
                    rendition.video_bitrate.clone(),
                    format!("-c:a:{i}"),
                    s.audio_codec.clone(),
                    format!("-b:a:{i}"),
                    s.audio_bitrate.clone(),
                    "-preset".to_string(),
                    s.preset.clone(),
                    "-g".to_string(),
                    s.gop_size.to_string(),
                    "-sc_threshold".to_string(),
                    "0".to_string(),
                    "-f".to_string(),
                    "hls".to_string(),
                    "-hls_time".to_string(),
                    s.segment_duration_secs.to_string(),
                    "-hls_playlist_type".to_string(),
                    "vod".to_string(),
                    "-hls_segment_filename".to_string(),
                    segment_pattern.to_string_lossy().to_string(),
                    manifest.to_string_lossy().to_string(),
                ];

                RenditionOutput {
                    internal_label,
                    stream_index: i,
                    label: rendition.label.clone(),
                    args,
                }
            })
            .collect()
    }

    /// Full encoder argument list for `source`, writing under `output_dir`.
    ///
    /// Diagnostics go to stderr at `info` level (segment opens are logged
    /// there); structured progress goes to stdout.
    pub fn build_args(&self, source: &Path, output_dir: &Path) -> Vec<String> {
        let mut args: Vec<String> = [
            "-y",
            "-hide_banner",
            "-nostats",
            "-loglevel",
            "info",
            "-progress",
            "pipe:1",
            "-i",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        args.push(source.to_string_lossy().to_string());
        args.extend(["-filter_complex".to_string(), self.filter_graph()]);

        for output in self.outputs(output_dir) {
            args.extend(output.args);
        }
        args
    }

    /// Path of segment `index` of rendition `label` under `output_dir`.
    pub fn segment_path(output_dir: &Path, label: &str, index: u32) -> PathBuf {
        output_dir.join(segment_file_name(label, index))
    }

    /// Path of the manifest of rendition `label` under `output_dir`.
    pub fn manifest_path(output_dir: &Path, label: &str) -> PathBuf {
        output_dir.join(manifest_file_name(label))
    }
}

//! Encoder output parsing.
//!
//! Two streams come out of the encoder:
//! - stderr, free-form diagnostic text. [`parse_diagnostic_line`] turns one
//!   record into a tagged [`DiagnosticLine`] so nothing downstream touches
//!   raw text.
//! - stdout, `-progress pipe:1` output: `key=value` lines grouped into blocks
//!   that end with `progress=continue` or `progress=end`. [`ProgressBlock`]
//!   accumulates those.

use std::sync::LazyLock;

use regex::Regex;

/// `Opening '<dir>/<label>p_<index>.ts' for writing`
static SEGMENT_OPEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Opening '(?:.*[/\\])?(\d+)p_(\d+)\.ts' for writing")
        .unwrap_or_else(|e| panic!("invalid segment-open pattern: {e}"))
});

/// A classified diagnostic record.
#[derive(Debug, Clone, PartialEq)]
pub enum DiagnosticLine {
    /// The encoder opened segment `index` of rendition `label`.
    SegmentOpened { label: String, index: u32 },
    /// Source duration announced by the demuxer, in seconds.
    Duration(f64),
    /// Anything else.
    Unrecognized,
}

/// Classify one stderr record.
pub fn parse_diagnostic_line(line: &str) -> DiagnosticLine {
    if let Some(caps) = SEGMENT_OPEN_RE.captures(line)
        && let Ok(index) = caps[2].parse::<u32>()
    {
        return DiagnosticLine::SegmentOpened {
            label: caps[1].to_string(),
            index,
        };
    }

    if let Some(secs) = parse_duration_line(line) {
        return DiagnosticLine::Duration(secs);
    }

    DiagnosticLine::Unrecognized
}

/// Parse `Duration: 00:01:30.50, start: ...` into seconds.
fn parse_duration_line(line: &str) -> Option<f64> {
    let start = line.find("Duration: ")?;
    let rest = &line[start + "Duration: ".len()..];
    let end = rest.find(',').unwrap_or(rest.len());
    parse_time(rest[..end].trim())
}

/// Parse time string in HH:MM:SS.ms format to seconds.
///
/// ```ignore
/// assert_eq!(parse_time("00:00:10.50"), Some(10.5));
/// assert_eq!(parse_time("N/A"), None);
/// ```
pub fn parse_time(time_str: &str) -> Option<f64> {
    let parts: Vec<&str> = time_str.split(':').collect();
    if parts.len() != 3 {
        return None;
    }

    let hours: f64 = parts[0].parse().ok()?;
    let minutes: f64 = parts[1].parse().ok()?;
    let seconds: f64 = parts[2].parse().ok()?;

    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

/// Accumulator for one `-progress` block.
#[derive(Debug, Default, Clone)]
pub struct ProgressBlock {
    out_time_secs: Option<f64>,
}

/// Result of feeding one line to a [`ProgressBlock`].
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressLine {
    /// Block still open.
    Pending,
    /// Block closed. `out_time_secs` is the encoded position, if reported.
    BlockEnd {
        out_time_secs: Option<f64>,
        finished: bool,
    },
}

impl ProgressBlock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one `key=value` line.
    pub fn feed(&mut self, line: &str) -> ProgressLine {
        let Some((key, value)) = line.trim().split_once('=') else {
            return ProgressLine::Pending;
        };
        let value = value.trim();

        match key.trim() {
            // out_time_ms is in microseconds as well, kept for older builds.
            "out_time_us" | "out_time_ms" => {
                if let Ok(us) = value.parse::<i64>()
                    && us >= 0
                {
                    self.out_time_secs = Some(us as f64 / 1_000_000.0);
                }
                ProgressLine::Pending
            }
            "out_time" => {
                if self.out_time_secs.is_none() {
                    self.out_time_secs = parse_time(value);
                }
                ProgressLine::Pending
            }
            "progress" => {
                let out_time_secs = self.out_time_secs.take();
                ProgressLine::BlockEnd {
                    out_time_secs,
                    finished: value == "end",
                }
            }
            _ => ProgressLine::Pending,
        }
    }
}

/// Percent of `duration_secs` covered by `out_time_secs`, clamped to `[0, 100]`.
pub fn percent_of(out_time_secs: f64, duration_secs: f64) -> Option<f64> {
    if !(duration_secs > 0.0) || !out_time_secs.is_finite() {
        return None;
    }
    Some((out_time_secs / duration_secs * 100.0).clamp(0.0, 100.0))
}

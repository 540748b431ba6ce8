//! FFmpeg encode engine implementation.

use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use process_utils::{ExitOutcome, ToolOutputReader, spawn_process_waiter, tokio_command};
use tokio::io::AsyncRead;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use super::engine::{EncodeEngine, EncodeEvent, EncodeHandle};
use super::parser::{DiagnosticLine, ProgressBlock, ProgressLine, parse_diagnostic_line, percent_of};
use crate::{Error, Result};

/// Buffered records between the pipe readers and the event monitor.
const RECORD_CHANNEL_CAPACITY: usize = 256;

/// One record read from a child pipe.
#[derive(Debug)]
enum OutputRecord {
    /// stderr
    Diagnostic(String),
    /// stdout, `-progress pipe:1`
    Progress(String),
}

/// FFmpeg-based encode engine.
pub struct FfmpegEngine {
    binary_path: String,
    /// Cached version string.
    version: Option<String>,
}

impl FfmpegEngine {
    pub fn new(binary_path: impl Into<String>) -> Self {
        let binary_path = binary_path.into();
        let version = process_utils::detect_version(&binary_path);
        Self {
            binary_path,
            version,
        }
    }
}

impl Default for FfmpegEngine {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

#[async_trait]
impl EncodeEngine for FfmpegEngine {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    async fn start(&self, handle: Arc<EncodeHandle>) -> Result<()> {
        let job = &handle.job;
        let args = job.plan.build_args(&job.source_path, &job.output_dir);

        info!(job_id = %job.id, ?args, "Starting ffmpeg encode");

        let mut child = tokio_command(&self.binary_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Encoder(format!("Failed to spawn ffmpeg: {e}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Encoder("Failed to capture ffmpeg stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Encoder("Failed to capture ffmpeg stderr".to_string()))?;

        let (record_tx, record_rx) = mpsc::channel(RECORD_CHANNEL_CAPACITY);
        spawn_reader(stderr, record_tx.clone(), OutputRecord::Diagnostic);
        spawn_reader(stdout, record_tx, OutputRecord::Progress);

        let exit_rx = spawn_process_waiter(child, handle.cancellation_token.clone());
        tokio::spawn(monitor(handle, record_rx, exit_rx));

        Ok(())
    }

    fn is_available(&self) -> bool {
        self.version.is_some()
    }

    fn version(&self) -> Option<String> {
        self.version.clone()
    }
}

fn spawn_reader<R>(
    pipe: R,
    record_tx: mpsc::Sender<OutputRecord>,
    wrap: fn(String) -> OutputRecord,
) where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = ToolOutputReader::new(pipe);
        loop {
            match reader.next_record().await {
                Ok(Some(record)) => {
                    if record_tx.send(wrap(record)).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    error!("Error reading ffmpeg output: {}", e);
                    break;
                }
            }
        }
    });
}

/// Turns pipe records into events, then reports the exit.
///
/// The terminal event is sent only after both pipes reach EOF so every
/// segment open is delivered before `Completed`.
async fn monitor(
    handle: Arc<EncodeHandle>,
    mut record_rx: mpsc::Receiver<OutputRecord>,
    exit_rx: oneshot::Receiver<ExitOutcome>,
) {
    let job_id = handle.job.id.clone();
    let event_tx = handle.event_tx.clone();

    let mut duration_secs: Option<f64> = None;
    let mut block = ProgressBlock::new();
    let mut last_error_line: Option<String> = None;

    while let Some(record) = record_rx.recv().await {
        let event = match record {
            OutputRecord::Diagnostic(line) => match parse_diagnostic_line(&line) {
                DiagnosticLine::SegmentOpened { label, index } => {
                    debug!(job_id = %job_id, rendition = %label, segment = index, "Segment opened");
                    Some(EncodeEvent::SegmentOpened {
                        rendition: label,
                        index,
                    })
                }
                DiagnosticLine::Duration(secs) => {
                    if duration_secs.is_none() {
                        debug!(job_id = %job_id, duration_secs = secs, "Source duration");
                        duration_secs = Some(secs);
                    }
                    None
                }
                DiagnosticLine::Unrecognized => {
                    if line.contains("Error") || line.contains("error") {
                        warn!(job_id = %job_id, "FFmpeg: {}", line);
                        last_error_line = Some(line);
                    }
                    None
                }
            },
            OutputRecord::Progress(line) => match block.feed(&line) {
                ProgressLine::BlockEnd {
                    out_time_secs: Some(out),
                    ..
                } => duration_secs
                    .and_then(|total| percent_of(out, total))
                    .map(|percent| EncodeEvent::Progress { percent }),
                _ => None,
            },
        };

        if let Some(event) = event {
            // Receiver gone means nobody is driving this job anymore.
            if event_tx.send(event).await.is_err() && !handle.is_cancelled() {
                handle.cancel();
            }
        }
    }

    let outcome = exit_rx
        .await
        .unwrap_or_else(|_| ExitOutcome::WaitFailed("process waiter dropped".to_string()));

    let terminal = if outcome.is_success() {
        info!(job_id = %job_id, "FFmpeg encode finished");
        EncodeEvent::Completed
    } else {
        let mut reason = format!("ffmpeg {}", outcome.describe());
        if let Some(line) = last_error_line
            && outcome != ExitOutcome::Cancelled
        {
            reason.push_str(": ");
            reason.push_str(&line);
        }
        warn!(job_id = %job_id, reason = %reason, "FFmpeg encode failed");
        EncodeEvent::Failed { reason }
    };

    let _ = event_tx.send(terminal).await;
}

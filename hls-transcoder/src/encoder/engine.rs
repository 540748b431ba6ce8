//! Encode engine trait and related types.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::plan::RenditionPlan;
use crate::Result;

/// One transcode request, owned by exactly one encode run.
#[derive(Debug, Clone)]
pub struct EncodeJob {
    /// Unique job ID.
    pub id: String,
    pub source_path: PathBuf,
    pub output_dir: PathBuf,
    /// Live channel the job reports to.
    pub channel_id: String,
    pub plan: Arc<RenditionPlan>,
}

/// Events produced by an encode run.
#[derive(Debug, Clone, PartialEq)]
pub enum EncodeEvent {
    /// The encoder process is running.
    Started,
    /// Encode position as a percentage of the source duration.
    Progress { percent: f64 },
    /// The encoder opened segment `index` of rendition `rendition`.
    SegmentOpened { rendition: String, index: u32 },
    /// The encoder exited successfully.
    Completed,
    /// The encoder failed or was killed.
    Failed { reason: String },
}

impl EncodeEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed { .. })
    }
}

/// Handle to an active encode.
pub struct EncodeHandle {
    pub job: EncodeJob,
    pub cancellation_token: CancellationToken,
    /// Engines send everything except [`EncodeEvent::Started`] here.
    pub event_tx: mpsc::Sender<EncodeEvent>,
}

impl EncodeHandle {
    pub fn new(
        job: EncodeJob,
        event_tx: mpsc::Sender<EncodeEvent>,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            job,
            cancellation_token,
            event_tx,
        }
    }

    pub fn cancel(&self) {
        self.cancellation_token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }
}

/// An external encoder that turns one source into the plan's renditions.
///
/// Contract: when [`start`](Self::start) returns `Ok`, the engine runs in the
/// background, sends progress and segment events in the order the encoder
/// produced them, and finishes with exactly one terminal event. When it
/// returns `Err`, nothing was started and no events are sent.
#[async_trait]
pub trait EncodeEngine: Send + Sync {
    /// Short engine name for logs.
    fn name(&self) -> &'static str;

    /// Start encoding `handle.job`.
    async fn start(&self, handle: Arc<EncodeHandle>) -> Result<()>;

    /// Check if the engine is available (e.g., binary exists).
    fn is_available(&self) -> bool;

    /// Get the engine version string.
    fn version(&self) -> Option<String>;
}

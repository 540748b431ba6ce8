//! Job submission and per-job event processing.
//!
//! [`EncodeOrchestrator::submit`] validates a request synchronously (live
//! channel first, then the source file, then the output directory) and
//! returns an acknowledgement. Everything after that runs in a per-job driver
//! task that owns the job's [`SegmentTracker`], so cursor state is never
//! shared between jobs.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::engine::{EncodeEngine, EncodeEvent, EncodeHandle, EncodeJob};
use super::plan::RenditionPlan;
use crate::channel::ChannelRegistry;
use crate::progress::ProgressReporter;
use crate::publish::PublishPipeline;
use crate::tracker::{ClosePolicyKind, SegmentTracker};
use crate::utils::fs;
use crate::{Error, Result};

/// Engine-to-driver event buffer.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// A transcode request after path resolution.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub source_path: PathBuf,
    pub output_dir: PathBuf,
    pub channel_id: String,
}

/// Returned once per accepted request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscodeAck {
    pub job_id: String,
    pub output_dir: PathBuf,
}

pub struct EncodeOrchestrator {
    engine: Arc<dyn EncodeEngine>,
    channels: ChannelRegistry,
    publisher: PublishPipeline,
    plan: Arc<RenditionPlan>,
    identity_token: String,
    close_policy: ClosePolicyKind,
    shutdown: CancellationToken,
    jobs: TaskTracker,
}

impl EncodeOrchestrator {
    pub fn new(
        engine: Arc<dyn EncodeEngine>,
        channels: ChannelRegistry,
        publisher: PublishPipeline,
        plan: RenditionPlan,
        identity_token: impl Into<String>,
    ) -> Self {
        Self {
            engine,
            channels,
            publisher,
            plan: Arc::new(plan),
            identity_token: identity_token.into(),
            close_policy: ClosePolicyKind::default(),
            shutdown: CancellationToken::new(),
            jobs: TaskTracker::new(),
        }
    }

    pub fn with_close_policy(mut self, close_policy: ClosePolicyKind) -> Self {
        self.close_policy = close_policy;
        self
    }

    /// Cancelling this token kills every running encoder.
    pub fn with_shutdown_token(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn plan(&self) -> &RenditionPlan {
        &self.plan
    }

    pub fn engine_name(&self) -> &'static str {
        self.engine.name()
    }

    /// Number of job drivers still running.
    pub fn active_jobs(&self) -> usize {
        self.jobs.len()
    }

    /// Validate and start a job. Returns before encoding begins.
    ///
    /// Fails with [`Error::ConnectionNotFound`] when the channel is not live
    /// and with [`Error::SourceNotFound`] when the source is missing; in both
    /// cases no encoder is started.
    pub async fn submit(&self, request: SubmitRequest) -> Result<TranscodeAck> {
        let channel = self
            .channels
            .resolve(&request.channel_id)
            .ok_or_else(|| Error::connection_not_found(&request.channel_id))?;

        if !fs::is_file(&request.source_path).await {
            return Err(Error::SourceNotFound(request.source_path));
        }

        fs::ensure_dir_all_with_op("creating output directory", &request.output_dir).await?;

        let job = EncodeJob {
            id: Uuid::new_v4().to_string(),
            source_path: request.source_path,
            output_dir: request.output_dir,
            channel_id: request.channel_id,
            plan: self.plan.clone(),
        };
        let ack = TranscodeAck {
            job_id: job.id.clone(),
            output_dir: job.output_dir.clone(),
        };

        info!(
            job_id = %job.id,
            channel_id = %job.channel_id,
            source = %job.source_path.display(),
            output_dir = %job.output_dir.display(),
            "Transcode job accepted"
        );

        let driver = JobDriver {
            reporter: ProgressReporter::new(job.id.clone(), channel),
            tracker: SegmentTracker::with_policy(
                &job.plan,
                job.output_dir.clone(),
                self.close_policy.build(),
            ),
            engine: self.engine.clone(),
            publisher: self.publisher.clone(),
            identity_token: self.identity_token.clone(),
            cancel: self.shutdown.child_token(),
            job,
        };
        self.jobs.spawn(driver.run());

        Ok(ack)
    }

    /// Kill running encoders and wait for their drivers to report.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.jobs.close();
        self.jobs.wait().await;
    }
}

/// Owns one job from encoder start to terminal event.
struct JobDriver {
    job: EncodeJob,
    engine: Arc<dyn EncodeEngine>,
    tracker: SegmentTracker,
    reporter: ProgressReporter,
    publisher: PublishPipeline,
    identity_token: String,
    cancel: CancellationToken,
}

impl JobDriver {
    async fn run(mut self) {
        let job_id = self.job.id.clone();
        let (event_tx, mut event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let handle = Arc::new(EncodeHandle::new(
            self.job.clone(),
            event_tx,
            self.cancel.clone(),
        ));

        if let Err(e) = self.engine.start(handle).await {
            error!(job_id = %job_id, error = %e, "Failed to start encoder");
            self.reporter.report(&EncodeEvent::Failed {
                reason: e.to_string(),
            });
            return;
        }

        self.reporter.report(&EncodeEvent::Started);

        while let Some(event) = event_rx.recv().await {
            match &event {
                EncodeEvent::SegmentOpened { rendition, index } => {
                    let facts = self.tracker.on_segment_opened(rendition, *index);
                    self.publish_all(facts);
                }
                EncodeEvent::Completed => {
                    let facts = self.tracker.flush();
                    debug!(job_id = %job_id, facts = facts.len(), "Flushing renditions");
                    self.publish_all(facts);
                }
                EncodeEvent::Failed { reason } => {
                    warn!(job_id = %job_id, reason = %reason, "Transcode failed");
                }
                EncodeEvent::Started | EncodeEvent::Progress { .. } => {}
            }

            self.reporter.report(&event);

            match event {
                EncodeEvent::Completed => {
                    info!(job_id = %job_id, "Transcode completed");
                    return;
                }
                EncodeEvent::Failed { .. } => return,
                _ => {}
            }
        }

        let reason = "encoder stopped without reporting a result".to_string();
        warn!(job_id = %job_id, "{}", reason);
        self.reporter.report(&EncodeEvent::Failed { reason });
    }

    fn publish_all(&self, facts: Vec<crate::tracker::PublishFact>) {
        for fact in facts {
            self.publisher
                .publish(&self.job.id, fact, &self.identity_token);
        }
    }
}

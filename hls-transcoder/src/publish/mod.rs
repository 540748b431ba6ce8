//! Fire-and-forget publishing of finalized files.
//!
//! [`PublishPipeline::publish`] never waits: each fact becomes one spawned
//! upload attempt. Failures are logged where they happen and recorded in
//! [`PublishStats`] and on the outcome broadcast, but never reach the encoder.

mod http_store;
mod store;

pub use http_store::HttpRemoteStore;
pub use store::{DisabledStore, RemoteStore};

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::Serialize;
use tokio::sync::{Notify, broadcast};
use tracing::{debug, warn};

use crate::tracker::PublishFact;

/// Outcome queue depth. Slow subscribers lag rather than block uploads.
const OUTCOME_CHANNEL_CAPACITY: usize = 1024;

/// Result of one upload attempt.
#[derive(Debug, Clone, Serialize)]
pub struct PublishOutcome {
    pub job_id: String,
    pub rendition: String,
    pub published_name: String,
    pub file_path: PathBuf,
    /// `None` on success.
    pub error: Option<String>,
}

impl PublishOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Process-wide upload counters.
#[derive(Debug, Default)]
pub struct PublishStats {
    attempted: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time copy of [`PublishStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishStatsSnapshot {
    pub attempted: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub in_flight: usize,
}

/// Spawns one upload per fact against a shared [`RemoteStore`].
#[derive(Clone)]
pub struct PublishPipeline {
    store: Arc<dyn RemoteStore>,
    stats: Arc<PublishStats>,
    in_flight: Arc<AtomicUsize>,
    idle: Arc<Notify>,
    outcome_tx: broadcast::Sender<PublishOutcome>,
}

impl PublishPipeline {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        let (outcome_tx, _) = broadcast::channel(OUTCOME_CHANNEL_CAPACITY);
        Self {
            store,
            stats: Arc::new(PublishStats::default()),
            in_flight: Arc::new(AtomicUsize::new(0)),
            idle: Arc::new(Notify::new()),
            outcome_tx,
        }
    }

    pub fn store_name(&self) -> &'static str {
        self.store.name()
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_enabled()
    }

    /// Start one upload attempt for `fact` and return immediately.
    pub fn publish(&self, job_id: &str, fact: PublishFact, identity_token: &str) {
        let published_name = fact.published_name();
        if !self.store.is_enabled() {
            debug!(job_id, published_name = %published_name, "Publishing disabled, dropping fact");
            return;
        }

        self.stats.attempted.fetch_add(1, Ordering::Relaxed);
        self.in_flight.fetch_add(1, Ordering::AcqRel);

        let store = self.store.clone();
        let stats = self.stats.clone();
        let in_flight = self.in_flight.clone();
        let idle = self.idle.clone();
        let outcome_tx = self.outcome_tx.clone();
        let job_id = job_id.to_string();
        let identity_token = identity_token.to_string();

        tokio::spawn(async move {
            let rendition = fact.rendition_label().to_string();
            let file_path = fact.file_path().to_path_buf();

            let error = match store
                .store(&file_path, &published_name, &identity_token)
                .await
            {
                Ok(()) => {
                    stats.succeeded.fetch_add(1, Ordering::Relaxed);
                    debug!(job_id = %job_id, rendition = %rendition, published_name = %published_name, "Published");
                    None
                }
                Err(e) => {
                    stats.failed.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        job_id = %job_id,
                        rendition = %rendition,
                        published_name = %published_name,
                        error = %e,
                        "Publish failed"
                    );
                    Some(e.to_string())
                }
            };

            // No subscribers is fine.
            let _ = outcome_tx.send(PublishOutcome {
                job_id,
                rendition,
                published_name,
                file_path,
                error,
            });

            if in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
                idle.notify_waiters();
            }
        });
    }

    /// Subscribe to upload outcomes from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<PublishOutcome> {
        self.outcome_tx.subscribe()
    }

    pub fn stats(&self) -> PublishStatsSnapshot {
        PublishStatsSnapshot {
            attempted: self.stats.attempted.load(Ordering::Relaxed),
            succeeded: self.stats.succeeded.load(Ordering::Relaxed),
            failed: self.stats.failed.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Acquire),
        }
    }

    /// Resolve once no upload is in flight.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.in_flight.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }
}

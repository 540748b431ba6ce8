//! Client-visible push notifications for encode events.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::channel::ChannelHandle;
use crate::encoder::engine::EncodeEvent;
use crate::encoder::plan::segment_file_name;

/// Wire format of one push frame, tagged by `event`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum PushNotification {
    /// Sent once when a live channel is registered.
    Connected { id: String },
    Progress { percent: f64 },
    /// A segment file was opened by the encoder.
    Segment { file: String },
    Complete,
    Error { message: String },
}

impl PushNotification {
    pub fn from_event(event: &EncodeEvent) -> Self {
        match event {
            EncodeEvent::Started => Self::Progress { percent: 0.0 },
            EncodeEvent::Progress { percent } => Self::Progress { percent: *percent },
            EncodeEvent::SegmentOpened { rendition, index } => Self::Segment {
                file: segment_file_name(rendition, *index),
            },
            EncodeEvent::Completed => Self::Complete,
            EncodeEvent::Failed { reason } => Self::Error {
                message: reason.clone(),
            },
        }
    }
}

/// Pushes one job's events to its live channel. One-way, never blocks.
#[derive(Clone)]
pub struct ProgressReporter {
    job_id: String,
    channel: ChannelHandle,
}

impl ProgressReporter {
    pub fn new(job_id: impl Into<String>, channel: ChannelHandle) -> Self {
        Self {
            job_id: job_id.into(),
            channel,
        }
    }

    /// Progress and segment frames may be dropped under backlog; the
    /// terminal frame is always delivered while the client is connected.
    pub fn report(&self, event: &EncodeEvent) {
        let notification = PushNotification::from_event(event);
        let delivered = if event.is_terminal() {
            self.channel.notify_reliably(notification)
        } else {
            self.channel.notify(notification)
        };
        if !delivered {
            debug!(job_id = %self.job_id, channel_id = %self.channel.id(), "Notification not delivered");
        }
    }
}

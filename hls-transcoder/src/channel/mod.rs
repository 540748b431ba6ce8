//! Registry of live push channels.
//!
//! A channel is registered when a client connects to the push endpoint and
//! removed when it disconnects. Jobs look their channel up once at submit
//! time and keep the [`ChannelHandle`]; a handle whose client went away simply
//! drops notifications. A slow client loses progress frames, never the final
//! `complete` or `error`.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::progress::PushNotification;

/// Per-channel notification buffer.
pub const CHANNEL_BUFFER: usize = 256;

/// Send side of one live channel.
#[derive(Debug, Clone)]
pub struct ChannelHandle {
    id: String,
    tx: mpsc::Sender<PushNotification>,
}

impl ChannelHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Queue a notification without waiting. Returns `false` if it was dropped.
    pub fn notify(&self, notification: PushNotification) -> bool {
        match self.tx.try_send(notification) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(channel_id = %self.id, "Push channel full, dropping notification");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(channel_id = %self.id, "Push channel closed, dropping notification");
                false
            }
        }
    }

    /// Queue a notification that must not be lost.
    ///
    /// When the buffer is full the send finishes in the background once the
    /// client drains it or disconnects. Returns `false` only if the channel is
    /// already closed.
    pub fn notify_reliably(&self, notification: PushNotification) -> bool {
        match self.tx.try_send(notification) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(notification)) => {
                debug!(channel_id = %self.id, "Push channel full, delivering in background");
                let tx = self.tx.clone();
                let id = self.id.clone();
                tokio::spawn(async move {
                    if tx.send(notification).await.is_err() {
                        debug!(channel_id = %id, "Push channel closed before delivery");
                    }
                });
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(channel_id = %self.id, "Push channel closed, dropping notification");
                false
            }
        }
    }
}

/// Maps channel ids to live handles.
#[derive(Debug, Clone, Default)]
pub struct ChannelRegistry {
    channels: Arc<DashMap<String, ChannelHandle>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new channel under a fresh id.
    pub fn register(&self) -> (ChannelHandle, mpsc::Receiver<PushNotification>) {
        self.register_with_id(Uuid::new_v4().simple().to_string())
    }

    /// Register under a caller-chosen id, replacing any previous holder.
    pub fn register_with_id(
        &self,
        id: impl Into<String>,
    ) -> (ChannelHandle, mpsc::Receiver<PushNotification>) {
        let (tx, rx) = mpsc::channel(CHANNEL_BUFFER);
        let handle = ChannelHandle { id: id.into(), tx };
        if self
            .channels
            .insert(handle.id.clone(), handle.clone())
            .is_some()
        {
            warn!(channel_id = %handle.id, "Replaced existing live channel");
        }
        debug!(channel_id = %handle.id, "Live channel registered");
        (handle, rx)
    }

    /// Live handle for `id`, if connected.
    pub fn resolve(&self, id: &str) -> Option<ChannelHandle> {
        self.channels
            .get(id)
            .map(|entry| entry.value().clone())
            .filter(|handle| !handle.is_closed())
    }

    pub fn unregister(&self, id: &str) {
        if self.channels.remove(id).is_some() {
            debug!(channel_id = %id, "Live channel unregistered");
        }
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

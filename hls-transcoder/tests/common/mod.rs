#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use hls_transcoder::encoder::{EncodeEngine, EncodeEvent, EncodeHandle};
use hls_transcoder::progress::PushNotification;
use hls_transcoder::publish::RemoteStore;
use hls_transcoder::{Error, Result};
use tokio::sync::mpsc;

/// Engine that replays a fixed list of events.
pub struct ScriptedEngine {
    events: Vec<EncodeEvent>,
    starts: AtomicUsize,
}

impl ScriptedEngine {
    pub fn new(events: Vec<EncodeEvent>) -> Arc<Self> {
        Arc::new(Self {
            events,
            starts: AtomicUsize::new(0),
        })
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EncodeEngine for ScriptedEngine {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn start(&self, handle: Arc<EncodeHandle>) -> Result<()> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        let events = self.events.clone();
        tokio::spawn(async move {
            for event in events {
                if handle.event_tx.send(event).await.is_err() {
                    break;
                }
                tokio::task::yield_now().await;
            }
        });
        Ok(())
    }

    fn is_available(&self) -> bool {
        true
    }

    fn version(&self) -> Option<String> {
        Some("scripted 1.0".to_string())
    }
}

/// One recorded `store` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreCall {
    pub published_name: String,
    pub file_path: String,
    pub identity_token: String,
}

/// Records every upload; rejects names in `reject`.
#[derive(Default)]
pub struct RecordingStore {
    pub calls: Mutex<Vec<StoreCall>>,
    pub reject: Vec<String>,
}

impl RecordingStore {
    pub fn rejecting(names: &[&str]) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            reject: names.iter().map(|n| n.to_string()).collect(),
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.published_name.clone())
            .collect()
    }
}

#[async_trait]
impl RemoteStore for RecordingStore {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn store(&self, file_path: &Path, published_name: &str, identity_token: &str) -> Result<()> {
        self.calls.lock().unwrap().push(StoreCall {
            published_name: published_name.to_string(),
            file_path: file_path.to_string_lossy().to_string(),
            identity_token: identity_token.to_string(),
        });
        if self.reject.iter().any(|r| r == published_name) {
            return Err(Error::Publish(format!("{published_name} rejected")));
        }
        Ok(())
    }
}

pub fn opened(rendition: &str, index: u32) -> EncodeEvent {
    EncodeEvent::SegmentOpened {
        rendition: rendition.to_string(),
        index,
    }
}

/// Collect notifications up to and including the terminal one.
pub async fn until_terminal(rx: &mut mpsc::Receiver<PushNotification>) -> Vec<PushNotification> {
    let mut out = Vec::new();
    while let Some(n) = rx.recv().await {
        let done = matches!(n, PushNotification::Complete | PushNotification::Error { .. });
        out.push(n);
        if done {
            break;
        }
    }
    out
}

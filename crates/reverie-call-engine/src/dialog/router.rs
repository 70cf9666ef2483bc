//! Per-SID live-call registry
//!
//! The media-stream WebSocket handler and the status webhook both need to
//! reach a running call task by provider SID. This registry is the only
//! process-wide mutable state besides the TTS cache and the database pool;
//! its lifecycle is the process.

use dashmap::DashMap;
use reverie_core::ProviderCallSid;
use tokio::sync::mpsc;

use super::DialogEvent;

#[derive(Default)]
pub struct MediaStreamRouter {
    routes: DashMap<String, mpsc::Sender<DialogEvent>>,
}

impl MediaStreamRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, sid: &ProviderCallSid, sender: mpsc::Sender<DialogEvent>) {
        self.routes.insert(sid.as_str().to_string(), sender);
    }

    pub fn unregister(&self, sid: &ProviderCallSid) {
        self.routes.remove(sid.as_str());
    }

    pub fn sender_for(&self, sid: &ProviderCallSid) -> Option<mpsc::Sender<DialogEvent>> {
        self.routes.get(sid.as_str()).map(|entry| entry.clone())
    }

    pub fn contains(&self, sid: &ProviderCallSid) -> bool {
        self.routes.contains_key(sid.as_str())
    }

    /// Best-effort delivery to a live call task. Returns false when no task
    /// is registered or the task is gone.
    pub async fn dispatch(&self, sid: &ProviderCallSid, event: DialogEvent) -> bool {
        match self.sender_for(sid) {
            Some(sender) => sender.send(event).await.is_ok(),
            None => false,
        }
    }

    pub fn live_call_count(&self) -> usize {
        self.routes.len()
    }
}

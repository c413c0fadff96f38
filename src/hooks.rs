//! Publish-only upload event feed
//!
//! External listeners subscribe to lifecycle events; the engine publishes
//! fire-and-forget and never blocks on or observes listener behavior. The
//! bus is injected into the registry and finalize path rather than reached
//! through a global.

use tokio::sync::broadcast;

use crate::upload::UploadedItem;

/// Lifecycle events emitted by the upload engine.
#[derive(Debug, Clone)]
pub enum UploadEvent {
    /// A new upload stream was opened.
    StreamCreated {
        stream_id: String,
        extension: String,
        name: Option<String>,
    },
    /// A chunk was accepted into a stream.
    ChunkReceived { stream_id: String, size: usize },
    /// A stream was promoted into a durable item.
    StreamFinalized { item: UploadedItem },
}

/// Broadcast bus for [`UploadEvent`]s.
///
/// Publishing with no subscribers is a no-op; a slow subscriber lags and
/// drops events rather than backpressuring the engine.
#[derive(Clone)]
pub struct HookBus {
    tx: broadcast::Sender<UploadEvent>,
}

impl HookBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, event: UploadEvent) {
        // send only fails with no subscribers; either way the engine moves on
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UploadEvent> {
        self.tx.subscribe()
    }
}

impl Default for HookBus {
    fn default() -> Self {
        Self::new(256)
    }
}

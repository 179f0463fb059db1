//! # Event Bus
//!
//! Broadcast channel for run progress events, built on
//! `tokio::sync::broadcast`. Subscribers (UIs, log shippers, tests) observe
//! the engine without the engine knowing about them; a slow subscriber lags
//! and drops events rather than blocking workers.

use tokio::sync::broadcast;

/// Progress events emitted during a sync run.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// Discovery finished; a run is about to start
    RunStarted { total_items: usize, dry_run: bool },
    /// A worker picked up an item
    ItemStarted { sku: String },
    /// An item reached a terminal outcome
    ItemCompleted { sku: String, action: String },
    /// The backpressure monitor paused outbound work
    BackpressurePause { cooldown_secs: u64 },
    /// Cooperative shutdown was requested; no new items will be dispatched
    ShutdownRequested,
    /// The run finished (normally or via shutdown)
    RunCompleted {
        total: usize,
        failed: usize,
        elapsed_ms: u64,
    },
}

/// Central broadcast bus for [`SyncEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SyncEvent>,
}

impl EventBus {
    /// Create a bus with the given buffer size. Events beyond the buffer are
    /// dropped for lagging subscribers (`RecvError::Lagged`).
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event. Returns the number of subscribers that will see it;
    /// emitting without subscribers is not an error.
    pub fn emit(&self, event: SyncEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_emitted_events() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.emit(SyncEvent::ItemStarted { sku: "SKU-1".into() });
        let event = rx.recv().await.unwrap();
        assert_eq!(event, SyncEvent::ItemStarted { sku: "SKU-1".into() });
    }

    #[tokio::test]
    async fn emit_without_subscribers_is_not_an_error() {
        let bus = EventBus::new(16);
        assert_eq!(bus.emit(SyncEvent::ShutdownRequested), 0);
    }
}

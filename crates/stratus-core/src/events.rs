//! Payload-free application event bus.
//!
//! Cross-component invalidation signals. Events deliberately carry no data:
//! subscribers re-read authoritative storage on notification, which avoids
//! stale-payload bugs when several writers race on the same key.

use tokio::sync::broadcast;

/// Application-level broadcast events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEvent {
    /// The favorites list changed; favorites views should re-read storage.
    FavoritesChanged,
    /// The temperature-unit preference changed; temperature views should
    /// re-read storage.
    UnitPreferenceChanged,
}

/// Minimal publish/subscribe channel for [`AppEvent`]s.
///
/// Notify-all, fire-and-forget. Publishing with no subscribers is a no-op.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AppEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(16);
        Self { tx }
    }

    /// Register a new subscriber. Each receiver sees every event published
    /// after its creation.
    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.tx.subscribe()
    }

    /// Notify all current subscribers.
    pub fn publish(&self, event: AppEvent) {
        // send() only fails when there are no receivers, which is fine.
        let delivered = self.tx.send(event).unwrap_or(0);
        tracing::debug!(?event, delivered, "published app event");
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

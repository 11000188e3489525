//! In-process notification bus.

use tokio::sync::broadcast;
use tracing::debug;

use termhub_core::Notifier;

/// An event published on the bus.
#[derive(Debug, Clone)]
pub struct BusEvent {
    /// Topic name, e.g. `output-flood`
    pub topic: String,
    /// JSON payload
    pub payload: serde_json::Value,
}

/// Broadcast-backed notification bus.
///
/// Publishing never blocks and never fails: events published with no
/// subscriber listening are dropped, which is the right behavior for
/// best-effort user-facing warnings.
pub struct EventBus {
    tx: broadcast::Sender<BusEvent>,
}

impl EventBus {
    /// Create a bus with the given per-subscriber buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all events published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.tx.subscribe()
    }
}

impl Notifier for EventBus {
    fn publish(&self, topic: &str, payload: serde_json::Value) {
        debug!("Publishing event: topic={}", topic);
        let _ = self.tx.send(BusEvent {
            topic: topic.to_string(),
            payload,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();

        bus.publish("output-flood", serde_json::json!({"interval_bytes": 123}));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.topic, "output-flood");
        assert_eq!(event.payload["interval_bytes"], 123);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_silent() {
        let bus = EventBus::new(8);
        bus.publish("output-overflow", serde_json::json!({}));
    }

    #[tokio::test]
    async fn test_multiple_subscribers_see_events() {
        let bus = EventBus::new(8);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        bus.publish("output-flood-resumed", serde_json::json!({}));

        assert_eq!(a.recv().await.unwrap().topic, "output-flood-resumed");
        assert_eq!(b.recv().await.unwrap().topic, "output-flood-resumed");
    }
}

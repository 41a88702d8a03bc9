//! In-process event fan-out on a bounded tokio broadcast channel.

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::bus::EventBus;
use crate::domain::EventEnvelope;
use crate::error::Result;

/// Broadcast bus; gateway clients subscribe to it.
#[derive(Debug, Clone)]
pub struct BroadcastBus {
    tx: broadcast::Sender<EventEnvelope>,
}

impl BroadcastBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Receive every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[async_trait]
impl EventBus for BroadcastBus {
    async fn publish(&self, event: &EventEnvelope) -> Result<()> {
        match self.tx.send(event.clone()) {
            Ok(count) => log::trace!("{} delivered to {} subscribers", event.event_type, count),
            Err(_) => log::trace!("{} published with no subscribers", event.event_type),
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "broadcast"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{RequestContext, TenantId, event_types};

    fn event() -> EventEnvelope {
        let ctx = RequestContext::new(TenantId::new("a").unwrap(), "system");
        EventEnvelope::new(event_types::QUOTE_SENT, &ctx, serde_json::json!({"id": "q1"}))
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_succeeds() {
        let bus = BroadcastBus::new(4);
        assert_eq!(bus.subscriber_count(), 0);
        bus.publish(&event()).await.unwrap();
    }

    #[tokio::test]
    async fn test_subscriber_receives_event() {
        let bus = BroadcastBus::new(4);
        let mut rx = bus.subscribe();
        let sent = event();
        bus.publish(&sent).await.unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received, sent);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let bus = BroadcastBus::new(0);
        let _rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
    }
}

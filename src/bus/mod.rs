//! Message bus publication
//!
//! Events are written to the outbox inside the mutating transaction, then
//! handed to an [`EventBus`] after commit. Delivery is best-effort: see
//! [`Publisher`].

pub mod broadcast;
pub mod jsonl;
pub mod publisher;

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;

use crate::domain::EventEnvelope;
use crate::error::{JobBuildaError, Result};

pub use broadcast::BroadcastBus;
pub use jsonl::JsonlBus;
pub use publisher::Publisher;

/// A destination for outbox events.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish one event.
    async fn publish(&self, event: &EventEnvelope) -> Result<()>;

    /// Short name used in log lines
    fn name(&self) -> &str;
}

/// Publishes to several buses concurrently.
///
/// Every member sees the event; the call fails if any member failed.
pub struct FanoutBus {
    buses: Vec<Arc<dyn EventBus>>,
}

impl FanoutBus {
    pub fn new(buses: Vec<Arc<dyn EventBus>>) -> Self {
        Self { buses }
    }
}

#[async_trait]
impl EventBus for FanoutBus {
    async fn publish(&self, event: &EventEnvelope) -> Result<()> {
        let results = join_all(self.buses.iter().map(|bus| bus.publish(event))).await;

        let failures: Vec<String> = self
            .buses
            .iter()
            .zip(results)
            .filter_map(|(bus, result)| result.err().map(|e| format!("{}: {}", bus.name(), e)))
            .collect();

        if failures.is_empty() {
            Ok(())
        } else {
            Err(JobBuildaError::Bus(failures.join("; ")))
        }
    }

    fn name(&self) -> &str {
        "fanout"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{RequestContext, TenantId, event_types};

    struct FailingBus;

    #[async_trait]
    impl EventBus for FailingBus {
        async fn publish(&self, _event: &EventEnvelope) -> Result<()> {
            Err(JobBuildaError::Bus("broker unreachable".to_string()))
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    fn event() -> EventEnvelope {
        let ctx = RequestContext::new(TenantId::new("a").unwrap(), "system");
        EventEnvelope::new(event_types::JOB_STARTED, &ctx, serde_json::Value::Null)
    }

    #[tokio::test]
    async fn test_fanout_delivers_to_every_member() {
        let first = Arc::new(BroadcastBus::new(8));
        let second = Arc::new(BroadcastBus::new(8));
        let mut rx1 = first.subscribe();
        let mut rx2 = second.subscribe();
        let buses: Vec<Arc<dyn EventBus>> = vec![first.clone(), second.clone()];
        let fanout = FanoutBus::new(buses);

        let event = event();
        fanout.publish(&event).await.unwrap();

        assert_eq!(rx1.recv().await.unwrap().id, event.id);
        assert_eq!(rx2.recv().await.unwrap().id, event.id);
    }

    #[tokio::test]
    async fn test_fanout_reports_member_failure() {
        let ok = Arc::new(BroadcastBus::new(8));
        let mut rx = ok.subscribe();
        let buses: Vec<Arc<dyn EventBus>> = vec![ok.clone(), Arc::new(FailingBus)];
        let fanout = FanoutBus::new(buses);

        let err = fanout.publish(&event()).await.unwrap_err();
        assert!(err.to_string().contains("failing: "));
        assert!(rx.recv().await.is_ok());
    }

    #[tokio::test]
    async fn test_empty_fanout_succeeds() {
        let fanout = FanoutBus::new(Vec::new());
        fanout.publish(&event()).await.unwrap();
    }
}

//! Post-commit event delivery.

use std::sync::Arc;

use crate::bus::EventBus;
use crate::domain::EventEnvelope;
use crate::store::{Database, outbox};

/// Hands committed outbox events to the bus.
///
/// Delivery never fails the caller: the mutation has already committed, so
/// a bus error only leaves the outbox row unpublished.
#[derive(Clone)]
pub struct Publisher {
    db: Arc<Database>,
    bus: Arc<dyn EventBus>,
}

impl Publisher {
    pub fn new(db: Arc<Database>, bus: Arc<dyn EventBus>) -> Self {
        Self { db, bus }
    }

    /// Publish `event`; returns whether the bus accepted it.
    pub async fn deliver(&self, event: &EventEnvelope) -> bool {
        if let Err(e) = self.bus.publish(event).await {
            log::warn!(
                "Failed to publish {} {} via {}: {}",
                event.event_type,
                event.id,
                self.bus.name(),
                e
            );
            return false;
        }

        if let Err(e) = self.db.write(|tx| outbox::mark_published(tx, &event.id)) {
            log::warn!("Published {} but could not mark it: {}", event.id, e);
        }
        log::debug!("Published {} {} for {}", event.event_type, event.id, event.tenant_id);
        true
    }
}

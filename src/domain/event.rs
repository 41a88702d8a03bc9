//! Outbox event envelope.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::tenant::{RequestContext, TenantId};
use crate::id::{new_id, now_rfc3339};

/// Event type constants
pub mod event_types {
    pub const QUOTE_CREATED: &str = "quote.created";
    pub const QUOTE_UPDATED: &str = "quote.updated";
    pub const QUOTE_SENT: &str = "quote.sent";
    pub const QUOTE_APPROVED: &str = "quote.approved";
    pub const QUOTE_REJECTED: &str = "quote.rejected";

    pub const INVOICE_CREATED: &str = "invoice.created";
    pub const INVOICE_SENT: &str = "invoice.sent";
    pub const INVOICE_PARTIALLY_PAID: &str = "invoice.partially_paid";
    pub const INVOICE_PAID: &str = "invoice.paid";
    pub const INVOICE_CANCELLED: &str = "invoice.cancelled";

    pub const JOB_CREATED: &str = "job.created";
    pub const JOB_STARTED: &str = "job.started";
    pub const JOB_COMPLETED: &str = "job.completed";
    pub const JOB_CANCELLED: &str = "job.cancelled";
    pub const JOB_TIME_LOGGED: &str = "job.time_logged";

    pub const VARIATION_CREATED: &str = "variation.created";
    pub const VARIATION_APPROVED: &str = "variation.approved";
    pub const VARIATION_REJECTED: &str = "variation.rejected";
    pub const VARIATION_COMPLETED: &str = "variation.completed";

    pub const TEST_CREATED: &str = "test.created";
    pub const TEST_STARTED: &str = "test.started";
    pub const TEST_RESULT_RECORDED: &str = "test.result_recorded";
    pub const TEST_COMPLETED: &str = "test.completed";

    pub const EXPENSE_RECORDED: &str = "expense.recorded";

    pub const CATALOG_ITEM_SAVED: &str = "catalog.item_saved";
    pub const MATERIAL_DRAWN: &str = "material.drawn";
    pub const MATERIAL_RETURNED: &str = "material.returned";
}

/// A state change queued for asynchronous downstream consumption.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventEnvelope {
    pub id: String,
    /// `<entity>.<action>`, e.g. "invoice.paid"
    pub event_type: String,
    pub tenant_id: TenantId,
    /// UTC RFC 3339
    pub occurred_at: String,
    pub actor: String,
    /// Snapshot of the mutated row
    pub payload: Value,
    pub schema: String,
}

impl EventEnvelope {
    pub fn new(event_type: &str, ctx: &RequestContext, payload: Value) -> Self {
        Self {
            id: new_id(),
            event_type: event_type.to_string(),
            tenant_id: ctx.tenant_id.clone(),
            occurred_at: now_rfc3339(),
            actor: ctx.actor.clone(),
            payload,
            schema: schema_for(event_type),
        }
    }
}

/// Schema identifier carried on every envelope
pub fn schema_for(event_type: &str) -> String {
    format!("jobbuilda.{}.v1", event_type)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> RequestContext {
        RequestContext::new(TenantId::new("tenant-a").unwrap(), "sparky@example.com")
    }

    #[test]
    fn test_envelope_new() {
        let event = EventEnvelope::new(event_types::QUOTE_SENT, &ctx(), serde_json::json!({"id": "q1"}));
        assert_eq!(event.id.len(), 36);
        assert_eq!(event.event_type, "quote.sent");
        assert_eq!(event.tenant_id.as_str(), "tenant-a");
        assert_eq!(event.actor, "sparky@example.com");
        assert_eq!(event.schema, "jobbuilda.quote.sent.v1");
        assert_eq!(event.payload["id"], "q1");
    }

    #[test]
    fn test_serialization_roundtrip() {
        let event = EventEnvelope::new(event_types::TEST_COMPLETED, &ctx(), serde_json::json!({"outcome": "satisfactory"}));
        let json = serde_json::to_string(&event).unwrap();
        let restored: EventEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(event, restored);
    }
}

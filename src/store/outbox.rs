//! Outbox table: one row per emitted event, written in the same
//! transaction as the mutation that produced it.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row, params};
use serde::{Deserialize, Serialize};

use crate::domain::{EventEnvelope, TenantId};
use crate::error::Result;
use crate::id::now;
use crate::store::col;

/// An outbox row: the event plus its delivery stamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEntry {
    /// Emission order within the database; pass as `after` to page forward
    pub seq: i64,
    #[serde(flatten)]
    pub event: EventEnvelope,
    /// Set once the bus accepted the event; stays empty on failed delivery
    pub published_at: Option<DateTime<Utc>>,
}

/// Queue an event alongside the mutation that produced it.
pub fn enqueue(conn: &Connection, event: &EventEnvelope) -> Result<()> {
    let payload = serde_json::to_string(&event.payload)?;
    conn.execute(
        r#"
        INSERT INTO outbox (id, tenant_id, event_type, occurred_at, actor, payload, schema)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
        params![
            event.id,
            event.tenant_id.as_str(),
            event.event_type,
            event.occurred_at,
            event.actor,
            payload,
            event.schema,
        ],
    )?;
    Ok(())
}

/// Stamp an event as delivered to the bus.
pub fn mark_published(conn: &Connection, event_id: &str) -> Result<()> {
    conn.execute(
        "UPDATE outbox SET published_at = ?1 WHERE id = ?2 AND published_at IS NULL",
        params![now(), event_id],
    )?;
    Ok(())
}

fn from_row(row: &Row<'_>) -> rusqlite::Result<OutboxEntry> {
    Ok(OutboxEntry {
        seq: row.get("seq")?,
        event: EventEnvelope {
            id: row.get("id")?,
            event_type: row.get("event_type")?,
            tenant_id: col::tenant(row, "tenant_id")?,
            occurred_at: row.get("occurred_at")?,
            actor: row.get("actor")?,
            payload: col::json(row, "payload")?,
            schema: row.get("schema")?,
        },
        published_at: row.get("published_at")?,
    })
}

/// The newest `limit` events for one tenant, returned in emission order.
pub fn list(conn: &Connection, tenant: &TenantId, pending_only: bool, limit: usize) -> Result<Vec<OutboxEntry>> {
    let sql = if pending_only {
        "SELECT * FROM outbox WHERE tenant_id = ?1 AND published_at IS NULL ORDER BY seq DESC LIMIT ?2"
    } else {
        "SELECT * FROM outbox WHERE tenant_id = ?1 ORDER BY seq DESC LIMIT ?2"
    };
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params![tenant.as_str(), limit as i64], from_row)?;
    let mut entries = rows.collect::<rusqlite::Result<Vec<_>>>()?;
    entries.reverse();
    Ok(entries)
}

/// Up to `limit` events emitted after `after_seq`, oldest first.
pub fn list_after(
    conn: &Connection,
    tenant: &TenantId,
    pending_only: bool,
    after_seq: i64,
    limit: usize,
) -> Result<Vec<OutboxEntry>> {
    let sql = if pending_only {
        "SELECT * FROM outbox WHERE tenant_id = ?1 AND seq > ?2 AND published_at IS NULL ORDER BY seq LIMIT ?3"
    } else {
        "SELECT * FROM outbox WHERE tenant_id = ?1 AND seq > ?2 ORDER BY seq LIMIT ?3"
    };
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params![tenant.as_str(), after_seq, limit as i64], from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{RequestContext, event_types};
    use crate::store::Database;

    fn ctx(tenant: &str) -> RequestContext {
        RequestContext::new(TenantId::new(tenant).unwrap(), "system")
    }

    #[test]
    fn test_enqueue_and_list() {
        let db = Database::open_in_memory().unwrap();
        let event = EventEnvelope::new(event_types::JOB_STARTED, &ctx("a"), serde_json::json!({"id": "j1"}));
        db.write(|tx| enqueue(tx, &event)).unwrap();

        let entries = db.read(|conn| list(conn, &ctx("a").tenant_id, false, 100)).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].event, event);
        assert!(entries[0].published_at.is_none());
    }

    #[test]
    fn test_list_is_tenant_scoped() {
        let db = Database::open_in_memory().unwrap();
        let event = EventEnvelope::new(event_types::JOB_STARTED, &ctx("a"), serde_json::Value::Null);
        db.write(|tx| enqueue(tx, &event)).unwrap();

        let entries = db.read(|conn| list(conn, &ctx("b").tenant_id, false, 100)).unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn test_mark_published_filters_pending() {
        let db = Database::open_in_memory().unwrap();
        let first = EventEnvelope::new(event_types::QUOTE_SENT, &ctx("a"), serde_json::Value::Null);
        let second = EventEnvelope::new(event_types::QUOTE_APPROVED, &ctx("a"), serde_json::Value::Null);
        db.write(|tx| {
            enqueue(tx, &first)?;
            enqueue(tx, &second)
        })
        .unwrap();
        db.write(|tx| mark_published(tx, &first.id)).unwrap();

        let tenant = ctx("a").tenant_id;
        let pending = db.read(|conn| list(conn, &tenant, true, 100)).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].event.id, second.id);

        let all = db.read(|conn| list(conn, &tenant, false, 100)).unwrap();
        assert_eq!(all[0].event.id, first.id);
        assert!(all[0].published_at.is_some());
    }

    #[test]
    fn test_list_keeps_the_newest_events_past_the_limit() {
        let db = Database::open_in_memory().unwrap();
        let events: Vec<EventEnvelope> = (0..5)
            .map(|n| EventEnvelope::new(event_types::EXPENSE_RECORDED, &ctx("a"), serde_json::json!({"n": n})))
            .collect();
        db.write(|tx| events.iter().try_for_each(|e| enqueue(tx, e))).unwrap();
        let tenant = ctx("a").tenant_id;

        let newest = db.read(|conn| list(conn, &tenant, false, 2)).unwrap();
        let payloads: Vec<i64> = newest.iter().map(|e| e.event.payload["n"].as_i64().unwrap()).collect();
        assert_eq!(payloads, vec![3, 4]);
        assert!(newest[0].seq < newest[1].seq);

        let pending = db.read(|conn| list(conn, &tenant, true, 1)).unwrap();
        assert_eq!(pending[0].event.id, events[4].id);
    }

    #[test]
    fn test_list_after_pages_forward() {
        let db = Database::open_in_memory().unwrap();
        for n in 0..5 {
            let event = EventEnvelope::new(event_types::EXPENSE_RECORDED, &ctx("a"), serde_json::json!({"n": n}));
            db.write(|tx| enqueue(tx, &event)).unwrap();
        }
        let tenant = ctx("a").tenant_id;

        let first = db.read(|conn| list_after(conn, &tenant, false, 0, 2)).unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].event.payload["n"], 0);

        let rest = db.read(|conn| list_after(conn, &tenant, false, first[1].seq, 10)).unwrap();
        let payloads: Vec<i64> = rest.iter().map(|e| e.event.payload["n"].as_i64().unwrap()).collect();
        assert_eq!(payloads, vec![2, 3, 4]);
    }
}

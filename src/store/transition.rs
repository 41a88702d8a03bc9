//! Guarded status transition.
//!
//! The status check and the write are one statement:
//! `UPDATE ... WHERE id = ? AND tenant_id = ? AND status IN (<from>)`.
//! When no row changes, the row is re-read to tell a missing (or foreign
//! tenant's) entity apart from one in the wrong status.

use rusqlite::{Connection, ToSql};

use crate::domain::{Status, TenantId, Transition};
use crate::error::{JobBuildaError, Result};
use crate::id::now;
use crate::store::current_status;

/// Apply `transition` to one row, also setting `extra` columns on success.
pub fn apply<S: Status>(
    conn: &Connection,
    table: &str,
    id: &str,
    tenant: &TenantId,
    transition: &Transition<S>,
    extra: &[(&str, &dyn ToSql)],
) -> Result<()> {
    let to = transition.to.as_str();
    let updated_at = now();
    let tenant_id = tenant.as_str();
    let from = transition.from_strs();

    let mut sets = vec!["status = ?".to_string(), "updated_at = ?".to_string()];
    let mut values: Vec<&dyn ToSql> = vec![&to, &updated_at];
    for (column, value) in extra {
        sets.push(format!("{} = ?", column));
        values.push(*value);
    }
    values.push(&id);
    values.push(&tenant_id);
    for status in &from {
        values.push(status);
    }

    let placeholders = vec!["?"; from.len()].join(", ");
    let sql = format!(
        "UPDATE {} SET {} WHERE id = ? AND tenant_id = ? AND status IN ({})",
        table,
        sets.join(", "),
        placeholders
    );

    let changed = conn.execute(&sql, values.as_slice())?;
    if changed == 1 {
        log::debug!("{} {} {} -> {}", S::ENTITY, id, transition.action, to);
        return Ok(());
    }

    match current_status::<S>(conn, table, id, tenant)? {
        None => Err(JobBuildaError::not_found(S::ENTITY, id)),
        Some(current) => Err(JobBuildaError::Conflict {
            entity: S::ENTITY,
            id: id.to_string(),
            action: transition.action.to_string(),
            status: current.as_str().to_string(),
        }),
    }
}

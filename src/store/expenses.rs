use chrono::NaiveDate;
use rusqlite::{Connection, Row, params};

use crate::domain::{Expense, TenantId};
use crate::error::Result;
use crate::store::col;

fn from_row(row: &Row<'_>) -> rusqlite::Result<Expense> {
    Ok(Expense {
        id: row.get("id")?,
        tenant_id: col::tenant(row, "tenant_id")?,
        supplier: row.get("supplier")?,
        description: row.get("description")?,
        net_pence: row.get("net_pence")?,
        vat_pence: row.get("vat_pence")?,
        gross_pence: row.get("gross_pence")?,
        incurred_on: row.get("incurred_on")?,
        recorded_by: row.get("recorded_by")?,
        created_at: row.get("created_at")?,
    })
}

pub fn insert(conn: &Connection, expense: &Expense) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO expenses
        (id, tenant_id, supplier, description, net_pence, vat_pence, gross_pence, incurred_on, recorded_by, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        "#,
        params![
            expense.id,
            expense.tenant_id.as_str(),
            expense.supplier,
            expense.description,
            expense.net_pence,
            expense.vat_pence,
            expense.gross_pence,
            expense.incurred_on,
            expense.recorded_by,
            expense.created_at,
        ],
    )?;
    Ok(())
}

pub fn list(conn: &Connection, tenant: &TenantId) -> Result<Vec<Expense>> {
    let mut stmt = conn.prepare("SELECT * FROM expenses WHERE tenant_id = ?1 ORDER BY incurred_on, created_at")?;
    let rows = stmt.query_map(params![tenant.as_str()], from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Expenses dated inside `[from, to]`.
pub fn list_between(conn: &Connection, tenant: &TenantId, from: NaiveDate, to: NaiveDate) -> Result<Vec<Expense>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT * FROM expenses
        WHERE tenant_id = ?1 AND incurred_on >= ?2 AND incurred_on <= ?3
        ORDER BY incurred_on, created_at
        "#,
    )?;
    let rows = stmt.query_map(params![tenant.as_str(), from, to], from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::domain::{Quote, QuoteStatus, Status, TenantId};
use crate::error::{JobBuildaError, Result};
use crate::store::col;

pub const TABLE: &str = "quotes";

fn from_row(row: &Row<'_>) -> rusqlite::Result<Quote> {
    Ok(Quote {
        id: row.get("id")?,
        tenant_id: col::tenant(row, "tenant_id")?,
        quote_number: row.get("quote_number")?,
        client_id: row.get("client_id")?,
        title: row.get("title")?,
        notes: row.get("notes")?,
        status: col::status(row, "status")?,
        items: col::json(row, "items")?,
        net_pence: row.get("net_pence")?,
        vat_pence: row.get("vat_pence")?,
        gross_pence: row.get("gross_pence")?,
        valid_until: row.get("valid_until")?,
        sent_at: row.get("sent_at")?,
        decided_at: row.get("decided_at")?,
        rejection_reason: row.get("rejection_reason")?,
        created_by: row.get("created_by")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

pub fn insert(conn: &Connection, quote: &Quote) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO quotes
        (id, tenant_id, quote_number, client_id, title, notes, status, items,
         net_pence, vat_pence, gross_pence, valid_until, created_by, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
        "#,
        params![
            quote.id,
            quote.tenant_id.as_str(),
            quote.quote_number,
            quote.client_id,
            quote.title,
            quote.notes,
            quote.status.as_str(),
            serde_json::to_string(&quote.items)?,
            quote.net_pence,
            quote.vat_pence,
            quote.gross_pence,
            quote.valid_until,
            quote.created_by,
            quote.created_at,
            quote.updated_at,
        ],
    )?;
    Ok(())
}

/// Rewrite the editable content of a draft quote.
pub fn update_content(conn: &Connection, quote: &Quote) -> Result<()> {
    conn.execute(
        r#"
        UPDATE quotes
        SET title = ?1, notes = ?2, items = ?3, net_pence = ?4, vat_pence = ?5, gross_pence = ?6, updated_at = ?7
        WHERE id = ?8 AND tenant_id = ?9 AND status = 'draft'
        "#,
        params![
            quote.title,
            quote.notes,
            serde_json::to_string(&quote.items)?,
            quote.net_pence,
            quote.vat_pence,
            quote.gross_pence,
            quote.updated_at,
            quote.id,
            quote.tenant_id.as_str(),
        ],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, tenant: &TenantId, id: &str) -> Result<Option<Quote>> {
    Ok(conn
        .query_row(
            "SELECT * FROM quotes WHERE id = ?1 AND tenant_id = ?2",
            params![id, tenant.as_str()],
            from_row,
        )
        .optional()?)
}

/// Like [`get`], but a missing quote is an error.
pub fn require(conn: &Connection, tenant: &TenantId, id: &str) -> Result<Quote> {
    get(conn, tenant, id)?.ok_or_else(|| JobBuildaError::not_found(QuoteStatus::ENTITY, id))
}

pub fn list(conn: &Connection, tenant: &TenantId, status: Option<QuoteStatus>) -> Result<Vec<Quote>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT * FROM quotes
        WHERE tenant_id = ?1 AND (?2 IS NULL OR status = ?2)
        ORDER BY created_at, quote_number
        "#,
    )?;
    let rows = stmt.query_map(params![tenant.as_str(), status.map(|s| s.as_str())], from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

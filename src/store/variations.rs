use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::domain::{Status, TenantId, Variation, VariationStatus};
use crate::error::{JobBuildaError, Result};
use crate::store::col;

pub const TABLE: &str = "variations";

fn from_row(row: &Row<'_>) -> rusqlite::Result<Variation> {
    Ok(Variation {
        id: row.get("id")?,
        tenant_id: col::tenant(row, "tenant_id")?,
        job_id: row.get("job_id")?,
        description: row.get("description")?,
        net_pence: row.get("net_pence")?,
        vat_rate_bp: row.get("vat_rate_bp")?,
        vat_pence: row.get("vat_pence")?,
        gross_pence: row.get("gross_pence")?,
        status: col::status(row, "status")?,
        rejection_reason: row.get("rejection_reason")?,
        decided_at: row.get("decided_at")?,
        completed_at: row.get("completed_at")?,
        created_by: row.get("created_by")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

pub fn insert(conn: &Connection, variation: &Variation) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO variations
        (id, tenant_id, job_id, description, net_pence, vat_rate_bp, vat_pence, gross_pence,
         status, created_by, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
        "#,
        params![
            variation.id,
            variation.tenant_id.as_str(),
            variation.job_id,
            variation.description,
            variation.net_pence,
            variation.vat_rate_bp,
            variation.vat_pence,
            variation.gross_pence,
            variation.status.as_str(),
            variation.created_by,
            variation.created_at,
            variation.updated_at,
        ],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, tenant: &TenantId, id: &str) -> Result<Option<Variation>> {
    Ok(conn
        .query_row(
            "SELECT * FROM variations WHERE id = ?1 AND tenant_id = ?2",
            params![id, tenant.as_str()],
            from_row,
        )
        .optional()?)
}

pub fn require(conn: &Connection, tenant: &TenantId, id: &str) -> Result<Variation> {
    get(conn, tenant, id)?.ok_or_else(|| JobBuildaError::not_found(VariationStatus::ENTITY, id))
}

pub fn list(conn: &Connection, tenant: &TenantId, job_id: Option<&str>) -> Result<Vec<Variation>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT * FROM variations
        WHERE tenant_id = ?1 AND (?2 IS NULL OR job_id = ?2)
        ORDER BY created_at
        "#,
    )?;
    let rows = stmt.query_map(params![tenant.as_str(), job_id], from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

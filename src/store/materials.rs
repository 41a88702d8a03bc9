use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::domain::{CatalogItem, MaterialDraw, MaterialStatus, Status, TenantId};
use crate::error::{JobBuildaError, Result};
use crate::store::col;

pub const TABLE: &str = "material_draws";

/// Entity name for catalog lookups in errors
pub const CATALOG_ENTITY: &str = "catalog_item";

fn item_from_row(row: &Row<'_>) -> rusqlite::Result<CatalogItem> {
    Ok(CatalogItem {
        id: row.get("id")?,
        tenant_id: col::tenant(row, "tenant_id")?,
        supplier: row.get("supplier")?,
        sku: row.get("sku")?,
        description: row.get("description")?,
        unit: row.get("unit")?,
        unit_cost_pence: row.get("unit_cost_pence")?,
        markup_bp: row.get("markup_bp")?,
        unit_price_pence: row.get("unit_price_pence")?,
        vat_rate_bp: row.get("vat_rate_bp")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn draw_from_row(row: &Row<'_>) -> rusqlite::Result<MaterialDraw> {
    Ok(MaterialDraw {
        id: row.get("id")?,
        tenant_id: col::tenant(row, "tenant_id")?,
        job_id: row.get("job_id")?,
        catalog_item_id: row.get("catalog_item_id")?,
        supplier: row.get("supplier")?,
        sku: row.get("sku")?,
        description: row.get("description")?,
        quantity: row.get("quantity")?,
        unit_price_pence: row.get("unit_price_pence")?,
        vat_rate_bp: row.get("vat_rate_bp")?,
        net_pence: row.get("net_pence")?,
        status: col::status(row, "status")?,
        invoice_id: row.get("invoice_id")?,
        drawn_by: row.get("drawn_by")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

/// Insert a new catalog item or overwrite the one with the same supplier and SKU.
pub fn save_item(conn: &Connection, item: &CatalogItem) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO catalog_items
        (id, tenant_id, supplier, sku, description, unit, unit_cost_pence, markup_bp,
         unit_price_pence, vat_rate_bp, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
        ON CONFLICT (id) DO UPDATE SET
            description = excluded.description,
            unit = excluded.unit,
            unit_cost_pence = excluded.unit_cost_pence,
            markup_bp = excluded.markup_bp,
            unit_price_pence = excluded.unit_price_pence,
            vat_rate_bp = excluded.vat_rate_bp,
            updated_at = excluded.updated_at
        "#,
        params![
            item.id,
            item.tenant_id.as_str(),
            item.supplier,
            item.sku,
            item.description,
            item.unit,
            item.unit_cost_pence,
            item.markup_bp,
            item.unit_price_pence,
            item.vat_rate_bp,
            item.created_at,
            item.updated_at,
        ],
    )?;
    Ok(())
}

pub fn get_item(conn: &Connection, tenant: &TenantId, id: &str) -> Result<Option<CatalogItem>> {
    Ok(conn
        .query_row(
            "SELECT * FROM catalog_items WHERE id = ?1 AND tenant_id = ?2",
            params![id, tenant.as_str()],
            item_from_row,
        )
        .optional()?)
}

pub fn require_item(conn: &Connection, tenant: &TenantId, id: &str) -> Result<CatalogItem> {
    get_item(conn, tenant, id)?.ok_or_else(|| JobBuildaError::not_found(CATALOG_ENTITY, id))
}

pub fn find_item(conn: &Connection, tenant: &TenantId, supplier: &str, sku: &str) -> Result<Option<CatalogItem>> {
    Ok(conn
        .query_row(
            "SELECT * FROM catalog_items WHERE tenant_id = ?1 AND supplier = ?2 AND sku = ?3",
            params![tenant.as_str(), supplier, sku],
            item_from_row,
        )
        .optional()?)
}

/// Catalog items, optionally for one supplier and/or matching `search`
/// in the SKU or description.
pub fn list_items(
    conn: &Connection,
    tenant: &TenantId,
    supplier: Option<&str>,
    search: Option<&str>,
) -> Result<Vec<CatalogItem>> {
    let pattern = search.map(|s| format!("%{}%", s.to_lowercase()));
    let mut stmt = conn.prepare(
        r#"
        SELECT * FROM catalog_items
        WHERE tenant_id = ?1
          AND (?2 IS NULL OR supplier = ?2)
          AND (?3 IS NULL OR lower(sku) LIKE ?3 OR lower(description) LIKE ?3)
        ORDER BY supplier, sku
        "#,
    )?;
    let rows = stmt.query_map(params![tenant.as_str(), supplier, pattern], item_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn insert_draw(conn: &Connection, draw: &MaterialDraw) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO material_draws
        (id, tenant_id, job_id, catalog_item_id, supplier, sku, description, quantity,
         unit_price_pence, vat_rate_bp, net_pence, status, invoice_id, drawn_by, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
        "#,
        params![
            draw.id,
            draw.tenant_id.as_str(),
            draw.job_id,
            draw.catalog_item_id,
            draw.supplier,
            draw.sku,
            draw.description,
            draw.quantity,
            draw.unit_price_pence,
            draw.vat_rate_bp,
            draw.net_pence,
            draw.status.as_str(),
            draw.invoice_id,
            draw.drawn_by,
            draw.created_at,
            draw.updated_at,
        ],
    )?;
    Ok(())
}

pub fn get_draw(conn: &Connection, tenant: &TenantId, id: &str) -> Result<Option<MaterialDraw>> {
    Ok(conn
        .query_row(
            "SELECT * FROM material_draws WHERE id = ?1 AND tenant_id = ?2",
            params![id, tenant.as_str()],
            draw_from_row,
        )
        .optional()?)
}

pub fn require_draw(conn: &Connection, tenant: &TenantId, id: &str) -> Result<MaterialDraw> {
    get_draw(conn, tenant, id)?.ok_or_else(|| JobBuildaError::not_found(MaterialStatus::ENTITY, id))
}

pub fn list_draws(conn: &Connection, tenant: &TenantId, job_id: &str) -> Result<Vec<MaterialDraw>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM material_draws WHERE tenant_id = ?1 AND job_id = ?2 ORDER BY created_at, id",
    )?;
    let rows = stmt.query_map(params![tenant.as_str(), job_id], draw_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Drawn (not returned) materials on a job that no invoice has billed yet.
pub fn unbilled_draws(conn: &Connection, tenant: &TenantId, job_id: &str) -> Result<Vec<MaterialDraw>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT * FROM material_draws
        WHERE tenant_id = ?1 AND job_id = ?2 AND status = ?3 AND invoice_id IS NULL
        ORDER BY created_at, id
        "#,
    )?;
    let rows = stmt.query_map(
        params![tenant.as_str(), job_id, MaterialStatus::Drawn.as_str()],
        draw_from_row,
    )?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Link unbilled draws to an invoice; returns how many were claimed.
pub fn bill_draws(conn: &Connection, tenant: &TenantId, ids: &[String], invoice_id: &str) -> Result<usize> {
    let mut stmt = conn.prepare(
        r#"
        UPDATE material_draws SET invoice_id = ?1
        WHERE id = ?2 AND tenant_id = ?3 AND status = ?4 AND invoice_id IS NULL
        "#,
    )?;
    let mut billed = 0;
    for id in ids {
        billed += stmt.execute(params![invoice_id, id, tenant.as_str(), MaterialStatus::Drawn.as_str()])?;
    }
    Ok(billed)
}

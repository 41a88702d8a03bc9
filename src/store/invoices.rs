use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, Row, ToSql, params};

use crate::domain::{Invoice, InvoiceStatus, Payment, PaymentMethod, Status, TenantId};
use crate::error::{JobBuildaError, Result};
use crate::store::{col, placeholders, status_strs};

pub const TABLE: &str = "invoices";

fn from_row(row: &Row<'_>) -> rusqlite::Result<Invoice> {
    Ok(Invoice {
        id: row.get("id")?,
        tenant_id: col::tenant(row, "tenant_id")?,
        invoice_number: row.get("invoice_number")?,
        client_id: row.get("client_id")?,
        quote_id: row.get("quote_id")?,
        job_id: row.get("job_id")?,
        status: col::status(row, "status")?,
        items: col::json(row, "items")?,
        net_pence: row.get("net_pence")?,
        vat_pence: row.get("vat_pence")?,
        gross_pence: row.get("gross_pence")?,
        amount_paid_pence: row.get("amount_paid_pence")?,
        due_days: row.get("due_days")?,
        issued_on: row.get("issued_on")?,
        due_on: row.get("due_on")?,
        cancellation_reason: row.get("cancellation_reason")?,
        created_by: row.get("created_by")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn payment_from_row(row: &Row<'_>) -> rusqlite::Result<Payment> {
    Ok(Payment {
        id: row.get("id")?,
        tenant_id: col::tenant(row, "tenant_id")?,
        invoice_id: row.get("invoice_id")?,
        amount_pence: row.get("amount_pence")?,
        method: col::parsed(row, "method", PaymentMethod::parse)?,
        reference: row.get("reference")?,
        paid_on: row.get("paid_on")?,
        recorded_by: row.get("recorded_by")?,
        created_at: row.get("created_at")?,
    })
}

pub fn insert(conn: &Connection, invoice: &Invoice) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO invoices
        (id, tenant_id, invoice_number, client_id, quote_id, job_id, status, items,
         net_pence, vat_pence, gross_pence, amount_paid_pence, due_days, created_by, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
        "#,
        params![
            invoice.id,
            invoice.tenant_id.as_str(),
            invoice.invoice_number,
            invoice.client_id,
            invoice.quote_id,
            invoice.job_id,
            invoice.status.as_str(),
            serde_json::to_string(&invoice.items)?,
            invoice.net_pence,
            invoice.vat_pence,
            invoice.gross_pence,
            invoice.amount_paid_pence,
            invoice.due_days,
            invoice.created_by,
            invoice.created_at,
            invoice.updated_at,
        ],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, tenant: &TenantId, id: &str) -> Result<Option<Invoice>> {
    Ok(conn
        .query_row(
            "SELECT * FROM invoices WHERE id = ?1 AND tenant_id = ?2",
            params![id, tenant.as_str()],
            from_row,
        )
        .optional()?)
}

pub fn require(conn: &Connection, tenant: &TenantId, id: &str) -> Result<Invoice> {
    get(conn, tenant, id)?.ok_or_else(|| JobBuildaError::not_found(InvoiceStatus::ENTITY, id))
}

pub fn list(conn: &Connection, tenant: &TenantId, status: Option<InvoiceStatus>) -> Result<Vec<Invoice>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT * FROM invoices
        WHERE tenant_id = ?1 AND (?2 IS NULL OR status = ?2)
        ORDER BY created_at, invoice_number
        "#,
    )?;
    let rows = stmt.query_map(params![tenant.as_str(), status.map(|s| s.as_str())], from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Issued invoices (sent, partial, paid) with an issue date inside `[from, to]`.
pub fn list_issued_between(conn: &Connection, tenant: &TenantId, from: NaiveDate, to: NaiveDate) -> Result<Vec<Invoice>> {
    let tenant_id = tenant.as_str();
    let statuses = status_strs(InvoiceStatus::ISSUED);
    let sql = format!(
        r#"
        SELECT * FROM invoices
        WHERE tenant_id = ?1 AND issued_on >= ?2 AND issued_on <= ?3
          AND status IN ({})
        ORDER BY issued_on, invoice_number
        "#,
        placeholders(4, statuses.len())
    );
    let mut values: Vec<&dyn ToSql> = vec![&tenant_id, &from, &to];
    values.extend(statuses.iter().map(|s| s as &dyn ToSql));

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(values.as_slice(), from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn insert_payment(conn: &Connection, payment: &Payment) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO payments
        (id, tenant_id, invoice_id, amount_pence, method, reference, paid_on, recorded_by, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
        params![
            payment.id,
            payment.tenant_id.as_str(),
            payment.invoice_id,
            payment.amount_pence,
            payment.method.as_str(),
            payment.reference,
            payment.paid_on,
            payment.recorded_by,
            payment.created_at,
        ],
    )?;
    Ok(())
}

pub fn list_payments(conn: &Connection, tenant: &TenantId, invoice_id: &str) -> Result<Vec<Payment>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM payments WHERE tenant_id = ?1 AND invoice_id = ?2 ORDER BY paid_on, created_at",
    )?;
    let rows = stmt.query_map(params![tenant.as_str(), invoice_id], payment_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Sum of payments received with a paid date inside `[from, to]`.
pub fn payments_received_between(conn: &Connection, tenant: &TenantId, from: NaiveDate, to: NaiveDate) -> Result<i64> {
    Ok(conn.query_row(
        r#"
        SELECT COALESCE(SUM(amount_pence), 0) FROM payments
        WHERE tenant_id = ?1 AND paid_on >= ?2 AND paid_on <= ?3
        "#,
        params![tenant.as_str(), from, to],
        |row| row.get(0),
    )?)
}

/// Outstanding balance across every open (sent or part-paid) invoice.
pub fn outstanding_balance(conn: &Connection, tenant: &TenantId) -> Result<i64> {
    let tenant_id = tenant.as_str();
    let statuses = status_strs(InvoiceStatus::OPEN);
    let sql = format!(
        "SELECT COALESCE(SUM(gross_pence - amount_paid_pence), 0) FROM invoices WHERE tenant_id = ?1 AND status IN ({})",
        placeholders(2, statuses.len())
    );
    let mut values: Vec<&dyn ToSql> = vec![&tenant_id];
    values.extend(statuses.iter().map(|s| s as &dyn ToSql));
    Ok(conn.query_row(&sql, values.as_slice(), |row| row.get(0))?)
}

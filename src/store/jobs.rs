use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::domain::{Job, JobStatus, Status, TenantId, TimeEntry};
use crate::error::{JobBuildaError, Result};
use crate::store::col;

pub const TABLE: &str = "jobs";

fn from_row(row: &Row<'_>) -> rusqlite::Result<Job> {
    Ok(Job {
        id: row.get("id")?,
        tenant_id: col::tenant(row, "tenant_id")?,
        job_number: row.get("job_number")?,
        client_id: row.get("client_id")?,
        quote_id: row.get("quote_id")?,
        title: row.get("title")?,
        site_address: row.get("site_address")?,
        scheduled_for: row.get("scheduled_for")?,
        status: col::status(row, "status")?,
        started_at: row.get("started_at")?,
        completed_at: row.get("completed_at")?,
        cancellation_reason: row.get("cancellation_reason")?,
        created_by: row.get("created_by")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn time_entry_from_row(row: &Row<'_>) -> rusqlite::Result<TimeEntry> {
    Ok(TimeEntry {
        id: row.get("id")?,
        tenant_id: col::tenant(row, "tenant_id")?,
        job_id: row.get("job_id")?,
        worker: row.get("worker")?,
        hours: row.get("hours")?,
        rate_pence: row.get("rate_pence")?,
        cost_pence: row.get("cost_pence")?,
        worked_on: row.get("worked_on")?,
        description: row.get("description")?,
        created_at: row.get("created_at")?,
    })
}

pub fn insert(conn: &Connection, job: &Job) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO jobs
        (id, tenant_id, job_number, client_id, quote_id, title, site_address, scheduled_for,
         status, created_by, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
        "#,
        params![
            job.id,
            job.tenant_id.as_str(),
            job.job_number,
            job.client_id,
            job.quote_id,
            job.title,
            job.site_address,
            job.scheduled_for,
            job.status.as_str(),
            job.created_by,
            job.created_at,
            job.updated_at,
        ],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, tenant: &TenantId, id: &str) -> Result<Option<Job>> {
    Ok(conn
        .query_row(
            "SELECT * FROM jobs WHERE id = ?1 AND tenant_id = ?2",
            params![id, tenant.as_str()],
            from_row,
        )
        .optional()?)
}

pub fn require(conn: &Connection, tenant: &TenantId, id: &str) -> Result<Job> {
    get(conn, tenant, id)?.ok_or_else(|| JobBuildaError::not_found(JobStatus::ENTITY, id))
}

pub fn list(conn: &Connection, tenant: &TenantId, status: Option<JobStatus>) -> Result<Vec<Job>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT * FROM jobs
        WHERE tenant_id = ?1 AND (?2 IS NULL OR status = ?2)
        ORDER BY created_at, job_number
        "#,
    )?;
    let rows = stmt.query_map(params![tenant.as_str(), status.map(|s| s.as_str())], from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn insert_time_entry(conn: &Connection, entry: &TimeEntry) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO time_entries
        (id, tenant_id, job_id, worker, hours, rate_pence, cost_pence, worked_on, description, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        "#,
        params![
            entry.id,
            entry.tenant_id.as_str(),
            entry.job_id,
            entry.worker,
            entry.hours,
            entry.rate_pence,
            entry.cost_pence,
            entry.worked_on,
            entry.description,
            entry.created_at,
        ],
    )?;
    Ok(())
}

pub fn list_time_entries(conn: &Connection, tenant: &TenantId, job_id: &str) -> Result<Vec<TimeEntry>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM time_entries WHERE tenant_id = ?1 AND job_id = ?2 ORDER BY worked_on, created_at",
    )?;
    let rows = stmt.query_map(params![tenant.as_str(), job_id], time_entry_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

//! Storage layer for JobBuilda.
//!
//! One SQLite database shared by every service. All rows carry `tenant_id`
//! and every query filters on it. Writes run in IMMEDIATE transactions so a
//! status check, the row update, and the outbox insert commit together.
//!
//! # Example
//!
//! ```ignore
//! use jobbuilda::store::{Database, quotes};
//!
//! let db = Database::open_in_memory()?;
//! let quote = db.read(|conn| quotes::require(conn, &tenant, "q-1"))?;
//! ```

pub mod compliance;
pub mod expenses;
pub mod invoices;
pub mod jobs;
pub mod materials;
pub mod outbox;
pub mod quotes;
pub mod report_cache;
pub mod transition;
pub mod variations;

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, Transaction, TransactionBehavior, params};
use serde::de::DeserializeOwned;

use crate::domain::{Status, TenantId};
use crate::error::{JobBuildaError, Result};
use crate::id::document_number;

/// Shared database handle.
///
/// The connection lives behind a mutex; callers hold it only for the
/// duration of one synchronous closure, never across an `.await`.
pub struct Database {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}

impl Database {
    /// Open or create the database file. `:memory:` opens a private in-memory store.
    pub fn open(path: &Path) -> Result<Self> {
        if path.as_os_str() == ":memory:" {
            return Self::open_in_memory();
        }
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        init_schema(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Lock the connection, recovering it if a previous holder panicked.
    ///
    /// A panic inside `write` drops its `Transaction`, which rolls back, so
    /// the connection is still consistent. Any transaction left open is
    /// rolled back here before the connection is handed out again.
    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| {
            log::warn!("Recovering database connection after a panicked request");
            let conn = poisoned.into_inner();
            if !conn.is_autocommit() {
                if let Err(e) = conn.execute_batch("ROLLBACK") {
                    log::error!("Rollback after panic failed: {}", e);
                }
            }
            self.conn.clear_poison();
            conn
        })
    }

    /// Run `f` inside an IMMEDIATE transaction, committing on `Ok`.
    pub fn write<T>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Run a read-only closure against the connection.
    pub fn read<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.lock();
        f(&conn)
    }
}

/// Initialize the SQLite schema.
fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS quotes (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            quote_number TEXT NOT NULL,
            client_id TEXT NOT NULL,
            title TEXT NOT NULL,
            notes TEXT,
            status TEXT NOT NULL,
            items TEXT NOT NULL,
            net_pence INTEGER NOT NULL,
            vat_pence INTEGER NOT NULL,
            gross_pence INTEGER NOT NULL,
            valid_until TEXT,
            sent_at TEXT,
            decided_at TEXT,
            rejection_reason TEXT,
            created_by TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (tenant_id, quote_number)
        );
        CREATE INDEX IF NOT EXISTS idx_quotes_tenant_status ON quotes(tenant_id, status);

        CREATE TABLE IF NOT EXISTS invoices (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            invoice_number TEXT NOT NULL,
            client_id TEXT NOT NULL,
            quote_id TEXT,
            job_id TEXT,
            status TEXT NOT NULL,
            items TEXT NOT NULL,
            net_pence INTEGER NOT NULL,
            vat_pence INTEGER NOT NULL,
            gross_pence INTEGER NOT NULL,
            amount_paid_pence INTEGER NOT NULL DEFAULT 0,
            due_days INTEGER NOT NULL,
            issued_on TEXT,
            due_on TEXT,
            cancellation_reason TEXT,
            created_by TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (tenant_id, invoice_number)
        );
        CREATE INDEX IF NOT EXISTS idx_invoices_tenant_status ON invoices(tenant_id, status);
        CREATE INDEX IF NOT EXISTS idx_invoices_tenant_issued ON invoices(tenant_id, issued_on);

        CREATE TABLE IF NOT EXISTS payments (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            invoice_id TEXT NOT NULL REFERENCES invoices(id),
            amount_pence INTEGER NOT NULL,
            method TEXT NOT NULL,
            reference TEXT,
            paid_on TEXT NOT NULL,
            recorded_by TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_payments_invoice ON payments(tenant_id, invoice_id);

        CREATE TABLE IF NOT EXISTS jobs (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            job_number TEXT NOT NULL,
            client_id TEXT NOT NULL,
            quote_id TEXT,
            title TEXT NOT NULL,
            site_address TEXT,
            scheduled_for TEXT,
            status TEXT NOT NULL,
            started_at TEXT,
            completed_at TEXT,
            cancellation_reason TEXT,
            created_by TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (tenant_id, job_number)
        );
        CREATE INDEX IF NOT EXISTS idx_jobs_tenant_status ON jobs(tenant_id, status);

        CREATE TABLE IF NOT EXISTS time_entries (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            job_id TEXT NOT NULL REFERENCES jobs(id),
            worker TEXT NOT NULL,
            hours REAL NOT NULL,
            rate_pence INTEGER NOT NULL,
            cost_pence INTEGER NOT NULL,
            worked_on TEXT NOT NULL,
            description TEXT,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_time_entries_job ON time_entries(tenant_id, job_id);

        CREATE TABLE IF NOT EXISTS variations (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            job_id TEXT NOT NULL REFERENCES jobs(id),
            description TEXT NOT NULL,
            net_pence INTEGER NOT NULL,
            vat_rate_bp INTEGER NOT NULL,
            vat_pence INTEGER NOT NULL,
            gross_pence INTEGER NOT NULL,
            status TEXT NOT NULL,
            rejection_reason TEXT,
            decided_at TEXT,
            completed_at TEXT,
            created_by TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_variations_job ON variations(tenant_id, job_id);

        CREATE TABLE IF NOT EXISTS compliance_tests (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            job_id TEXT,
            certificate_type TEXT NOT NULL,
            inspector TEXT NOT NULL,
            scheduled_for TEXT,
            status TEXT NOT NULL,
            outcome TEXT,
            certificate_number TEXT,
            started_at TEXT,
            completed_at TEXT,
            created_by TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_tests_tenant_status ON compliance_tests(tenant_id, status);

        CREATE TABLE IF NOT EXISTS circuit_results (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            test_id TEXT NOT NULL REFERENCES compliance_tests(id),
            circuit_ref TEXT NOT NULL,
            description TEXT,
            insulation_resistance_mohm REAL NOT NULL,
            zs_ohm REAL,
            max_zs_ohm REAL,
            rcd_trip_ms REAL,
            passed INTEGER NOT NULL,
            recorded_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_circuit_results_test ON circuit_results(tenant_id, test_id);

        CREATE TABLE IF NOT EXISTS expenses (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            supplier TEXT NOT NULL,
            description TEXT NOT NULL,
            net_pence INTEGER NOT NULL,
            vat_pence INTEGER NOT NULL,
            gross_pence INTEGER NOT NULL,
            incurred_on TEXT NOT NULL,
            recorded_by TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_expenses_tenant_date ON expenses(tenant_id, incurred_on);

        CREATE TABLE IF NOT EXISTS catalog_items (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            supplier TEXT NOT NULL,
            sku TEXT NOT NULL,
            description TEXT NOT NULL,
            unit TEXT NOT NULL,
            unit_cost_pence INTEGER NOT NULL,
            markup_bp INTEGER NOT NULL,
            unit_price_pence INTEGER NOT NULL,
            vat_rate_bp INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (tenant_id, supplier, sku)
        );

        CREATE TABLE IF NOT EXISTS material_draws (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            job_id TEXT NOT NULL REFERENCES jobs(id),
            catalog_item_id TEXT NOT NULL REFERENCES catalog_items(id),
            supplier TEXT NOT NULL,
            sku TEXT NOT NULL,
            description TEXT NOT NULL,
            quantity REAL NOT NULL,
            unit_price_pence INTEGER NOT NULL,
            vat_rate_bp INTEGER NOT NULL,
            net_pence INTEGER NOT NULL,
            status TEXT NOT NULL,
            invoice_id TEXT REFERENCES invoices(id),
            drawn_by TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_material_draws_job ON material_draws(tenant_id, job_id);

        CREATE TABLE IF NOT EXISTS outbox (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT NOT NULL UNIQUE,
            tenant_id TEXT NOT NULL,
            event_type TEXT NOT NULL,
            occurred_at TEXT NOT NULL,
            actor TEXT NOT NULL,
            payload TEXT NOT NULL,
            schema TEXT NOT NULL,
            published_at TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_outbox_tenant ON outbox(tenant_id, seq);

        CREATE TABLE IF NOT EXISTS report_cache (
            tenant_id TEXT NOT NULL,
            cache_key TEXT NOT NULL,
            report_type TEXT NOT NULL,
            payload TEXT NOT NULL,
            generated_at TEXT NOT NULL,
            expires_at TEXT NOT NULL,
            PRIMARY KEY (tenant_id, cache_key)
        );

        CREATE TABLE IF NOT EXISTS sequences (
            tenant_id TEXT NOT NULL,
            prefix TEXT NOT NULL,
            value INTEGER NOT NULL,
            PRIMARY KEY (tenant_id, prefix)
        );
        "#,
    )?;
    Ok(())
}

/// Allocate the next document number for a tenant, e.g. `INV-00007`.
///
/// Must run inside the writing transaction so the number and the row commit together.
pub fn next_number(conn: &Connection, tenant: &TenantId, prefix: &str) -> Result<String> {
    conn.execute(
        r#"
        INSERT INTO sequences (tenant_id, prefix, value) VALUES (?1, ?2, 1)
        ON CONFLICT (tenant_id, prefix) DO UPDATE SET value = value + 1
        "#,
        params![tenant.as_str(), prefix],
    )?;
    let value: i64 = conn.query_row(
        "SELECT value FROM sequences WHERE tenant_id = ?1 AND prefix = ?2",
        params![tenant.as_str(), prefix],
        |row| row.get(0),
    )?;
    Ok(document_number(prefix, value))
}

/// Read the status column of one tenant-scoped row.
pub(crate) fn current_status<S: Status>(
    conn: &Connection,
    table: &str,
    id: &str,
    tenant: &TenantId,
) -> Result<Option<S>> {
    let raw: Option<String> = conn
        .query_row(
            &format!("SELECT status FROM {} WHERE id = ?1 AND tenant_id = ?2", table),
            params![id, tenant.as_str()],
            |row| row.get(0),
        )
        .optional()?;
    match raw {
        None => Ok(None),
        Some(raw) => S::parse(&raw)
            .map(Some)
            .ok_or_else(|| JobBuildaError::Storage(format!("unknown {} status '{}'", S::ENTITY, raw))),
    }
}

/// Guard a non-transition mutation: the row must exist and be in one of `allowed`.
pub(crate) fn require_status<S: Status>(
    conn: &Connection,
    table: &str,
    id: &str,
    tenant: &TenantId,
    allowed: &[S],
    action: &str,
) -> Result<S> {
    match current_status::<S>(conn, table, id, tenant)? {
        None => Err(JobBuildaError::not_found(S::ENTITY, id)),
        Some(status) if allowed.contains(&status) => Ok(status),
        Some(status) => Err(JobBuildaError::Conflict {
            entity: S::ENTITY,
            id: id.to_string(),
            action: action.to_string(),
            status: status.as_str().to_string(),
        }),
    }
}

/// Numbered placeholders `?first, ?first+1, ...` for an `IN (...)` list.
pub(crate) fn placeholders(first: usize, count: usize) -> String {
    (first..first + count).map(|n| format!("?{}", n)).collect::<Vec<_>>().join(", ")
}

pub(crate) fn status_strs<S: Status>(statuses: &[S]) -> Vec<&'static str> {
    statuses.iter().map(|s| s.as_str()).collect()
}

fn conversion_error(column: &str, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(0, Type::Text, format!("{}: {}", column, message).into())
}

/// Column helpers for row mappers.
pub(crate) mod col {
    use super::*;

    pub fn tenant(row: &Row<'_>, column: &str) -> rusqlite::Result<TenantId> {
        Ok(TenantId::from_db(row.get(column)?))
    }

    pub fn status<S: Status>(row: &Row<'_>, column: &str) -> rusqlite::Result<S> {
        let raw: String = row.get(column)?;
        S::parse(&raw).ok_or_else(|| conversion_error(column, format!("unknown {} status '{}'", S::ENTITY, raw)))
    }

    pub fn parsed<T>(row: &Row<'_>, column: &str, parse: fn(&str) -> Option<T>) -> rusqlite::Result<T> {
        let raw: String = row.get(column)?;
        parse(&raw).ok_or_else(|| conversion_error(column, format!("unexpected value '{}'", raw)))
    }

    pub fn parsed_opt<T>(row: &Row<'_>, column: &str, parse: fn(&str) -> Option<T>) -> rusqlite::Result<Option<T>> {
        let raw: Option<String> = row.get(column)?;
        raw.map(|raw| parse(&raw).ok_or_else(|| conversion_error(column, format!("unexpected value '{}'", raw))))
            .transpose()
    }

    pub fn json<T: DeserializeOwned>(row: &Row<'_>, column: &str) -> rusqlite::Result<T> {
        let raw: String = row.get(column)?;
        serde_json::from_str(&raw).map_err(|e| conversion_error(column, e.to_string()))
    }
}

//! Per-tenant cache of generated reports.
//!
//! Entries are keyed by a digest of the report parameters and expire after
//! the configured TTL. Expired rows are ignored on read and overwritten on
//! the next put.

use chrono::{DateTime, Duration, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::domain::TenantId;
use crate::error::{JobBuildaError, Result};

/// A cached report payload.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedReport {
    pub payload: Value,
    pub generated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Stable key for one set of report parameters.
pub fn cache_key(report_type: &str, params: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(report_type.as_bytes());
    hasher.update(b"\0");
    hasher.update(params.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// Fetch a live entry; expired entries read as missing.
pub fn get(conn: &Connection, tenant: &TenantId, key: &str, at: DateTime<Utc>) -> Result<Option<CachedReport>> {
    let row = conn
        .query_row(
            "SELECT payload, generated_at, expires_at FROM report_cache WHERE tenant_id = ?1 AND cache_key = ?2",
            params![tenant.as_str(), key],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, DateTime<Utc>>(1)?,
                    row.get::<_, DateTime<Utc>>(2)?,
                ))
            },
        )
        .optional()?;

    match row {
        Some((payload, generated_at, expires_at)) if expires_at > at => Ok(Some(CachedReport {
            payload: serde_json::from_str(&payload)?,
            generated_at,
            expires_at,
        })),
        Some(_) => {
            log::debug!("report cache entry {} for {} expired", key, tenant);
            Ok(None)
        }
        None => Ok(None),
    }
}

/// Insert or replace an entry.
pub fn put(
    conn: &Connection,
    tenant: &TenantId,
    key: &str,
    report_type: &str,
    payload: &Value,
    generated_at: DateTime<Utc>,
    ttl_secs: i64,
) -> Result<CachedReport> {
    let expires_at = Duration::try_seconds(ttl_secs)
        .and_then(|ttl| generated_at.checked_add_signed(ttl))
        .ok_or_else(|| JobBuildaError::validation(format!("report cache ttl out of range: {}s", ttl_secs)))?;
    conn.execute(
        r#"
        INSERT INTO report_cache (tenant_id, cache_key, report_type, payload, generated_at, expires_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        ON CONFLICT (tenant_id, cache_key) DO UPDATE SET
            report_type = excluded.report_type,
            payload = excluded.payload,
            generated_at = excluded.generated_at,
            expires_at = excluded.expires_at
        "#,
        params![
            tenant.as_str(),
            key,
            report_type,
            payload.to_string(),
            generated_at,
            expires_at,
        ],
    )?;
    Ok(CachedReport {
        payload: payload.clone(),
        generated_at,
        expires_at,
    })
}

/// Drop every cached report for a tenant, e.g. after new financial data lands.
pub fn invalidate(conn: &Connection, tenant: &TenantId) -> Result<usize> {
    Ok(conn.execute("DELETE FROM report_cache WHERE tenant_id = ?1", params![tenant.as_str()])?)
}

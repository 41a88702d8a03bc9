use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::domain::{
    CertificateType, CircuitReadings, CircuitResult, ComplianceTest, Status, TenantId, TestOutcome, TestStatus,
};
use crate::error::{JobBuildaError, Result};
use crate::store::col;

pub const TABLE: &str = "compliance_tests";

fn from_row(row: &Row<'_>) -> rusqlite::Result<ComplianceTest> {
    Ok(ComplianceTest {
        id: row.get("id")?,
        tenant_id: col::tenant(row, "tenant_id")?,
        job_id: row.get("job_id")?,
        certificate_type: col::parsed(row, "certificate_type", CertificateType::parse)?,
        inspector: row.get("inspector")?,
        scheduled_for: row.get("scheduled_for")?,
        status: col::status(row, "status")?,
        outcome: col::parsed_opt(row, "outcome", TestOutcome::parse)?,
        certificate_number: row.get("certificate_number")?,
        started_at: row.get("started_at")?,
        completed_at: row.get("completed_at")?,
        created_by: row.get("created_by")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn result_from_row(row: &Row<'_>) -> rusqlite::Result<CircuitResult> {
    Ok(CircuitResult {
        id: row.get("id")?,
        tenant_id: col::tenant(row, "tenant_id")?,
        test_id: row.get("test_id")?,
        readings: CircuitReadings {
            circuit_ref: row.get("circuit_ref")?,
            description: row.get("description")?,
            insulation_resistance_mohm: row.get("insulation_resistance_mohm")?,
            zs_ohm: row.get("zs_ohm")?,
            max_zs_ohm: row.get("max_zs_ohm")?,
            rcd_trip_ms: row.get("rcd_trip_ms")?,
        },
        passed: row.get("passed")?,
        recorded_at: row.get("recorded_at")?,
    })
}

pub fn insert(conn: &Connection, test: &ComplianceTest) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO compliance_tests
        (id, tenant_id, job_id, certificate_type, inspector, scheduled_for, status,
         created_by, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        "#,
        params![
            test.id,
            test.tenant_id.as_str(),
            test.job_id,
            test.certificate_type.as_str(),
            test.inspector,
            test.scheduled_for,
            test.status.as_str(),
            test.created_by,
            test.created_at,
            test.updated_at,
        ],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, tenant: &TenantId, id: &str) -> Result<Option<ComplianceTest>> {
    Ok(conn
        .query_row(
            "SELECT * FROM compliance_tests WHERE id = ?1 AND tenant_id = ?2",
            params![id, tenant.as_str()],
            from_row,
        )
        .optional()?)
}

pub fn require(conn: &Connection, tenant: &TenantId, id: &str) -> Result<ComplianceTest> {
    get(conn, tenant, id)?.ok_or_else(|| JobBuildaError::not_found(TestStatus::ENTITY, id))
}

pub fn list(conn: &Connection, tenant: &TenantId, status: Option<TestStatus>) -> Result<Vec<ComplianceTest>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT * FROM compliance_tests
        WHERE tenant_id = ?1 AND (?2 IS NULL OR status = ?2)
        ORDER BY created_at
        "#,
    )?;
    let rows = stmt.query_map(params![tenant.as_str(), status.map(|s| s.as_str())], from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn insert_result(conn: &Connection, result: &CircuitResult) -> Result<()> {
    let r = &result.readings;
    conn.execute(
        r#"
        INSERT INTO circuit_results
        (id, tenant_id, test_id, circuit_ref, description, insulation_resistance_mohm,
         zs_ohm, max_zs_ohm, rcd_trip_ms, passed, recorded_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        "#,
        params![
            result.id,
            result.tenant_id.as_str(),
            result.test_id,
            r.circuit_ref,
            r.description,
            r.insulation_resistance_mohm,
            r.zs_ohm,
            r.max_zs_ohm,
            r.rcd_trip_ms,
            result.passed,
            result.recorded_at,
        ],
    )?;
    Ok(())
}

pub fn list_results(conn: &Connection, tenant: &TenantId, test_id: &str) -> Result<Vec<CircuitResult>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM circuit_results WHERE tenant_id = ?1 AND test_id = ?2 ORDER BY recorded_at, circuit_ref",
    )?;
    let rows = stmt.query_map(params![tenant.as_str(), test_id], result_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

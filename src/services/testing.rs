//! Testing service: BS 7671 inspection and test certificates.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::domain::compliance::transitions;
use crate::domain::{
    CertificateType, CircuitReadings, CircuitResult, ComplianceTest, RequestContext, TestOutcome, TestStatus,
    event_types,
};
use crate::error::{JobBuildaError, Result};
use crate::id::{new_id, now, parse_date};
use crate::services::{
    Change, ResourceMatch, ResourceTemplate, Service, ServiceDeps, Tool, parse_args, require_text, status_filter,
    to_json,
};
use crate::store::{self, compliance, jobs, transition};

const TESTS: &str = "jobbuilda://tests";
const TEST: &str = "jobbuilda://tests/{id}";

#[derive(Debug, Deserialize)]
struct CreateTestArgs {
    certificate_type: CertificateType,
    #[serde(default)]
    job_id: Option<String>,
    inspector: String,
    #[serde(default)]
    scheduled_for: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TestIdArgs {
    test_id: String,
}

#[derive(Debug, Deserialize)]
struct RecordResultArgs {
    test_id: String,
    #[serde(flatten)]
    readings: CircuitReadings,
}

pub struct TestingService {
    deps: ServiceDeps,
}

impl TestingService {
    pub fn new(deps: ServiceDeps) -> Self {
        Self { deps }
    }

    async fn create(&self, ctx: &RequestContext, args: CreateTestArgs) -> Result<ComplianceTest> {
        require_text("inspector", &args.inspector)?;
        let scheduled_for = args
            .scheduled_for
            .as_deref()
            .map(|raw| parse_date("scheduled_for", raw))
            .transpose()?;

        self.deps
            .commit(ctx, |tx| {
                if let Some(job_id) = &args.job_id {
                    jobs::require(tx, &ctx.tenant_id, job_id)?;
                }
                let ts = now();
                let test = ComplianceTest {
                    id: new_id(),
                    tenant_id: ctx.tenant_id.clone(),
                    job_id: args.job_id,
                    certificate_type: args.certificate_type,
                    inspector: args.inspector.trim().to_string(),
                    scheduled_for,
                    status: TestStatus::Scheduled,
                    outcome: None,
                    certificate_number: None,
                    started_at: None,
                    completed_at: None,
                    created_by: ctx.actor.clone(),
                    created_at: ts,
                    updated_at: ts,
                };
                compliance::insert(tx, &test)?;
                Change::of(event_types::TEST_CREATED, test)
            })
            .await
    }

    async fn start(&self, ctx: &RequestContext, args: TestIdArgs) -> Result<ComplianceTest> {
        self.deps
            .commit(ctx, |tx| {
                let started_at = now();
                transition::apply(
                    tx,
                    compliance::TABLE,
                    &args.test_id,
                    &ctx.tenant_id,
                    &transitions::START,
                    &[("started_at", &started_at)],
                )?;
                Change::of(transitions::START.event_type, compliance::require(tx, &ctx.tenant_id, &args.test_id)?)
            })
            .await
    }

    async fn record_result(&self, ctx: &RequestContext, args: RecordResultArgs) -> Result<CircuitResult> {
        args.readings.validate()?;

        self.deps
            .commit(ctx, |tx| {
                store::require_status(
                    tx,
                    compliance::TABLE,
                    &args.test_id,
                    &ctx.tenant_id,
                    &[TestStatus::InProgress],
                    "record a result on",
                )?;
                let passed = args.readings.passes();
                let result = CircuitResult {
                    id: new_id(),
                    tenant_id: ctx.tenant_id.clone(),
                    test_id: args.test_id.clone(),
                    readings: args.readings,
                    passed,
                    recorded_at: now(),
                };
                compliance::insert_result(tx, &result)?;
                if !passed {
                    log::info!("Circuit {} failed on test {}", result.readings.circuit_ref, result.test_id);
                }
                Change::of(event_types::TEST_RESULT_RECORDED, result)
            })
            .await
    }

    /// Complete a test: derive the outcome and issue the certificate number.
    async fn complete(&self, ctx: &RequestContext, args: TestIdArgs) -> Result<ComplianceTest> {
        self.deps
            .commit(ctx, |tx| {
                store::require_status(
                    tx,
                    compliance::TABLE,
                    &args.test_id,
                    &ctx.tenant_id,
                    transitions::COMPLETE.from,
                    transitions::COMPLETE.action,
                )?;
                let test = compliance::require(tx, &ctx.tenant_id, &args.test_id)?;
                let results = compliance::list_results(tx, &ctx.tenant_id, &test.id)?;
                if results.is_empty() {
                    return Err(JobBuildaError::validation(format!(
                        "test {} has no circuit results recorded",
                        test.id
                    )));
                }

                let outcome = TestOutcome::from_results(&results).as_str();
                let certificate_number = store::next_number(tx, &ctx.tenant_id, test.certificate_type.prefix())?;
                let completed_at = now();
                transition::apply(
                    tx,
                    compliance::TABLE,
                    &test.id,
                    &ctx.tenant_id,
                    &transitions::COMPLETE,
                    &[
                        ("outcome", &outcome),
                        ("certificate_number", &certificate_number),
                        ("completed_at", &completed_at),
                    ],
                )?;
                log::info!("Issued {} ({}) for test {}", certificate_number, outcome, test.id);
                Change::of(transitions::COMPLETE.event_type, compliance::require(tx, &ctx.tenant_id, &test.id)?)
            })
            .await
    }
}

#[async_trait]
impl Service for TestingService {
    fn name(&self) -> &'static str {
        "testing"
    }

    fn tools(&self) -> Vec<Tool> {
        vec![
            Tool::new("create_test", "Schedule an inspection and test").with_schema(json!({
                "type": "object",
                "properties": {
                    "certificate_type": { "type": "string", "enum": ["eic", "eicr", "mwc"] },
                    "job_id": { "type": "string" },
                    "inspector": { "type": "string" },
                    "scheduled_for": { "type": "string", "format": "date" }
                },
                "required": ["certificate_type", "inspector"]
            })),
            Tool::new("start_test", "Begin testing on site").with_id_arg("test_id"),
            Tool::new("record_circuit_result", "Record readings for one circuit").with_schema(json!({
                "type": "object",
                "properties": {
                    "test_id": { "type": "string" },
                    "circuit_ref": { "type": "string" },
                    "description": { "type": "string" },
                    "insulation_resistance_mohm": { "type": "number" },
                    "zs_ohm": { "type": "number" },
                    "max_zs_ohm": { "type": "number" },
                    "rcd_trip_ms": { "type": "number" }
                },
                "required": ["test_id", "circuit_ref", "insulation_resistance_mohm"]
            })),
            Tool::new("complete_test", "Complete a test and issue its certificate").with_id_arg("test_id"),
        ]
    }

    fn resources(&self) -> Vec<ResourceTemplate> {
        vec![
            ResourceTemplate::new(TESTS, "tests", "Compliance tests, optionally filtered by ?status="),
            ResourceTemplate::new(TEST, "test", "One test with its circuit results"),
        ]
    }

    async fn read_resource(&self, ctx: &RequestContext, resource: &ResourceMatch) -> Result<Value> {
        let tenant = &ctx.tenant_id;
        match resource.template.as_str() {
            TESTS => {
                let status = status_filter::<TestStatus>(resource)?;
                to_json(&self.deps.db.read(|conn| compliance::list(conn, tenant, status))?)
            }
            TEST => {
                let id = resource.param("id")?;
                let (test, results) = self.deps.db.read(|conn| {
                    let test = compliance::require(conn, tenant, id)?;
                    let results = compliance::list_results(conn, tenant, id)?;
                    Ok((test, results))
                })?;
                let mut value = to_json(&test)?;
                value["results"] = to_json(&results)?;
                Ok(value)
            }
            _ => Err(JobBuildaError::UnknownResource(resource.uri.raw.clone())),
        }
    }

    async fn call_tool(&self, ctx: &RequestContext, name: &str, arguments: Value) -> Result<Value> {
        match name {
            "create_test" => to_json(&self.create(ctx, parse_args(name, arguments)?).await?),
            "start_test" => to_json(&self.start(ctx, parse_args(name, arguments)?).await?),
            "record_circuit_result" => to_json(&self.record_result(ctx, parse_args(name, arguments)?).await?),
            "complete_test" => to_json(&self.complete(ctx, parse_args(name, arguments)?).await?),
            _ => Err(JobBuildaError::UnknownTool(name.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::{ctx, deps, event_types as emitted, resource};

    async fn started_test(service: &TestingService, certificate_type: &str) -> String {
        let test = service
            .call_tool(
                &ctx("a"),
                "create_test",
                json!({"certificate_type": certificate_type, "inspector": "J. Watt"}),
            )
            .await
            .unwrap();
        let id = test["id"].as_str().unwrap().to_string();
        service.call_tool(&ctx("a"), "start_test", json!({"test_id": id})).await.unwrap();
        id
    }

    async fn record(service: &TestingService, id: &str, circuit: &str, ir: f64) -> Value {
        service
            .call_tool(
                &ctx("a"),
                "record_circuit_result",
                json!({
                    "test_id": id,
                    "circuit_ref": circuit,
                    "insulation_resistance_mohm": ir,
                    "zs_ohm": 0.8,
                    "max_zs_ohm": 1.37,
                    "rcd_trip_ms": 24.0
                }),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_results_only_while_in_progress() {
        let service = TestingService::new(deps());
        let test = service
            .call_tool(&ctx("a"), "create_test", json!({"certificate_type": "eicr", "inspector": "J. Watt"}))
            .await
            .unwrap();

        let err = service
            .call_tool(
                &ctx("a"),
                "record_circuit_result",
                json!({"test_id": test["id"], "circuit_ref": "1", "insulation_resistance_mohm": 200.0}),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, JobBuildaError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_complete_requires_results() {
        let service = TestingService::new(deps());
        let id = started_test(&service, "eic").await;

        let err = service.call_tool(&ctx("a"), "complete_test", json!({"test_id": id})).await.unwrap_err();
        assert!(matches!(err, JobBuildaError::Validation(_)));
    }

    #[tokio::test]
    async fn test_all_passing_circuits_are_satisfactory() {
        let service = TestingService::new(deps());
        let id = started_test(&service, "eicr").await;
        let result = record(&service, &id, "1", 299.0).await;
        assert_eq!(result["passed"], true);
        record(&service, &id, "2", 150.0).await;

        let done = service.call_tool(&ctx("a"), "complete_test", json!({"test_id": id})).await.unwrap();
        assert_eq!(done["status"], "completed");
        assert_eq!(done["outcome"], "satisfactory");
        assert_eq!(done["certificate_number"], "EICR-00001");

        let detail = service
            .read_resource(&ctx("a"), &resource(TEST, &format!("jobbuilda://tests/{}", id)))
            .await
            .unwrap();
        assert_eq!(detail["results"].as_array().unwrap().len(), 2);
        assert_eq!(
            emitted(&service.deps, "a"),
            vec![
                "test.created",
                "test.started",
                "test.result_recorded",
                "test.result_recorded",
                "test.completed"
            ]
        );
    }

    #[tokio::test]
    async fn test_one_failing_circuit_is_unsatisfactory() {
        let service = TestingService::new(deps());
        let id = started_test(&service, "mwc").await;
        record(&service, &id, "1", 200.0).await;
        let failed = record(&service, &id, "2", 0.5).await;
        assert_eq!(failed["passed"], false);

        let done = service.call_tool(&ctx("a"), "complete_test", json!({"test_id": id})).await.unwrap();
        assert_eq!(done["outcome"], "unsatisfactory");
        assert_eq!(done["certificate_number"], "MWC-00001");

        let err = service.call_tool(&ctx("a"), "complete_test", json!({"test_id": id})).await.unwrap_err();
        assert!(matches!(err, JobBuildaError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_invalid_readings_rejected() {
        let service = TestingService::new(deps());
        let id = started_test(&service, "eic").await;
        let err = service
            .call_tool(
                &ctx("a"),
                "record_circuit_result",
                json!({"test_id": id, "circuit_ref": "1", "insulation_resistance_mohm": -3.0}),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, JobBuildaError::Validation(_)));
    }

    #[tokio::test]
    async fn test_unknown_certificate_type_rejected() {
        let service = TestingService::new(deps());
        let err = service
            .call_tool(&ctx("a"), "create_test", json!({"certificate_type": "pat", "inspector": "J. Watt"}))
            .await
            .unwrap_err();
        assert!(matches!(err, JobBuildaError::Validation(_)));
    }
}

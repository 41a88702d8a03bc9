//! Variations service: priced changes to the scope of an open job.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::domain::money::{check_amount, check_vat_rate};
use crate::domain::variation::transitions;
use crate::domain::{JobStatus, RequestContext, Totals, Variation, VariationStatus, event_types};
use crate::error::{JobBuildaError, Result};
use crate::id::{new_id, now};
use crate::services::{
    Change, ResourceMatch, ResourceTemplate, Service, ServiceDeps, Tool, parse_args, require_text, to_json,
};
use crate::store::{self, jobs, transition, variations};

const VARIATIONS: &str = "jobbuilda://variations";
const VARIATION: &str = "jobbuilda://variations/{id}";

#[derive(Debug, Deserialize)]
struct CreateVariationArgs {
    job_id: String,
    description: String,
    amount_pence: i64,
    #[serde(default)]
    vat_rate_bp: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct VariationIdArgs {
    variation_id: String,
}

#[derive(Debug, Deserialize)]
struct RejectVariationArgs {
    variation_id: String,
    #[serde(default)]
    reason: Option<String>,
}

pub struct VariationsService {
    deps: ServiceDeps,
}

impl VariationsService {
    pub fn new(deps: ServiceDeps) -> Self {
        Self { deps }
    }

    async fn create(&self, ctx: &RequestContext, args: CreateVariationArgs) -> Result<Variation> {
        require_text("description", &args.description)?;
        check_amount("amount_pence", args.amount_pence)?;
        let vat_rate_bp = check_vat_rate(args.vat_rate_bp.unwrap_or(self.deps.finance.default_vat_rate_bp))?;
        let totals = Totals::from_net(args.amount_pence, vat_rate_bp)?;

        self.deps
            .commit(ctx, |tx| {
                store::require_status(
                    tx,
                    jobs::TABLE,
                    &args.job_id,
                    &ctx.tenant_id,
                    &[JobStatus::Scheduled, JobStatus::InProgress],
                    "add a variation to",
                )?;
                let ts = now();
                let variation = Variation {
                    id: new_id(),
                    tenant_id: ctx.tenant_id.clone(),
                    job_id: args.job_id.clone(),
                    description: args.description.trim().to_string(),
                    net_pence: totals.net_pence,
                    vat_rate_bp,
                    vat_pence: totals.vat_pence,
                    gross_pence: totals.gross_pence,
                    status: VariationStatus::Pending,
                    rejection_reason: None,
                    decided_at: None,
                    completed_at: None,
                    created_by: ctx.actor.clone(),
                    created_at: ts,
                    updated_at: ts,
                };
                variations::insert(tx, &variation)?;
                Change::of(event_types::VARIATION_CREATED, variation)
            })
            .await
    }

    async fn approve(&self, ctx: &RequestContext, args: VariationIdArgs) -> Result<Variation> {
        self.deps
            .commit(ctx, |tx| {
                let decided_at = now();
                transition::apply(
                    tx,
                    variations::TABLE,
                    &args.variation_id,
                    &ctx.tenant_id,
                    &transitions::APPROVE,
                    &[("decided_at", &decided_at)],
                )?;
                Change::of(
                    transitions::APPROVE.event_type,
                    variations::require(tx, &ctx.tenant_id, &args.variation_id)?,
                )
            })
            .await
    }

    async fn reject(&self, ctx: &RequestContext, args: RejectVariationArgs) -> Result<Variation> {
        self.deps
            .commit(ctx, |tx| {
                let decided_at = now();
                transition::apply(
                    tx,
                    variations::TABLE,
                    &args.variation_id,
                    &ctx.tenant_id,
                    &transitions::REJECT,
                    &[("decided_at", &decided_at), ("rejection_reason", &args.reason)],
                )?;
                Change::of(
                    transitions::REJECT.event_type,
                    variations::require(tx, &ctx.tenant_id, &args.variation_id)?,
                )
            })
            .await
    }

    async fn complete(&self, ctx: &RequestContext, args: VariationIdArgs) -> Result<Variation> {
        self.deps
            .commit(ctx, |tx| {
                let completed_at = now();
                transition::apply(
                    tx,
                    variations::TABLE,
                    &args.variation_id,
                    &ctx.tenant_id,
                    &transitions::COMPLETE,
                    &[("completed_at", &completed_at)],
                )?;
                Change::of(
                    transitions::COMPLETE.event_type,
                    variations::require(tx, &ctx.tenant_id, &args.variation_id)?,
                )
            })
            .await
    }
}

#[async_trait]
impl Service for VariationsService {
    fn name(&self) -> &'static str {
        "variations"
    }

    fn tools(&self) -> Vec<Tool> {
        vec![
            Tool::new("create_variation", "Propose a priced change to an open job").with_schema(json!({
                "type": "object",
                "properties": {
                    "job_id": { "type": "string" },
                    "description": { "type": "string" },
                    "amount_pence": { "type": "integer" },
                    "vat_rate_bp": { "type": "integer" }
                },
                "required": ["job_id", "description", "amount_pence"]
            })),
            Tool::new("approve_variation", "Approve a pending variation").with_id_arg("variation_id"),
            Tool::new("reject_variation", "Reject a pending variation").with_schema(json!({
                "type": "object",
                "properties": {
                    "variation_id": { "type": "string" },
                    "reason": { "type": "string" }
                },
                "required": ["variation_id"]
            })),
            Tool::new("complete_variation", "Mark an approved variation as done").with_id_arg("variation_id"),
        ]
    }

    fn resources(&self) -> Vec<ResourceTemplate> {
        vec![
            ResourceTemplate::new(VARIATIONS, "variations", "Variations, optionally filtered by ?job_id="),
            ResourceTemplate::new(VARIATION, "variation", "One variation"),
        ]
    }

    async fn read_resource(&self, ctx: &RequestContext, resource: &ResourceMatch) -> Result<Value> {
        let tenant = &ctx.tenant_id;
        match resource.template.as_str() {
            VARIATIONS => {
                let job_id = resource.query("job_id");
                to_json(&self.deps.db.read(|conn| variations::list(conn, tenant, job_id))?)
            }
            VARIATION => {
                let id = resource.param("id")?;
                to_json(&self.deps.db.read(|conn| variations::require(conn, tenant, id))?)
            }
            _ => Err(JobBuildaError::UnknownResource(resource.uri.raw.clone())),
        }
    }

    async fn call_tool(&self, ctx: &RequestContext, name: &str, arguments: Value) -> Result<Value> {
        let variation = match name {
            "create_variation" => self.create(ctx, parse_args(name, arguments)?).await?,
            "approve_variation" => self.approve(ctx, parse_args(name, arguments)?).await?,
            "reject_variation" => self.reject(ctx, parse_args(name, arguments)?).await?,
            "complete_variation" => self.complete(ctx, parse_args(name, arguments)?).await?,
            _ => return Err(JobBuildaError::UnknownTool(name.to_string())),
        };
        to_json(&variation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::JobsService;
    use crate::services::test_support::{ctx, deps, event_types as emitted, resource};

    struct Fixture {
        jobs: JobsService,
        variations: VariationsService,
    }

    fn fixture() -> Fixture {
        let deps = deps();
        Fixture {
            jobs: JobsService::new(deps.clone()),
            variations: VariationsService::new(deps),
        }
    }

    async fn job(f: &Fixture) -> String {
        let job = f
            .jobs
            .call_tool(&ctx("a"), "create_job", json!({"client_id": "c1", "title": "Loft conversion"}))
            .await
            .unwrap();
        job["id"].as_str().unwrap().to_string()
    }

    async fn variation(f: &Fixture, job_id: &str) -> String {
        let v = f
            .variations
            .call_tool(
                &ctx("a"),
                "create_variation",
                json!({"job_id": job_id, "description": "Extra sockets", "amount_pence": 15000}),
            )
            .await
            .unwrap();
        v["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_create_variation_prices_vat() {
        let f = fixture();
        let job_id = job(&f).await;
        let v = f
            .variations
            .call_tool(
                &ctx("a"),
                "create_variation",
                json!({"job_id": job_id, "description": "Outdoor socket", "amount_pence": 9999, "vat_rate_bp": 500}),
            )
            .await
            .unwrap();
        assert_eq!(v["status"], "pending");
        assert_eq!(v["vat_pence"], 500);
        assert_eq!(v["gross_pence"], 10499);
    }

    #[tokio::test]
    async fn test_variation_needs_open_job() {
        let f = fixture();
        let job_id = job(&f).await;
        f.jobs.call_tool(&ctx("a"), "cancel_job", json!({"job_id": job_id})).await.unwrap();

        let err = f
            .variations
            .call_tool(
                &ctx("a"),
                "create_variation",
                json!({"job_id": job_id, "description": "Extra", "amount_pence": 100}),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, JobBuildaError::Conflict { entity: "job", .. }));

        let err = f
            .variations
            .call_tool(
                &ctx("a"),
                "create_variation",
                json!({"job_id": "missing", "description": "Extra", "amount_pence": 100}),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, JobBuildaError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_approve_then_complete() {
        let f = fixture();
        let job_id = job(&f).await;
        let id = variation(&f, &job_id).await;

        let err = f
            .variations
            .call_tool(&ctx("a"), "complete_variation", json!({"variation_id": id}))
            .await
            .unwrap_err();
        assert!(matches!(err, JobBuildaError::Conflict { .. }));

        f.variations
            .call_tool(&ctx("a"), "approve_variation", json!({"variation_id": id}))
            .await
            .unwrap();
        let done = f
            .variations
            .call_tool(&ctx("a"), "complete_variation", json!({"variation_id": id}))
            .await
            .unwrap();
        assert_eq!(done["status"], "completed");

        let types = emitted(&f.variations.deps, "a");
        assert_eq!(
            types,
            vec!["job.created", "variation.created", "variation.approved", "variation.completed"]
        );
    }

    #[tokio::test]
    async fn test_rejected_variation_is_terminal() {
        let f = fixture();
        let job_id = job(&f).await;
        let id = variation(&f, &job_id).await;

        let rejected = f
            .variations
            .call_tool(&ctx("a"), "reject_variation", json!({"variation_id": id, "reason": "client declined"}))
            .await
            .unwrap();
        assert_eq!(rejected["rejection_reason"], "client declined");

        let err = f
            .variations
            .call_tool(&ctx("a"), "approve_variation", json!({"variation_id": id}))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), format!("Cannot approve variation {}: status is rejected", id));
    }

    #[tokio::test]
    async fn test_list_filters_by_job() {
        let f = fixture();
        let first = job(&f).await;
        let second = job(&f).await;
        variation(&f, &first).await;
        variation(&f, &second).await;

        let all = f
            .variations
            .read_resource(&ctx("a"), &resource(VARIATIONS, "jobbuilda://variations"))
            .await
            .unwrap();
        assert_eq!(all.as_array().unwrap().len(), 2);

        let uri = format!("jobbuilda://variations?job_id={}", first);
        let filtered = f.variations.read_resource(&ctx("a"), &resource(VARIATIONS, &uri)).await.unwrap();
        assert_eq!(filtered.as_array().unwrap().len(), 1);
        assert_eq!(filtered[0]["job_id"], first.as_str());
    }
}

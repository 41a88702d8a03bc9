//! Jobs service: scheduling, progress and time logging.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::domain::job::{labour_cost, transitions};
use crate::domain::money::sum_pence;
use crate::domain::{Job, JobStatus, QuoteStatus, RequestContext, Status, TimeEntry, event_types};
use crate::error::{JobBuildaError, Result};
use crate::id::{new_id, now, parse_date, today};
use crate::services::{
    Change, ResourceMatch, ResourceTemplate, Service, ServiceDeps, Tool, parse_args, require_text, status_filter,
    to_json,
};
use crate::store::{self, jobs, quotes, transition};

const JOBS: &str = "jobbuilda://jobs";
const JOB: &str = "jobbuilda://jobs/{id}";
const TIME: &str = "jobbuilda://jobs/{id}/time";

#[derive(Debug, Deserialize)]
struct CreateJobArgs {
    client_id: String,
    title: String,
    #[serde(default)]
    quote_id: Option<String>,
    #[serde(default)]
    site_address: Option<String>,
    #[serde(default)]
    scheduled_for: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JobIdArgs {
    job_id: String,
}

#[derive(Debug, Deserialize)]
struct CancelJobArgs {
    job_id: String,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LogTimeArgs {
    job_id: String,
    worker: String,
    hours: f64,
    rate_pence: i64,
    #[serde(default)]
    worked_on: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

pub struct JobsService {
    deps: ServiceDeps,
}

impl JobsService {
    pub fn new(deps: ServiceDeps) -> Self {
        Self { deps }
    }

    async fn create(&self, ctx: &RequestContext, args: CreateJobArgs) -> Result<Job> {
        require_text("client_id", &args.client_id)?;
        require_text("title", &args.title)?;
        let scheduled_for = args
            .scheduled_for
            .as_deref()
            .map(|raw| parse_date("scheduled_for", raw))
            .transpose()?;

        self.deps
            .commit(ctx, |tx| {
                if let Some(quote_id) = &args.quote_id {
                    let quote = quotes::require(tx, &ctx.tenant_id, quote_id)?;
                    if quote.status != QuoteStatus::Approved {
                        return Err(JobBuildaError::Conflict {
                            entity: QuoteStatus::ENTITY,
                            id: quote.id,
                            action: "schedule".to_string(),
                            status: quote.status.as_str().to_string(),
                        });
                    }
                    if quote.client_id != args.client_id.trim() {
                        return Err(JobBuildaError::validation(format!(
                            "client_id {} does not match quote client {}",
                            args.client_id.trim(),
                            quote.client_id
                        )));
                    }
                }
                let ts = now();
                let job = Job {
                    id: new_id(),
                    tenant_id: ctx.tenant_id.clone(),
                    job_number: store::next_number(tx, &ctx.tenant_id, "JOB")?,
                    client_id: args.client_id.trim().to_string(),
                    quote_id: args.quote_id,
                    title: args.title.trim().to_string(),
                    site_address: args.site_address,
                    scheduled_for,
                    status: JobStatus::Scheduled,
                    started_at: None,
                    completed_at: None,
                    cancellation_reason: None,
                    created_by: ctx.actor.clone(),
                    created_at: ts,
                    updated_at: ts,
                };
                jobs::insert(tx, &job)?;
                log::info!("Created job {} ({}) for {}", job.job_number, job.id, ctx.tenant_id);
                Change::of(event_types::JOB_CREATED, job)
            })
            .await
    }

    async fn start(&self, ctx: &RequestContext, args: JobIdArgs) -> Result<Job> {
        self.deps
            .commit(ctx, |tx| {
                let started_at = now();
                transition::apply(
                    tx,
                    jobs::TABLE,
                    &args.job_id,
                    &ctx.tenant_id,
                    &transitions::START,
                    &[("started_at", &started_at)],
                )?;
                Change::of(transitions::START.event_type, jobs::require(tx, &ctx.tenant_id, &args.job_id)?)
            })
            .await
    }

    async fn complete(&self, ctx: &RequestContext, args: JobIdArgs) -> Result<Job> {
        self.deps
            .commit(ctx, |tx| {
                let completed_at = now();
                transition::apply(
                    tx,
                    jobs::TABLE,
                    &args.job_id,
                    &ctx.tenant_id,
                    &transitions::COMPLETE,
                    &[("completed_at", &completed_at)],
                )?;
                Change::of(transitions::COMPLETE.event_type, jobs::require(tx, &ctx.tenant_id, &args.job_id)?)
            })
            .await
    }

    async fn cancel(&self, ctx: &RequestContext, args: CancelJobArgs) -> Result<Job> {
        self.deps
            .commit(ctx, |tx| {
                transition::apply(
                    tx,
                    jobs::TABLE,
                    &args.job_id,
                    &ctx.tenant_id,
                    &transitions::CANCEL,
                    &[("cancellation_reason", &args.reason)],
                )?;
                Change::of(transitions::CANCEL.event_type, jobs::require(tx, &ctx.tenant_id, &args.job_id)?)
            })
            .await
    }

    async fn log_time(&self, ctx: &RequestContext, args: LogTimeArgs) -> Result<TimeEntry> {
        require_text("worker", &args.worker)?;
        let cost_pence = labour_cost(args.hours, args.rate_pence)?;
        let worked_on = match &args.worked_on {
            Some(raw) => parse_date("worked_on", raw)?,
            None => today(),
        };

        self.deps
            .commit(ctx, |tx| {
                store::require_status(
                    tx,
                    jobs::TABLE,
                    &args.job_id,
                    &ctx.tenant_id,
                    &[JobStatus::InProgress],
                    "log time on",
                )?;
                let entry = TimeEntry {
                    id: new_id(),
                    tenant_id: ctx.tenant_id.clone(),
                    job_id: args.job_id.clone(),
                    worker: args.worker.trim().to_string(),
                    hours: args.hours,
                    rate_pence: args.rate_pence,
                    cost_pence,
                    worked_on,
                    description: args.description,
                    created_at: now(),
                };
                jobs::insert_time_entry(tx, &entry)?;
                Change::of(event_types::JOB_TIME_LOGGED, entry)
            })
            .await
    }
}

#[async_trait]
impl Service for JobsService {
    fn name(&self) -> &'static str {
        "jobs"
    }

    fn tools(&self) -> Vec<Tool> {
        vec![
            Tool::new("create_job", "Schedule a job, optionally from an approved quote").with_schema(json!({
                "type": "object",
                "properties": {
                    "client_id": { "type": "string" },
                    "title": { "type": "string" },
                    "quote_id": { "type": "string" },
                    "site_address": { "type": "string" },
                    "scheduled_for": { "type": "string", "format": "date" }
                },
                "required": ["client_id", "title"]
            })),
            Tool::new("start_job", "Start work on a scheduled job").with_id_arg("job_id"),
            Tool::new("complete_job", "Mark an in-progress job complete").with_id_arg("job_id"),
            Tool::new("cancel_job", "Cancel a scheduled or in-progress job").with_schema(json!({
                "type": "object",
                "properties": {
                    "job_id": { "type": "string" },
                    "reason": { "type": "string" }
                },
                "required": ["job_id"]
            })),
            Tool::new("log_time", "Log labour hours against an in-progress job").with_schema(json!({
                "type": "object",
                "properties": {
                    "job_id": { "type": "string" },
                    "worker": { "type": "string" },
                    "hours": { "type": "number" },
                    "rate_pence": { "type": "integer" },
                    "worked_on": { "type": "string", "format": "date" },
                    "description": { "type": "string" }
                },
                "required": ["job_id", "worker", "hours", "rate_pence"]
            })),
        ]
    }

    fn resources(&self) -> Vec<ResourceTemplate> {
        vec![
            ResourceTemplate::new(JOBS, "jobs", "Jobs, optionally filtered by ?status="),
            ResourceTemplate::new(JOB, "job", "One job"),
            ResourceTemplate::new(TIME, "job time", "Time entries logged against a job"),
        ]
    }

    async fn read_resource(&self, ctx: &RequestContext, resource: &ResourceMatch) -> Result<Value> {
        let tenant = &ctx.tenant_id;
        match resource.template.as_str() {
            JOBS => {
                let status = status_filter::<JobStatus>(resource)?;
                to_json(&self.deps.db.read(|conn| jobs::list(conn, tenant, status))?)
            }
            JOB => {
                let id = resource.param("id")?;
                to_json(&self.deps.db.read(|conn| jobs::require(conn, tenant, id))?)
            }
            TIME => {
                let id = resource.param("id")?;
                let entries = self.deps.db.read(|conn| {
                    jobs::require(conn, tenant, id)?;
                    jobs::list_time_entries(conn, tenant, id)
                })?;
                let total_hours: f64 = entries.iter().map(|e| e.hours).sum();
                let total_cost = sum_pence(entries.iter().map(|e| e.cost_pence))?;
                Ok(json!({
                    "job_id": id,
                    "entries": to_json(&entries)?,
                    "total_hours": total_hours,
                    "total_cost_pence": total_cost,
                }))
            }
            _ => Err(JobBuildaError::UnknownResource(resource.uri.raw.clone())),
        }
    }

    async fn call_tool(&self, ctx: &RequestContext, name: &str, arguments: Value) -> Result<Value> {
        match name {
            "create_job" => to_json(&self.create(ctx, parse_args(name, arguments)?).await?),
            "start_job" => to_json(&self.start(ctx, parse_args(name, arguments)?).await?),
            "complete_job" => to_json(&self.complete(ctx, parse_args(name, arguments)?).await?),
            "cancel_job" => to_json(&self.cancel(ctx, parse_args(name, arguments)?).await?),
            "log_time" => to_json(&self.log_time(ctx, parse_args(name, arguments)?).await?),
            _ => Err(JobBuildaError::UnknownTool(name.to_string())),
        }
    }
}

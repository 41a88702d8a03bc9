//! Reporting service: expenses, VAT returns and the financial summary.
//!
//! Reports are computed from invoices, payments and expenses, then cached
//! per tenant and parameter set for `reporting.cache_ttl_secs`. Any
//! financial mutation (invoice issued, payment, cancellation, expense)
//! drops the tenant's cached reports.

use async_trait::async_trait;
use chrono::NaiveDate;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::domain::expense::check_amounts;
use crate::domain::money::{add_pence, sum_pence};
use crate::domain::{Expense, RequestContext, TenantId, event_types};
use crate::error::{JobBuildaError, Result};
use crate::id::{new_id, now, parse_date, to_rfc3339};
use crate::services::{
    Change, ResourceMatch, ResourceTemplate, Service, ServiceDeps, Tool, parse_args, require_text, to_json,
};
use crate::store::{expenses, invoices, outbox, report_cache};

const EXPENSES: &str = "jobbuilda://expenses";
const EVENTS: &str = "jobbuilda://events";

const EVENTS_LIMIT: usize = 500;

fn query_number<T: std::str::FromStr>(resource: &ResourceMatch, key: &str) -> Result<Option<T>> {
    resource
        .query(key)
        .map(|raw| {
            raw.parse()
                .map_err(|_| JobBuildaError::validation(format!("query parameter {} is not a number: {}", key, raw)))
        })
        .transpose()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportType {
    Vat100,
    Summary,
}

impl ReportType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportType::Vat100 => "vat100",
            ReportType::Summary => "summary",
        }
    }
}

#[derive(Debug, Deserialize)]
struct RecordExpenseArgs {
    supplier: String,
    description: String,
    net_pence: i64,
    vat_pence: i64,
    incurred_on: String,
}

#[derive(Debug, Deserialize)]
struct GenerateReportArgs {
    report_type: ReportType,
    from: String,
    to: String,
    #[serde(default)]
    refresh: bool,
}

/// UK VAT return, accrual basis. Boxes 1-5 in pence, 6-9 in whole pounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Vat100 {
    pub box1_vat_due_sales: i64,
    pub box2_vat_due_acquisitions: i64,
    pub box3_total_vat_due: i64,
    pub box4_vat_reclaimed: i64,
    pub box5_net_vat_due: i64,
    pub box6_total_sales_ex_vat: i64,
    pub box7_total_purchases_ex_vat: i64,
    pub box8_goods_supplied_ex_vat: i64,
    pub box9_acquisitions_ex_vat: i64,
    pub invoice_count: usize,
    pub expense_count: usize,
}

impl Vat100 {
    pub fn compute(conn: &Connection, tenant: &TenantId, from: NaiveDate, to: NaiveDate) -> Result<Self> {
        let sales = invoices::list_issued_between(conn, tenant, from, to)?;
        let purchases = expenses::list_between(conn, tenant, from, to)?;

        let box1 = sum_pence(sales.iter().map(|i| i.vat_pence))?;
        let box2 = 0;
        let box3 = add_pence(box1, box2)?;
        let box4 = sum_pence(purchases.iter().map(|e| e.vat_pence))?;
        let box5 = add_pence(box3, -box4)?.abs();
        let net_sales = sum_pence(sales.iter().map(|i| i.net_pence))?;
        let net_purchases = sum_pence(purchases.iter().map(|e| e.net_pence))?;

        Ok(Self {
            box1_vat_due_sales: box1,
            box2_vat_due_acquisitions: box2,
            box3_total_vat_due: box3,
            box4_vat_reclaimed: box4,
            box5_net_vat_due: box5,
            box6_total_sales_ex_vat: net_sales / 100,
            box7_total_purchases_ex_vat: net_purchases / 100,
            box8_goods_supplied_ex_vat: 0,
            box9_acquisitions_ex_vat: 0,
            invoice_count: sales.len(),
            expense_count: purchases.len(),
        })
    }
}

/// Cash position over a period, in pence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FinancialSummary {
    pub invoiced_gross_pence: i64,
    pub received_pence: i64,
    pub outstanding_pence: i64,
    pub expenses_gross_pence: i64,
    pub net_profit_pence: i64,
}

impl FinancialSummary {
    pub fn compute(conn: &Connection, tenant: &TenantId, from: NaiveDate, to: NaiveDate) -> Result<Self> {
        let invoiced_gross_pence =
            sum_pence(invoices::list_issued_between(conn, tenant, from, to)?.iter().map(|i| i.gross_pence))?;
        let received_pence = invoices::payments_received_between(conn, tenant, from, to)?;
        let outstanding_pence = invoices::outstanding_balance(conn, tenant)?;
        let expenses_gross_pence =
            sum_pence(expenses::list_between(conn, tenant, from, to)?.iter().map(|e| e.gross_pence))?;

        Ok(Self {
            invoiced_gross_pence,
            received_pence,
            outstanding_pence,
            expenses_gross_pence,
            net_profit_pence: add_pence(received_pence, -expenses_gross_pence)?,
        })
    }
}

pub struct ReportingService {
    deps: ServiceDeps,
}

impl ReportingService {
    pub fn new(deps: ServiceDeps) -> Self {
        Self { deps }
    }

    async fn record_expense(&self, ctx: &RequestContext, args: RecordExpenseArgs) -> Result<Expense> {
        require_text("supplier", &args.supplier)?;
        require_text("description", &args.description)?;
        let gross_pence = check_amounts(args.net_pence, args.vat_pence)?;
        let incurred_on = parse_date("incurred_on", &args.incurred_on)?;

        self.deps
            .commit(ctx, |tx| {
                let expense = Expense {
                    id: new_id(),
                    tenant_id: ctx.tenant_id.clone(),
                    supplier: args.supplier.trim().to_string(),
                    description: args.description.trim().to_string(),
                    net_pence: args.net_pence,
                    vat_pence: args.vat_pence,
                    gross_pence,
                    incurred_on,
                    recorded_by: ctx.actor.clone(),
                    created_at: now(),
                };
                expenses::insert(tx, &expense)?;
                report_cache::invalidate(tx, &ctx.tenant_id)?;
                Change::of(event_types::EXPENSE_RECORDED, expense)
            })
            .await
    }

    async fn generate_report(&self, ctx: &RequestContext, args: GenerateReportArgs) -> Result<Value> {
        let from = parse_date("from", &args.from)?;
        let to = parse_date("to", &args.to)?;
        if from > to {
            return Err(JobBuildaError::validation(format!("from {} is after to {}", from, to)));
        }

        let report_type = args.report_type.as_str();
        let params = json!({ "from": from, "to": to });
        let key = report_cache::cache_key(report_type, &params);
        let tenant = &ctx.tenant_id;

        if !args.refresh {
            if let Some(hit) = self.deps.db.read(|conn| report_cache::get(conn, tenant, &key, now()))? {
                log::debug!("Serving cached {} report for {}", report_type, tenant);
                return Ok(envelope(args.report_type, from, to, &hit, true));
            }
        }

        let ttl = self.deps.reporting.cache_ttl_secs;
        let entry = self.deps.db.write(|tx| {
            let report = match args.report_type {
                ReportType::Vat100 => to_json(&Vat100::compute(tx, tenant, from, to)?)?,
                ReportType::Summary => to_json(&FinancialSummary::compute(tx, tenant, from, to)?)?,
            };
            report_cache::put(tx, tenant, &key, report_type, &report, now(), ttl)
        })?;
        log::info!("Generated {} report for {} ({} to {})", report_type, tenant, from, to);
        Ok(envelope(args.report_type, from, to, &entry, false))
    }
}

fn envelope(
    report_type: ReportType,
    from: NaiveDate,
    to: NaiveDate,
    entry: &report_cache::CachedReport,
    cached: bool,
) -> Value {
    json!({
        "report_type": report_type,
        "from": from,
        "to": to,
        "generated_at": to_rfc3339(&entry.generated_at),
        "expires_at": to_rfc3339(&entry.expires_at),
        "cached": cached,
        "report": entry.payload,
    })
}

#[async_trait]
impl Service for ReportingService {
    fn name(&self) -> &'static str {
        "reporting"
    }

    fn tools(&self) -> Vec<Tool> {
        vec![
            Tool::new("record_expense", "Record a purchase for input VAT and profit").with_schema(json!({
                "type": "object",
                "properties": {
                    "supplier": { "type": "string" },
                    "description": { "type": "string" },
                    "net_pence": { "type": "integer" },
                    "vat_pence": { "type": "integer" },
                    "incurred_on": { "type": "string", "format": "date" }
                },
                "required": ["supplier", "description", "net_pence", "vat_pence", "incurred_on"]
            })),
            Tool::new("generate_report", "Produce a VAT100 return or financial summary").with_schema(json!({
                "type": "object",
                "properties": {
                    "report_type": { "type": "string", "enum": ["vat100", "summary"] },
                    "from": { "type": "string", "format": "date" },
                    "to": { "type": "string", "format": "date" },
                    "refresh": { "type": "boolean" }
                },
                "required": ["report_type", "from", "to"]
            })),
        ]
    }

    fn resources(&self) -> Vec<ResourceTemplate> {
        vec![
            ResourceTemplate::new(EXPENSES, "expenses", "Recorded expenses"),
            ResourceTemplate::new(
                EVENTS,
                "events",
                "Outbox audit trail, newest events by default; ?after=<seq> pages forward, ?pending=true for undelivered",
            ),
        ]
    }

    async fn read_resource(&self, ctx: &RequestContext, resource: &ResourceMatch) -> Result<Value> {
        let tenant = &ctx.tenant_id;
        match resource.template.as_str() {
            EXPENSES => to_json(&self.deps.db.read(|conn| expenses::list(conn, tenant))?),
            EVENTS => {
                let pending = resource.query("pending") == Some("true");
                let limit = query_number::<usize>(resource, "limit")?.unwrap_or(EVENTS_LIMIT);
                if !(1..=EVENTS_LIMIT).contains(&limit) {
                    return Err(JobBuildaError::validation(format!(
                        "limit must be between 1 and {}, got {}",
                        EVENTS_LIMIT, limit
                    )));
                }
                let entries = match query_number::<i64>(resource, "after")? {
                    Some(after) => self.deps.db.read(|conn| outbox::list_after(conn, tenant, pending, after, limit))?,
                    None => self.deps.db.read(|conn| outbox::list(conn, tenant, pending, limit))?,
                };
                to_json(&entries)
            }
            _ => Err(JobBuildaError::UnknownResource(resource.uri.raw.clone())),
        }
    }

    async fn call_tool(&self, ctx: &RequestContext, name: &str, arguments: Value) -> Result<Value> {
        match name {
            "record_expense" => to_json(&self.record_expense(ctx, parse_args(name, arguments)?).await?),
            "generate_report" => self.generate_report(ctx, parse_args(name, arguments)?).await,
            _ => Err(JobBuildaError::UnknownTool(name.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::today;
    use crate::services::test_support::{ctx, deps, event_types as emitted, resource};
    use crate::services::{InvoicingService, ServiceDeps};

    struct Fixture {
        deps: ServiceDeps,
        invoicing: InvoicingService,
        reporting: ReportingService,
    }

    fn fixture() -> Fixture {
        let deps = deps();
        Fixture {
            invoicing: InvoicingService::new(deps.clone()),
            reporting: ReportingService::new(deps.clone()),
            deps,
        }
    }

    async fn issue_invoice(f: &Fixture, net_pence: i64) -> String {
        let invoice = f
            .invoicing
            .call_tool(
                &ctx("a"),
                "create_invoice",
                json!({"client_id": "c1", "items": [{"description": "Work", "quantity": 1, "unit_price_pence": net_pence}]}),
            )
            .await
            .unwrap();
        let id = invoice["id"].as_str().unwrap().to_string();
        f.invoicing.call_tool(&ctx("a"), "send_invoice", json!({"invoice_id": id})).await.unwrap();
        id
    }

    async fn expense(f: &Fixture, net: i64, vat: i64) {
        f.reporting
            .call_tool(
                &ctx("a"),
                "record_expense",
                json!({"supplier": "CEF", "description": "Cable", "net_pence": net, "vat_pence": vat, "incurred_on": today().to_string()}),
            )
            .await
            .unwrap();
    }

    fn period() -> Value {
        let day = today().to_string();
        json!({"from": day, "to": day})
    }

    async fn report(f: &Fixture, report_type: &str, refresh: bool) -> Value {
        let mut args = period();
        args["report_type"] = json!(report_type);
        args["refresh"] = json!(refresh);
        f.reporting.call_tool(&ctx("a"), "generate_report", args).await.unwrap()
    }

    #[tokio::test]
    async fn test_vat100_boxes() {
        let f = fixture();
        issue_invoice(&f, 123_456).await;
        issue_invoice(&f, 10_000).await;
        expense(&f, 50_099, 10_020).await;

        let result = report(&f, "vat100", false).await;
        let boxes = &result["report"];
        let output_vat = 24_691 + 2_000;
        assert_eq!(boxes["box1_vat_due_sales"], output_vat);
        assert_eq!(boxes["box2_vat_due_acquisitions"], 0);
        assert_eq!(boxes["box3_total_vat_due"], output_vat);
        assert_eq!(boxes["box4_vat_reclaimed"], 10_020);
        assert_eq!(boxes["box5_net_vat_due"], output_vat - 10_020);
        assert_eq!(boxes["box6_total_sales_ex_vat"], 1_334);
        assert_eq!(boxes["box7_total_purchases_ex_vat"], 500);
        assert_eq!(boxes["box8_goods_supplied_ex_vat"], 0);
        assert_eq!(boxes["box9_acquisitions_ex_vat"], 0);
    }

    #[tokio::test]
    async fn test_box5_is_absolute_when_reclaiming() {
        let f = fixture();
        issue_invoice(&f, 1_000).await;
        expense(&f, 100_000, 20_000).await;

        let result = report(&f, "vat100", false).await;
        assert_eq!(result["report"]["box5_net_vat_due"], 20_000 - 200);
    }

    #[tokio::test]
    async fn test_draft_invoices_are_excluded() {
        let f = fixture();
        f.invoicing
            .call_tool(
                &ctx("a"),
                "create_invoice",
                json!({"client_id": "c1", "items": [{"description": "Draft", "quantity": 1, "unit_price_pence": 999}]}),
            )
            .await
            .unwrap();

        let result = report(&f, "vat100", false).await;
        assert_eq!(result["report"]["invoice_count"], 0);
        assert_eq!(result["report"]["box1_vat_due_sales"], 0);
    }

    #[tokio::test]
    async fn test_summary_report() {
        let f = fixture();
        let id = issue_invoice(&f, 10_000).await;
        f.invoicing
            .call_tool(&ctx("a"), "record_payment", json!({"invoice_id": id, "amount_pence": 5_000, "method": "card"}))
            .await
            .unwrap();
        expense(&f, 1_000, 200).await;

        let result = report(&f, "summary", false).await;
        let summary = &result["report"];
        assert_eq!(summary["invoiced_gross_pence"], 12_000);
        assert_eq!(summary["received_pence"], 5_000);
        assert_eq!(summary["outstanding_pence"], 7_000);
        assert_eq!(summary["expenses_gross_pence"], 1_200);
        assert_eq!(summary["net_profit_pence"], 3_800);
    }

    #[tokio::test]
    async fn test_report_is_cached_until_refresh() {
        let f = fixture();
        issue_invoice(&f, 10_000).await;

        let first = report(&f, "summary", false).await;
        assert_eq!(first["cached"], false);
        let second = report(&f, "summary", false).await;
        assert_eq!(second["cached"], true);
        assert_eq!(second["report"], first["report"]);

        let refreshed = report(&f, "summary", true).await;
        assert_eq!(refreshed["cached"], false);
    }

    #[tokio::test]
    async fn test_financial_change_invalidates_cache() {
        let f = fixture();
        issue_invoice(&f, 10_000).await;
        report(&f, "vat100", false).await;

        expense(&f, 1_000, 200).await;
        let after = report(&f, "vat100", false).await;
        assert_eq!(after["cached"], false);
        assert_eq!(after["report"]["box4_vat_reclaimed"], 200);
    }

    #[tokio::test]
    async fn test_report_validates_period() {
        let f = fixture();
        let err = f
            .reporting
            .call_tool(
                &ctx("a"),
                "generate_report",
                json!({"report_type": "vat100", "from": "2024-04-01", "to": "2024-03-31"}),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, JobBuildaError::Validation(_)));
    }

    #[tokio::test]
    async fn test_generate_report_emits_no_event() {
        let f = fixture();
        report(&f, "summary", false).await;
        assert!(emitted(&f.deps, "a").is_empty());
    }

    #[tokio::test]
    async fn test_events_resource_lists_audit_trail() {
        let f = fixture();
        expense(&f, 1_000, 200).await;

        let events = f
            .reporting
            .read_resource(&ctx("a"), &resource(EVENTS, "jobbuilda://events"))
            .await
            .unwrap();
        let events = events.as_array().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["event_type"], "expense.recorded");
        assert!(events[0]["published_at"].is_string());

        let pending = f
            .reporting
            .read_resource(&ctx("a"), &resource(EVENTS, "jobbuilda://events?pending=true"))
            .await
            .unwrap();
        assert!(pending.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_events_resource_shows_newest_past_default_limit() {
        let f = fixture();
        for _ in 0..EVENTS_LIMIT {
            expense(&f, 100, 20).await;
        }
        f.invoicing
            .call_tool(
                &ctx("a"),
                "create_invoice",
                json!({"client_id": "c1", "items": [{"description": "Latest", "quantity": 1, "unit_price_pence": 100}]}),
            )
            .await
            .unwrap();

        let events = f
            .reporting
            .read_resource(&ctx("a"), &resource(EVENTS, "jobbuilda://events"))
            .await
            .unwrap();
        let events = events.as_array().unwrap();
        assert_eq!(events.len(), EVENTS_LIMIT);
        assert_eq!(events[EVENTS_LIMIT - 1]["event_type"], "invoice.created");
    }

    #[tokio::test]
    async fn test_events_resource_pages_with_after_and_limit() {
        let f = fixture();
        for net in [100, 200, 300] {
            expense(&f, net, 0).await;
        }

        let newest = f
            .reporting
            .read_resource(&ctx("a"), &resource(EVENTS, "jobbuilda://events?limit=2"))
            .await
            .unwrap();
        let newest = newest.as_array().unwrap();
        assert_eq!(newest.len(), 2);
        assert_eq!(newest[1]["payload"]["net_pence"], 300);

        let first_seq = newest[0]["seq"].as_i64().unwrap() - 1;
        let after = f
            .reporting
            .read_resource(&ctx("a"), &resource(EVENTS, &format!("jobbuilda://events?after={}", first_seq)))
            .await
            .unwrap();
        let nets: Vec<i64> = after
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["payload"]["net_pence"].as_i64().unwrap())
            .collect();
        assert_eq!(nets, vec![200, 300]);

        for bad in ["jobbuilda://events?limit=0", "jobbuilda://events?limit=501", "jobbuilda://events?after=x"] {
            let err = f.reporting.read_resource(&ctx("a"), &resource(EVENTS, bad)).await.unwrap_err();
            assert!(matches!(err, JobBuildaError::Validation(_)), "{}", bad);
        }
    }

    #[tokio::test]
    async fn test_oversized_expense_is_rejected() {
        let f = fixture();
        let err = f
            .reporting
            .call_tool(
                &ctx("a"),
                "record_expense",
                json!({"supplier": "CEF", "description": "Cable", "net_pence": i64::MAX, "vat_pence": 1, "incurred_on": today().to_string()}),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, JobBuildaError::Validation(_)));
        assert!(emitted(&f.deps, "a").is_empty());
    }
}

//! Invoicing service: invoices, issue dates, and payments.

use async_trait::async_trait;
use chrono::Duration;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::domain::invoice::transitions;
use crate::domain::money::add_pence;
use crate::domain::{
    Invoice, InvoiceStatus, LineItem, LineItemInput, Payment, PaymentMethod, QuoteStatus, RequestContext, Status,
    Totals, event_types,
};
use crate::error::{JobBuildaError, Result};
use crate::id::{new_id, now, parse_date, today};
use crate::services::{
    Change, ResourceMatch, ResourceTemplate, Service, ServiceDeps, Tool, parse_args, status_filter, to_json,
};
use crate::store::{self, invoices, jobs, materials, quotes, report_cache, transition};

const INVOICES: &str = "jobbuilda://invoices";
const INVOICE: &str = "jobbuilda://invoices/{id}";
const PAYMENTS: &str = "jobbuilda://invoices/{id}/payments";

const MAX_DUE_DAYS: i64 = 365;

#[derive(Debug, Deserialize)]
struct CreateInvoiceArgs {
    #[serde(default)]
    client_id: Option<String>,
    #[serde(default)]
    items: Vec<LineItemInput>,
    #[serde(default)]
    quote_id: Option<String>,
    #[serde(default)]
    job_id: Option<String>,
    #[serde(default)]
    due_days: Option<i64>,
    /// Bill the job's unbilled material draws on this invoice
    #[serde(default)]
    include_materials: bool,
}

#[derive(Debug, Deserialize)]
struct InvoiceIdArgs {
    invoice_id: String,
}

#[derive(Debug, Deserialize)]
struct RecordPaymentArgs {
    invoice_id: String,
    amount_pence: i64,
    method: PaymentMethod,
    #[serde(default)]
    reference: Option<String>,
    #[serde(default)]
    paid_on: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CancelInvoiceArgs {
    invoice_id: String,
    #[serde(default)]
    reason: Option<String>,
}

pub struct InvoicingService {
    deps: ServiceDeps,
}

impl InvoicingService {
    pub fn new(deps: ServiceDeps) -> Self {
        Self { deps }
    }

    async fn create(&self, ctx: &RequestContext, args: CreateInvoiceArgs) -> Result<Invoice> {
        let due_days = args.due_days.unwrap_or(self.deps.finance.invoice_due_days);
        if !(0..=MAX_DUE_DAYS).contains(&due_days) {
            return Err(JobBuildaError::validation(format!(
                "due_days must be between 0 and {}, got {}",
                MAX_DUE_DAYS, due_days
            )));
        }
        let extra_items: Vec<LineItem> = args
            .items
            .into_iter()
            .map(|input| LineItem::price(input, self.deps.finance.default_vat_rate_bp))
            .collect::<Result<_>>()?;

        self.deps
            .commit(ctx, |tx| {
                let mut client_id = args.client_id.map(|c| c.trim().to_string()).filter(|c| !c.is_empty());
                let mut items = Vec::new();

                if let Some(quote_id) = &args.quote_id {
                    let quote = quotes::require(tx, &ctx.tenant_id, quote_id)?;
                    if quote.status != QuoteStatus::Approved {
                        return Err(JobBuildaError::Conflict {
                            entity: QuoteStatus::ENTITY,
                            id: quote.id,
                            action: "invoice".to_string(),
                            status: quote.status.as_str().to_string(),
                        });
                    }
                    match &client_id {
                        Some(client) if *client != quote.client_id => {
                            return Err(JobBuildaError::validation(format!(
                                "client_id {} does not match quote client {}",
                                client, quote.client_id
                            )));
                        }
                        _ => client_id = Some(quote.client_id.clone()),
                    }
                    items.extend(quote.items);
                }
                items.extend(extra_items);

                let mut drawn = Vec::new();
                match &args.job_id {
                    Some(job_id) => {
                        jobs::require(tx, &ctx.tenant_id, job_id)?;
                        if args.include_materials {
                            for draw in materials::unbilled_draws(tx, &ctx.tenant_id, job_id)? {
                                items.push(draw.to_line_item()?);
                                drawn.push(draw.id);
                            }
                        }
                    }
                    None if args.include_materials => {
                        return Err(JobBuildaError::validation("include_materials requires job_id"));
                    }
                    None => {}
                }

                if items.is_empty() {
                    return Err(JobBuildaError::validation("at least one line item is required"));
                }
                let client_id = client_id.ok_or_else(|| JobBuildaError::validation("client_id is required"))?;

                let totals = Totals::from_items(&items)?;
                let ts = now();
                let invoice = Invoice {
                    id: new_id(),
                    tenant_id: ctx.tenant_id.clone(),
                    invoice_number: store::next_number(tx, &ctx.tenant_id, "INV")?,
                    client_id,
                    quote_id: args.quote_id,
                    job_id: args.job_id,
                    status: InvoiceStatus::Draft,
                    items,
                    net_pence: totals.net_pence,
                    vat_pence: totals.vat_pence,
                    gross_pence: totals.gross_pence,
                    amount_paid_pence: 0,
                    due_days,
                    issued_on: None,
                    due_on: None,
                    cancellation_reason: None,
                    created_by: ctx.actor.clone(),
                    created_at: ts,
                    updated_at: ts,
                };
                invoices::insert(tx, &invoice)?;
                materials::bill_draws(tx, &ctx.tenant_id, &drawn, &invoice.id)?;
                log::info!("Created invoice {} ({}) for {}", invoice.invoice_number, invoice.id, ctx.tenant_id);
                Change::of(event_types::INVOICE_CREATED, invoice)
            })
            .await
    }

    async fn send(&self, ctx: &RequestContext, args: InvoiceIdArgs) -> Result<Invoice> {
        self.deps
            .commit(ctx, |tx| {
                let invoice = invoices::require(tx, &ctx.tenant_id, &args.invoice_id)?;
                let issued_on = today();
                let due_on = issued_on + Duration::days(invoice.due_days);
                transition::apply(
                    tx,
                    invoices::TABLE,
                    &invoice.id,
                    &ctx.tenant_id,
                    &transitions::SEND,
                    &[("issued_on", &issued_on), ("due_on", &due_on)],
                )?;
                report_cache::invalidate(tx, &ctx.tenant_id)?;
                Change::of(transitions::SEND.event_type, invoices::require(tx, &ctx.tenant_id, &invoice.id)?)
            })
            .await
    }

    /// Record a payment, moving the invoice to `partial` or `paid`.
    ///
    /// The result (and event payload) is the updated invoice with the new
    /// payment row under `payment`.
    async fn record_payment(&self, ctx: &RequestContext, args: RecordPaymentArgs) -> Result<Value> {
        let paid_on = match &args.paid_on {
            Some(raw) => parse_date("paid_on", raw)?,
            None => today(),
        };

        self.deps
            .commit(ctx, |tx| {
                let invoice = invoices::require(tx, &ctx.tenant_id, &args.invoice_id)?;
                if !transitions::PAY_PART.allows(invoice.status) {
                    return Err(JobBuildaError::Conflict {
                        entity: InvoiceStatus::ENTITY,
                        id: invoice.id,
                        action: transitions::PAY_PART.action.to_string(),
                        status: invoice.status.as_str().to_string(),
                    });
                }
                let step = invoice.payment_transition(args.amount_pence)?;
                let amount_paid = add_pence(invoice.amount_paid_pence, args.amount_pence)?;
                transition::apply(
                    tx,
                    invoices::TABLE,
                    &invoice.id,
                    &ctx.tenant_id,
                    step,
                    &[("amount_paid_pence", &amount_paid)],
                )?;

                let payment = Payment {
                    id: new_id(),
                    tenant_id: ctx.tenant_id.clone(),
                    invoice_id: invoice.id.clone(),
                    amount_pence: args.amount_pence,
                    method: args.method,
                    reference: args.reference,
                    paid_on,
                    recorded_by: ctx.actor.clone(),
                    created_at: now(),
                };
                invoices::insert_payment(tx, &payment)?;
                report_cache::invalidate(tx, &ctx.tenant_id)?;

                let updated = invoices::require(tx, &ctx.tenant_id, &invoice.id)?;
                log::info!(
                    "Recorded payment of {}p on {} ({})",
                    payment.amount_pence,
                    updated.invoice_number,
                    updated.status.as_str()
                );
                let mut snapshot = to_json(&updated)?;
                snapshot["payment"] = to_json(&payment)?;
                Change::of(step.event_type, snapshot)
            })
            .await
    }

    async fn cancel(&self, ctx: &RequestContext, args: CancelInvoiceArgs) -> Result<Invoice> {
        self.deps
            .commit(ctx, |tx| {
                transition::apply(
                    tx,
                    invoices::TABLE,
                    &args.invoice_id,
                    &ctx.tenant_id,
                    &transitions::CANCEL,
                    &[("cancellation_reason", &args.reason)],
                )?;
                report_cache::invalidate(tx, &ctx.tenant_id)?;
                Change::of(transitions::CANCEL.event_type, invoices::require(tx, &ctx.tenant_id, &args.invoice_id)?)
            })
            .await
    }
}

#[async_trait]
impl Service for InvoicingService {
    fn name(&self) -> &'static str {
        "invoicing"
    }

    fn tools(&self) -> Vec<Tool> {
        vec![
            Tool::new("create_invoice", "Create a draft invoice from line items or an approved quote").with_schema(
                json!({
                    "type": "object",
                    "properties": {
                        "client_id": { "type": "string" },
                        "items": { "type": "array", "items": { "type": "object" } },
                        "quote_id": { "type": "string" },
                        "job_id": { "type": "string" },
                        "due_days": { "type": "integer" },
                        "include_materials": { "type": "boolean" }
                    },
                    "required": []
                }),
            ),
            Tool::new("send_invoice", "Issue a draft invoice and set its due date").with_id_arg("invoice_id"),
            Tool::new("record_payment", "Record a payment against a sent invoice").with_schema(json!({
                "type": "object",
                "properties": {
                    "invoice_id": { "type": "string" },
                    "amount_pence": { "type": "integer" },
                    "method": { "type": "string", "enum": ["bank_transfer", "card", "cash", "cheque"] },
                    "reference": { "type": "string" },
                    "paid_on": { "type": "string", "format": "date" }
                },
                "required": ["invoice_id", "amount_pence", "method"]
            })),
            Tool::new("cancel_invoice", "Cancel a draft or sent invoice").with_schema(json!({
                "type": "object",
                "properties": {
                    "invoice_id": { "type": "string" },
                    "reason": { "type": "string" }
                },
                "required": ["invoice_id"]
            })),
        ]
    }

    fn resources(&self) -> Vec<ResourceTemplate> {
        vec![
            ResourceTemplate::new(INVOICES, "invoices", "Invoices, optionally filtered by ?status="),
            ResourceTemplate::new(INVOICE, "invoice", "One invoice with its line items"),
            ResourceTemplate::new(PAYMENTS, "invoice payments", "Payments recorded against an invoice"),
        ]
    }

    async fn read_resource(&self, ctx: &RequestContext, resource: &ResourceMatch) -> Result<Value> {
        let tenant = &ctx.tenant_id;
        match resource.template.as_str() {
            INVOICES => {
                let status = status_filter::<InvoiceStatus>(resource)?;
                to_json(&self.deps.db.read(|conn| invoices::list(conn, tenant, status))?)
            }
            INVOICE => {
                let id = resource.param("id")?;
                to_json(&self.deps.db.read(|conn| invoices::require(conn, tenant, id))?)
            }
            PAYMENTS => {
                let id = resource.param("id")?;
                let payments = self.deps.db.read(|conn| {
                    invoices::require(conn, tenant, id)?;
                    invoices::list_payments(conn, tenant, id)
                })?;
                to_json(&payments)
            }
            _ => Err(JobBuildaError::UnknownResource(resource.uri.raw.clone())),
        }
    }

    async fn call_tool(&self, ctx: &RequestContext, name: &str, arguments: Value) -> Result<Value> {
        match name {
            "create_invoice" => to_json(&self.create(ctx, parse_args(name, arguments)?).await?),
            "send_invoice" => to_json(&self.send(ctx, parse_args(name, arguments)?).await?),
            "record_payment" => self.record_payment(ctx, parse_args(name, arguments)?).await,
            "cancel_invoice" => to_json(&self.cancel(ctx, parse_args(name, arguments)?).await?),
            _ => Err(JobBuildaError::UnknownTool(name.to_string())),
        }
    }
}

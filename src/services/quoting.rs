//! Quoting service: draft, price, send and decide quotes.

use async_trait::async_trait;
use chrono::Duration;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::domain::quote::transitions;
use crate::domain::{LineItem, LineItemInput, Quote, QuoteStatus, RequestContext, Totals, event_types};
use crate::error::{JobBuildaError, Result};
use crate::id::{new_id, now, today};
use crate::services::{
    Change, ResourceMatch, ResourceTemplate, Service, ServiceDeps, Tool, parse_args, require_text, status_filter,
    to_json,
};
use crate::store::{self, quotes, transition};

const QUOTES: &str = "jobbuilda://quotes";
const QUOTE: &str = "jobbuilda://quotes/{id}";

const MAX_VALID_DAYS: i64 = 3650;

#[derive(Debug, Deserialize)]
struct CreateQuoteArgs {
    client_id: String,
    title: String,
    items: Vec<LineItemInput>,
    #[serde(default)]
    notes: Option<String>,
    #[serde(default)]
    valid_days: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct UpdateQuoteArgs {
    quote_id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    items: Option<Vec<LineItemInput>>,
    #[serde(default)]
    notes: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QuoteIdArgs {
    quote_id: String,
}

#[derive(Debug, Deserialize)]
struct RejectQuoteArgs {
    quote_id: String,
    #[serde(default)]
    reason: Option<String>,
}

pub struct QuotingService {
    deps: ServiceDeps,
}

impl QuotingService {
    pub fn new(deps: ServiceDeps) -> Self {
        Self { deps }
    }

    async fn create(&self, ctx: &RequestContext, args: CreateQuoteArgs) -> Result<Quote> {
        require_text("client_id", &args.client_id)?;
        require_text("title", &args.title)?;
        let items = LineItem::price_all(args.items, self.deps.finance.default_vat_rate_bp)?;
        let valid_days = args.valid_days.unwrap_or(self.deps.finance.quote_valid_days);
        if !(1..=MAX_VALID_DAYS).contains(&valid_days) {
            return Err(JobBuildaError::validation(format!(
                "valid_days must be between 1 and 3650, got {}",
                valid_days
            )));
        }
        let totals = Totals::from_items(&items)?;

        self.deps
            .commit(ctx, |tx| {
                let ts = now();
                let quote = Quote {
                    id: new_id(),
                    tenant_id: ctx.tenant_id.clone(),
                    quote_number: store::next_number(tx, &ctx.tenant_id, "Q")?,
                    client_id: args.client_id.trim().to_string(),
                    title: args.title.trim().to_string(),
                    notes: args.notes,
                    status: QuoteStatus::Draft,
                    items,
                    net_pence: totals.net_pence,
                    vat_pence: totals.vat_pence,
                    gross_pence: totals.gross_pence,
                    valid_until: Some(today() + Duration::days(valid_days)),
                    sent_at: None,
                    decided_at: None,
                    rejection_reason: None,
                    created_by: ctx.actor.clone(),
                    created_at: ts,
                    updated_at: ts,
                };
                quotes::insert(tx, &quote)?;
                log::info!("Created quote {} ({}) for {}", quote.quote_number, quote.id, ctx.tenant_id);
                Change::of(event_types::QUOTE_CREATED, quote)
            })
            .await
    }

    async fn update(&self, ctx: &RequestContext, args: UpdateQuoteArgs) -> Result<Quote> {
        if let Some(title) = &args.title {
            require_text("title", title)?;
        }
        let items = args
            .items
            .map(|items| LineItem::price_all(items, self.deps.finance.default_vat_rate_bp))
            .transpose()?;

        self.deps
            .commit(ctx, |tx| {
                store::require_status(
                    tx,
                    quotes::TABLE,
                    &args.quote_id,
                    &ctx.tenant_id,
                    &[QuoteStatus::Draft],
                    "update",
                )?;
                let mut quote = quotes::require(tx, &ctx.tenant_id, &args.quote_id)?;
                if let Some(title) = args.title {
                    quote.title = title.trim().to_string();
                }
                if let Some(notes) = args.notes {
                    quote.notes = Some(notes);
                }
                if let Some(items) = items {
                    let totals = Totals::from_items(&items)?;
                    quote.items = items;
                    quote.net_pence = totals.net_pence;
                    quote.vat_pence = totals.vat_pence;
                    quote.gross_pence = totals.gross_pence;
                }
                quote.updated_at = now();
                quotes::update_content(tx, &quote)?;
                Change::of(event_types::QUOTE_UPDATED, quote)
            })
            .await
    }

    async fn send(&self, ctx: &RequestContext, args: QuoteIdArgs) -> Result<Quote> {
        self.deps
            .commit(ctx, |tx| {
                let sent_at = now();
                transition::apply(
                    tx,
                    quotes::TABLE,
                    &args.quote_id,
                    &ctx.tenant_id,
                    &transitions::SEND,
                    &[("sent_at", &sent_at)],
                )?;
                Change::of(transitions::SEND.event_type, quotes::require(tx, &ctx.tenant_id, &args.quote_id)?)
            })
            .await
    }

    async fn approve(&self, ctx: &RequestContext, args: QuoteIdArgs) -> Result<Quote> {
        self.deps
            .commit(ctx, |tx| {
                let decided_at = now();
                transition::apply(
                    tx,
                    quotes::TABLE,
                    &args.quote_id,
                    &ctx.tenant_id,
                    &transitions::APPROVE,
                    &[("decided_at", &decided_at)],
                )?;
                Change::of(transitions::APPROVE.event_type, quotes::require(tx, &ctx.tenant_id, &args.quote_id)?)
            })
            .await
    }

    async fn reject(&self, ctx: &RequestContext, args: RejectQuoteArgs) -> Result<Quote> {
        self.deps
            .commit(ctx, |tx| {
                let decided_at = now();
                transition::apply(
                    tx,
                    quotes::TABLE,
                    &args.quote_id,
                    &ctx.tenant_id,
                    &transitions::REJECT,
                    &[("decided_at", &decided_at), ("rejection_reason", &args.reason)],
                )?;
                Change::of(transitions::REJECT.event_type, quotes::require(tx, &ctx.tenant_id, &args.quote_id)?)
            })
            .await
    }
}

#[async_trait]
impl Service for QuotingService {
    fn name(&self) -> &'static str {
        "quoting"
    }

    fn tools(&self) -> Vec<Tool> {
        vec![
            Tool::new("create_quote", "Create a draft quote from priced line items").with_schema(json!({
                "type": "object",
                "properties": {
                    "client_id": { "type": "string" },
                    "title": { "type": "string" },
                    "items": { "type": "array", "items": { "type": "object" } },
                    "notes": { "type": "string" },
                    "valid_days": { "type": "integer" }
                },
                "required": ["client_id", "title", "items"]
            })),
            Tool::new("update_quote", "Edit a draft quote").with_schema(json!({
                "type": "object",
                "properties": {
                    "quote_id": { "type": "string" },
                    "title": { "type": "string" },
                    "items": { "type": "array", "items": { "type": "object" } },
                    "notes": { "type": "string" }
                },
                "required": ["quote_id"]
            })),
            Tool::new("send_quote", "Send a draft quote to the client").with_id_arg("quote_id"),
            Tool::new("approve_quote", "Record client approval of a sent quote").with_id_arg("quote_id"),
            Tool::new("reject_quote", "Record client rejection of a sent quote").with_schema(json!({
                "type": "object",
                "properties": {
                    "quote_id": { "type": "string" },
                    "reason": { "type": "string" }
                },
                "required": ["quote_id"]
            })),
        ]
    }

    fn resources(&self) -> Vec<ResourceTemplate> {
        vec![
            ResourceTemplate::new(QUOTES, "quotes", "Quotes, optionally filtered by ?status="),
            ResourceTemplate::new(QUOTE, "quote", "One quote with its line items"),
        ]
    }

    async fn read_resource(&self, ctx: &RequestContext, resource: &ResourceMatch) -> Result<Value> {
        match resource.template.as_str() {
            QUOTES => {
                let status = status_filter::<QuoteStatus>(resource)?;
                let list = self.deps.db.read(|conn| quotes::list(conn, &ctx.tenant_id, status))?;
                to_json(&list)
            }
            QUOTE => {
                let id = resource.param("id")?;
                to_json(&self.deps.db.read(|conn| quotes::require(conn, &ctx.tenant_id, id))?)
            }
            _ => Err(JobBuildaError::UnknownResource(resource.uri.raw.clone())),
        }
    }

    async fn call_tool(&self, ctx: &RequestContext, name: &str, arguments: Value) -> Result<Value> {
        let quote = match name {
            "create_quote" => self.create(ctx, parse_args(name, arguments)?).await?,
            "update_quote" => self.update(ctx, parse_args(name, arguments)?).await?,
            "send_quote" => self.send(ctx, parse_args(name, arguments)?).await?,
            "approve_quote" => self.approve(ctx, parse_args(name, arguments)?).await?,
            "reject_quote" => self.reject(ctx, parse_args(name, arguments)?).await?,
            _ => return Err(JobBuildaError::UnknownTool(name.to_string())),
        };
        to_json(&quote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::{ctx, deps, event_types as emitted, resource};

    fn service() -> QuotingService {
        QuotingService::new(deps())
    }

    fn create_args() -> Value {
        json!({
            "client_id": "client-1",
            "title": "Consumer unit upgrade",
            "items": [
                { "description": "Labour", "kind": "labour", "quantity": 4, "unit_price_pence": 4500 },
                { "description": "Consumer unit", "kind": "materials", "quantity": 1, "unit_price_pence": 12999 }
            ]
        })
    }

    async fn create(service: &QuotingService, tenant: &str) -> String {
        let quote = service.call_tool(&ctx(tenant), "create_quote", create_args()).await.unwrap();
        quote["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_create_quote_prices_items() {
        let service = service();
        let quote = service.call_tool(&ctx("a"), "create_quote", create_args()).await.unwrap();

        assert_eq!(quote["status"], "draft");
        assert_eq!(quote["quote_number"], "Q-00001");
        assert_eq!(quote["net_pence"], 30999);
        assert_eq!(quote["vat_pence"], 3600 + 2600);
        assert_eq!(quote["gross_pence"], 37199);
        assert_eq!(quote["created_by"], "tester");
        assert_eq!(emitted(&service.deps, "a"), vec!["quote.created"]);
    }

    #[tokio::test]
    async fn test_create_quote_requires_items() {
        let service = service();
        let err = service
            .call_tool(&ctx("a"), "create_quote", json!({"client_id": "c", "title": "t", "items": []}))
            .await
            .unwrap_err();
        assert!(matches!(err, JobBuildaError::Validation(_)));
        assert!(emitted(&service.deps, "a").is_empty());
    }

    #[tokio::test]
    async fn test_quote_lifecycle_emits_one_event_per_step() {
        let service = service();
        let id = create(&service, "a").await;

        let sent = service.call_tool(&ctx("a"), "send_quote", json!({"quote_id": id})).await.unwrap();
        assert_eq!(sent["status"], "sent");
        assert!(sent["sent_at"].is_string());

        let approved = service.call_tool(&ctx("a"), "approve_quote", json!({"quote_id": id})).await.unwrap();
        assert_eq!(approved["status"], "approved");

        assert_eq!(
            emitted(&service.deps, "a"),
            vec!["quote.created", "quote.sent", "quote.approved"]
        );
    }

    #[tokio::test]
    async fn test_update_only_while_draft() {
        let service = service();
        let id = create(&service, "a").await;

        let updated = service
            .call_tool(&ctx("a"), "update_quote", json!({"quote_id": id, "title": "Full rewire"}))
            .await
            .unwrap();
        assert_eq!(updated["title"], "Full rewire");

        service.call_tool(&ctx("a"), "send_quote", json!({"quote_id": id})).await.unwrap();
        let err = service
            .call_tool(&ctx("a"), "update_quote", json!({"quote_id": id, "title": "Too late"}))
            .await
            .unwrap_err();
        assert!(matches!(err, JobBuildaError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_reject_records_reason() {
        let service = service();
        let id = create(&service, "a").await;
        service.call_tool(&ctx("a"), "send_quote", json!({"quote_id": id})).await.unwrap();

        let rejected = service
            .call_tool(&ctx("a"), "reject_quote", json!({"quote_id": id, "reason": "too expensive"}))
            .await
            .unwrap();
        assert_eq!(rejected["status"], "rejected");
        assert_eq!(rejected["rejection_reason"], "too expensive");
    }

    #[tokio::test]
    async fn test_approve_draft_conflicts_without_event() {
        let service = service();
        let id = create(&service, "a").await;

        let err = service
            .call_tool(&ctx("a"), "approve_quote", json!({"quote_id": id}))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), format!("Cannot approve quote {}: status is draft", id));
        assert_eq!(emitted(&service.deps, "a"), vec!["quote.created"]);
    }

    #[tokio::test]
    async fn test_resources_are_tenant_scoped() {
        let service = service();
        let id = create(&service, "a").await;
        create(&service, "b").await;

        let list = service
            .read_resource(&ctx("a"), &resource(QUOTES, "jobbuilda://quotes"))
            .await
            .unwrap();
        assert_eq!(list.as_array().unwrap().len(), 1);

        let err = service
            .read_resource(&ctx("b"), &resource(QUOTE, &format!("jobbuilda://quotes/{}", id)))
            .await
            .unwrap_err();
        assert!(matches!(err, JobBuildaError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_list_filters_by_status() {
        let service = service();
        let id = create(&service, "a").await;
        create(&service, "a").await;
        service.call_tool(&ctx("a"), "send_quote", json!({"quote_id": id})).await.unwrap();

        let sent = service
            .read_resource(&ctx("a"), &resource(QUOTES, "jobbuilda://quotes?status=sent"))
            .await
            .unwrap();
        assert_eq!(sent.as_array().unwrap().len(), 1);
        assert_eq!(sent[0]["id"], id.as_str());
    }
}

//! Materials service: supplier catalogs and stock drawn onto jobs.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::domain::material::{sell_price, transitions};
use crate::domain::money::{check_vat_rate, sum_pence};
use crate::domain::{CatalogItem, JobStatus, MaterialDraw, MaterialStatus, RequestContext, event_types};
use crate::error::{JobBuildaError, Result};
use crate::id::{new_id, now};
use crate::services::{
    Change, ResourceMatch, ResourceTemplate, Service, ServiceDeps, Tool, parse_args, require_text, to_json,
};
use crate::store::{self, jobs, materials, transition};

const CATALOG: &str = "jobbuilda://catalog";
const CATALOG_ITEM: &str = "jobbuilda://catalog/{id}";
const JOB_MATERIALS: &str = "jobbuilda://jobs/{id}/materials";

const DEFAULT_UNIT: &str = "each";

#[derive(Debug, Deserialize)]
struct SaveCatalogItemArgs {
    supplier: String,
    sku: String,
    description: String,
    #[serde(default)]
    unit: Option<String>,
    unit_cost_pence: i64,
    #[serde(default)]
    markup_bp: Option<i64>,
    #[serde(default)]
    vat_rate_bp: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct DrawMaterialArgs {
    job_id: String,
    item_id: String,
    quantity: f64,
}

#[derive(Debug, Deserialize)]
struct DrawIdArgs {
    draw_id: String,
}

pub struct MaterialsService {
    deps: ServiceDeps,
}

impl MaterialsService {
    pub fn new(deps: ServiceDeps) -> Self {
        Self { deps }
    }

    async fn save_item(&self, ctx: &RequestContext, args: SaveCatalogItemArgs) -> Result<CatalogItem> {
        require_text("supplier", &args.supplier)?;
        require_text("sku", &args.sku)?;
        require_text("description", &args.description)?;
        let markup_bp = args.markup_bp.unwrap_or(self.deps.finance.default_markup_bp);
        let unit_price_pence = sell_price(args.unit_cost_pence, markup_bp)?;
        let vat_rate_bp = check_vat_rate(args.vat_rate_bp.unwrap_or(self.deps.finance.default_vat_rate_bp))?;
        let unit = match args.unit.as_deref().map(str::trim) {
            Some(u) if !u.is_empty() => u.to_string(),
            _ => DEFAULT_UNIT.to_string(),
        };
        let supplier = args.supplier.trim().to_string();
        let sku = args.sku.trim().to_string();

        self.deps
            .commit(ctx, |tx| {
                let ts = now();
                // Same supplier and SKU updates the existing entry in place
                let (id, created_at) = match materials::find_item(tx, &ctx.tenant_id, &supplier, &sku)? {
                    Some(existing) => (existing.id, existing.created_at),
                    None => (new_id(), ts),
                };
                let item = CatalogItem {
                    id,
                    tenant_id: ctx.tenant_id.clone(),
                    supplier: supplier.clone(),
                    sku: sku.clone(),
                    description: args.description.trim().to_string(),
                    unit,
                    unit_cost_pence: args.unit_cost_pence,
                    markup_bp,
                    unit_price_pence,
                    vat_rate_bp,
                    created_at,
                    updated_at: ts,
                };
                materials::save_item(tx, &item)?;
                Change::of(event_types::CATALOG_ITEM_SAVED, item)
            })
            .await
    }

    async fn draw(&self, ctx: &RequestContext, args: DrawMaterialArgs) -> Result<MaterialDraw> {
        self.deps
            .commit(ctx, |tx| {
                store::require_status(
                    tx,
                    jobs::TABLE,
                    &args.job_id,
                    &ctx.tenant_id,
                    &[JobStatus::Scheduled, JobStatus::InProgress],
                    "draw materials for",
                )?;
                let item = materials::require_item(tx, &ctx.tenant_id, &args.item_id)?;
                let net_pence = MaterialDraw::net_for(&item, args.quantity)?;
                let ts = now();
                let draw = MaterialDraw {
                    id: new_id(),
                    tenant_id: ctx.tenant_id.clone(),
                    job_id: args.job_id.clone(),
                    catalog_item_id: item.id,
                    supplier: item.supplier,
                    sku: item.sku,
                    description: item.description,
                    quantity: args.quantity,
                    unit_price_pence: item.unit_price_pence,
                    vat_rate_bp: item.vat_rate_bp,
                    net_pence,
                    status: MaterialStatus::Drawn,
                    invoice_id: None,
                    drawn_by: ctx.actor.clone(),
                    created_at: ts,
                    updated_at: ts,
                };
                materials::insert_draw(tx, &draw)?;
                Change::of(event_types::MATERIAL_DRAWN, draw)
            })
            .await
    }

    async fn return_draw(&self, ctx: &RequestContext, args: DrawIdArgs) -> Result<MaterialDraw> {
        self.deps
            .commit(ctx, |tx| {
                let draw = materials::require_draw(tx, &ctx.tenant_id, &args.draw_id)?;
                if let Some(invoice_id) = &draw.invoice_id {
                    return Err(JobBuildaError::validation(format!(
                        "material {} is already billed on invoice {}",
                        draw.id, invoice_id
                    )));
                }
                transition::apply(
                    tx,
                    materials::TABLE,
                    &args.draw_id,
                    &ctx.tenant_id,
                    &transitions::RETURN,
                    &[],
                )?;
                Change::of(
                    transitions::RETURN.event_type,
                    materials::require_draw(tx, &ctx.tenant_id, &args.draw_id)?,
                )
            })
            .await
    }
}

#[async_trait]
impl Service for MaterialsService {
    fn name(&self) -> &'static str {
        "materials"
    }

    fn tools(&self) -> Vec<Tool> {
        vec![
            Tool::new("save_catalog_item", "Add or reprice a supplier catalog item").with_schema(json!({
                "type": "object",
                "properties": {
                    "supplier": { "type": "string" },
                    "sku": { "type": "string" },
                    "description": { "type": "string" },
                    "unit": { "type": "string" },
                    "unit_cost_pence": { "type": "integer" },
                    "markup_bp": { "type": "integer" },
                    "vat_rate_bp": { "type": "integer" }
                },
                "required": ["supplier", "sku", "description", "unit_cost_pence"]
            })),
            Tool::new("draw_material", "Draw catalog stock onto an open job").with_schema(json!({
                "type": "object",
                "properties": {
                    "job_id": { "type": "string" },
                    "item_id": { "type": "string" },
                    "quantity": { "type": "number" }
                },
                "required": ["job_id", "item_id", "quantity"]
            })),
            Tool::new("return_material", "Return unbilled stock from a job").with_id_arg("draw_id"),
        ]
    }

    fn resources(&self) -> Vec<ResourceTemplate> {
        vec![
            ResourceTemplate::new(CATALOG, "catalog", "Catalog items, filtered by ?supplier= and ?q="),
            ResourceTemplate::new(CATALOG_ITEM, "catalog_item", "One catalog item"),
            ResourceTemplate::new(JOB_MATERIALS, "job_materials", "Materials drawn onto a job"),
        ]
    }

    async fn read_resource(&self, ctx: &RequestContext, resource: &ResourceMatch) -> Result<Value> {
        let tenant = &ctx.tenant_id;
        match resource.template.as_str() {
            CATALOG => {
                let supplier = resource.query("supplier");
                let search = resource.query("q");
                to_json(&self.deps.db.read(|conn| materials::list_items(conn, tenant, supplier, search))?)
            }
            CATALOG_ITEM => {
                let id = resource.param("id")?;
                to_json(&self.deps.db.read(|conn| materials::require_item(conn, tenant, id))?)
            }
            JOB_MATERIALS => {
                let id = resource.param("id")?;
                let draws = self.deps.db.read(|conn| {
                    jobs::require(conn, tenant, id)?;
                    materials::list_draws(conn, tenant, id)
                })?;
                let drawn = draws.iter().filter(|d| d.status == MaterialStatus::Drawn);
                let net_pence = sum_pence(drawn.clone().map(|d| d.net_pence))?;
                let unbilled_pence = sum_pence(drawn.filter(|d| d.invoice_id.is_none()).map(|d| d.net_pence))?;
                Ok(json!({
                    "job_id": id,
                    "draws": draws,
                    "net_pence": net_pence,
                    "unbilled_pence": unbilled_pence,
                }))
            }
            _ => Err(JobBuildaError::UnknownResource(resource.uri.raw.clone())),
        }
    }

    async fn call_tool(&self, ctx: &RequestContext, name: &str, arguments: Value) -> Result<Value> {
        match name {
            "save_catalog_item" => to_json(&self.save_item(ctx, parse_args(name, arguments)?).await?),
            "draw_material" => to_json(&self.draw(ctx, parse_args(name, arguments)?).await?),
            "return_material" => to_json(&self.return_draw(ctx, parse_args(name, arguments)?).await?),
            _ => Err(JobBuildaError::UnknownTool(name.to_string())),
        }
    }
}

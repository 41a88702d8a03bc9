//! Supplier catalogs and materials drawn against jobs.
//!
//! A catalog item is a supplier's SKU with the contractor's cost and
//! sell price. Drawing an item onto a job freezes that price on the draw;
//! unbilled draws become `materials` lines on the job's next invoice.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::event::event_types;
use crate::domain::money::{LineItem, LineKind, add_pence, apply_rate, check_amount, extend};
use crate::domain::status::{Status, Transition};
use crate::domain::tenant::TenantId;
use crate::error::{JobBuildaError, Result};

/// Largest markup accepted on a catalog item (1000%)
pub const MAX_MARKUP_BP: i64 = 100_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: String,
    pub tenant_id: TenantId,
    pub supplier: String,
    pub sku: String,
    pub description: String,
    pub unit: String,
    pub unit_cost_pence: i64,
    pub markup_bp: i64,
    pub unit_price_pence: i64,
    pub vat_rate_bp: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Sell price for a cost plus a basis-point markup.
pub fn sell_price(unit_cost_pence: i64, markup_bp: i64) -> Result<i64> {
    check_amount("unit_cost_pence", unit_cost_pence)?;
    if !(0..=MAX_MARKUP_BP).contains(&markup_bp) {
        return Err(JobBuildaError::validation(format!(
            "markup_bp must be between 0 and {}, got {}",
            MAX_MARKUP_BP, markup_bp
        )));
    }
    let price = add_pence(unit_cost_pence, apply_rate(unit_cost_pence, markup_bp)?)?;
    check_amount("unit_price_pence", price)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaterialStatus {
    Drawn,
    Returned,
}

impl Status for MaterialStatus {
    const ENTITY: &'static str = "material";

    fn as_str(&self) -> &'static str {
        match self {
            MaterialStatus::Drawn => "drawn",
            MaterialStatus::Returned => "returned",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "drawn" => Some(MaterialStatus::Drawn),
            "returned" => Some(MaterialStatus::Returned),
            _ => None,
        }
    }
}

pub mod transitions {
    use super::*;

    pub const RETURN: Transition<MaterialStatus> = Transition {
        action: "return",
        from: &[MaterialStatus::Drawn],
        to: MaterialStatus::Returned,
        event_type: event_types::MATERIAL_RETURNED,
    };
}

/// Catalog stock drawn onto a job at the price in force when drawn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialDraw {
    pub id: String,
    pub tenant_id: TenantId,
    pub job_id: String,
    pub catalog_item_id: String,
    pub supplier: String,
    pub sku: String,
    pub description: String,
    pub quantity: f64,
    pub unit_price_pence: i64,
    pub vat_rate_bp: i64,
    pub net_pence: i64,
    pub status: MaterialStatus,
    /// Invoice this draw was billed on
    pub invoice_id: Option<String>,
    pub drawn_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MaterialDraw {
    /// Net cost of `quantity` units of `item`, validated.
    pub fn net_for(item: &CatalogItem, quantity: f64) -> Result<i64> {
        if !quantity.is_finite() || quantity <= 0.0 {
            return Err(JobBuildaError::validation(format!(
                "quantity must be positive, got {}",
                quantity
            )));
        }
        extend("material net", quantity, item.unit_price_pence)
    }

    /// Invoice line for this draw.
    pub fn to_line_item(&self) -> Result<LineItem> {
        Ok(LineItem {
            description: format!("{} ({} {})", self.description, self.supplier, self.sku),
            kind: LineKind::Materials,
            quantity: self.quantity,
            unit_price_pence: self.unit_price_pence,
            vat_rate_bp: self.vat_rate_bp,
            net_pence: self.net_pence,
            vat_pence: apply_rate(self.net_pence, self.vat_rate_bp)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::now;

    fn item(unit_price_pence: i64) -> CatalogItem {
        CatalogItem {
            id: "i1".to_string(),
            tenant_id: TenantId::new("a").unwrap(),
            supplier: "CEF".to_string(),
            sku: "T&E-2.5".to_string(),
            description: "2.5mm twin and earth".to_string(),
            unit: "m".to_string(),
            unit_cost_pence: 80,
            markup_bp: 2500,
            unit_price_pence,
            vat_rate_bp: 2000,
            created_at: now(),
            updated_at: now(),
        }
    }

    #[test]
    fn test_sell_price_applies_markup() {
        assert_eq!(sell_price(80, 2500).unwrap(), 100);
        assert_eq!(sell_price(1_999, 0).unwrap(), 1_999);
        // 33p + 15% = 37.95p -> 38p
        assert_eq!(sell_price(33, 1500).unwrap(), 38);
    }

    #[test]
    fn test_sell_price_rejects_bad_input() {
        assert!(sell_price(-1, 0).is_err());
        assert!(sell_price(100, -1).is_err());
        assert!(sell_price(100, MAX_MARKUP_BP + 1).is_err());
        assert!(sell_price(i64::MAX, 2000).is_err());
    }

    #[test]
    fn test_net_for_quantity() {
        assert_eq!(MaterialDraw::net_for(&item(100), 12.5).unwrap(), 1_250);
        assert!(MaterialDraw::net_for(&item(100), 0.0).is_err());
        assert!(MaterialDraw::net_for(&item(100), f64::NAN).is_err());
        assert!(MaterialDraw::net_for(&item(100), 1e300).is_err());
    }

    #[test]
    fn test_return_only_from_drawn() {
        assert!(transitions::RETURN.allows(MaterialStatus::Drawn));
        assert!(!transitions::RETURN.allows(MaterialStatus::Returned));
    }
}

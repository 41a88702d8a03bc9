//! Money and VAT arithmetic
//!
//! Amounts are integer pence. VAT rates are basis points (2000 = 20%).

use serde::{Deserialize, Serialize};

use crate::error::{JobBuildaError, Result};

/// Largest accepted VAT rate (100%)
pub const MAX_VAT_RATE_BP: i64 = 10_000;

/// Largest single amount accepted from a caller (£1bn).
pub const MAX_AMOUNT_PENCE: i64 = 100_000_000_000;

fn out_of_range() -> JobBuildaError {
    JobBuildaError::validation("amount out of range")
}

/// Validate a caller-supplied amount: not negative, at most `MAX_AMOUNT_PENCE`.
pub fn check_amount(field: &str, pence: i64) -> Result<i64> {
    if !(0..=MAX_AMOUNT_PENCE).contains(&pence) {
        return Err(JobBuildaError::validation(format!(
            "{} must be between 0 and {}, got {}",
            field, MAX_AMOUNT_PENCE, pence
        )));
    }
    Ok(pence)
}

pub fn add_pence(a: i64, b: i64) -> Result<i64> {
    a.checked_add(b).ok_or_else(out_of_range)
}

/// Sum amounts, failing instead of wrapping.
pub fn sum_pence(amounts: impl IntoIterator<Item = i64>) -> Result<i64> {
    amounts.into_iter().try_fold(0i64, add_pence)
}

/// Apply a basis-point rate to an amount, rounding half up.
pub fn apply_rate(amount_pence: i64, rate_bp: i64) -> Result<i64> {
    let scaled = amount_pence.checked_mul(rate_bp).ok_or_else(out_of_range)?;
    let magnitude = (scaled.unsigned_abs() + 5_000) / 10_000;
    let magnitude = i64::try_from(magnitude).map_err(|_| out_of_range())?;
    Ok(if scaled >= 0 { magnitude } else { -magnitude })
}

/// Price `quantity` units at `unit_pence`, rounded to the penny and bounded.
pub fn extend(field: &str, quantity: f64, unit_pence: i64) -> Result<i64> {
    let total = (quantity * unit_pence as f64).round();
    if !total.is_finite() || total > MAX_AMOUNT_PENCE as f64 {
        return Err(JobBuildaError::validation(format!(
            "{} exceeds {} pence",
            field, MAX_AMOUNT_PENCE
        )));
    }
    Ok(total as i64)
}

/// Validate a VAT rate in basis points.
pub fn check_vat_rate(rate_bp: i64) -> Result<i64> {
    if !(0..=MAX_VAT_RATE_BP).contains(&rate_bp) {
        return Err(JobBuildaError::validation(format!(
            "vat_rate_bp must be between 0 and {}, got {}",
            MAX_VAT_RATE_BP, rate_bp
        )));
    }
    Ok(rate_bp)
}

/// What a line item charges for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineKind {
    Labour,
    Materials,
    #[default]
    Other,
}

/// Line item as supplied by a caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItemInput {
    pub description: String,
    #[serde(default)]
    pub kind: LineKind,
    pub quantity: f64,
    pub unit_price_pence: i64,
    #[serde(default)]
    pub vat_rate_bp: Option<i64>,
}

/// Priced line item as stored on quotes and invoices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub description: String,
    pub kind: LineKind,
    pub quantity: f64,
    pub unit_price_pence: i64,
    pub vat_rate_bp: i64,
    pub net_pence: i64,
    pub vat_pence: i64,
}

impl LineItem {
    /// Validate and price a caller-supplied line.
    pub fn price(input: LineItemInput, default_vat_rate_bp: i64) -> Result<Self> {
        if input.description.trim().is_empty() {
            return Err(JobBuildaError::validation("line item description must not be empty"));
        }
        if !input.quantity.is_finite() || input.quantity <= 0.0 {
            return Err(JobBuildaError::validation(format!(
                "line item quantity must be positive, got {}",
                input.quantity
            )));
        }
        check_amount("line item unit_price_pence", input.unit_price_pence)?;
        let vat_rate_bp = check_vat_rate(input.vat_rate_bp.unwrap_or(default_vat_rate_bp))?;

        let net_pence = extend("line item net", input.quantity, input.unit_price_pence)?;
        let vat_pence = apply_rate(net_pence, vat_rate_bp)?;

        Ok(Self {
            description: input.description.trim().to_string(),
            kind: input.kind,
            quantity: input.quantity,
            unit_price_pence: input.unit_price_pence,
            vat_rate_bp,
            net_pence,
            vat_pence,
        })
    }

    /// Price a list of lines; at least one line is required.
    pub fn price_all(inputs: Vec<LineItemInput>, default_vat_rate_bp: i64) -> Result<Vec<Self>> {
        if inputs.is_empty() {
            return Err(JobBuildaError::validation("at least one line item is required"));
        }
        inputs
            .into_iter()
            .map(|input| Self::price(input, default_vat_rate_bp))
            .collect()
    }
}

/// Net, VAT and gross totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    pub net_pence: i64,
    pub vat_pence: i64,
    pub gross_pence: i64,
}

impl Totals {
    pub fn from_items(items: &[LineItem]) -> Result<Self> {
        let net_pence = sum_pence(items.iter().map(|i| i.net_pence))?;
        let vat_pence = sum_pence(items.iter().map(|i| i.vat_pence))?;
        Ok(Self {
            net_pence,
            vat_pence,
            gross_pence: add_pence(net_pence, vat_pence)?,
        })
    }

    /// Totals for a single net amount at one rate.
    pub fn from_net(net_pence: i64, rate_bp: i64) -> Result<Self> {
        let vat_pence = apply_rate(net_pence, rate_bp)?;
        Ok(Self {
            net_pence,
            vat_pence,
            gross_pence: add_pence(net_pence, vat_pence)?,
        })
    }
}

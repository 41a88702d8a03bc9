//! Purchases recorded for VAT and profit reporting.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::money::{add_pence, check_amount};
use crate::domain::tenant::TenantId;
use crate::error::{JobBuildaError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    pub id: String,
    pub tenant_id: TenantId,
    pub supplier: String,
    pub description: String,
    pub net_pence: i64,
    pub vat_pence: i64,
    pub gross_pence: i64,
    pub incurred_on: NaiveDate,
    pub recorded_by: String,
    pub created_at: DateTime<Utc>,
}

/// Check amounts on an expense as supplied on the invoice from the supplier.
pub fn check_amounts(net_pence: i64, vat_pence: i64) -> Result<i64> {
    check_amount("net_pence", net_pence)?;
    check_amount("vat_pence", vat_pence)?;
    if vat_pence > net_pence {
        return Err(JobBuildaError::validation(format!(
            "expense VAT {} exceeds net amount {}",
            vat_pence, net_pence
        )));
    }
    add_pence(net_pence, vat_pence)
}

//! Variations: extra work agreed on a job after the quote.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::event::event_types;
use crate::domain::status::{Status, Transition};
use crate::domain::tenant::TenantId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariationStatus {
    Pending,
    Approved,
    Rejected,
    Completed,
}

impl Status for VariationStatus {
    const ENTITY: &'static str = "variation";

    fn as_str(&self) -> &'static str {
        match self {
            VariationStatus::Pending => "pending",
            VariationStatus::Approved => "approved",
            VariationStatus::Rejected => "rejected",
            VariationStatus::Completed => "completed",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(VariationStatus::Pending),
            "approved" => Some(VariationStatus::Approved),
            "rejected" => Some(VariationStatus::Rejected),
            "completed" => Some(VariationStatus::Completed),
            _ => None,
        }
    }
}

pub mod transitions {
    use super::*;

    pub const APPROVE: Transition<VariationStatus> = Transition {
        action: "approve",
        from: &[VariationStatus::Pending],
        to: VariationStatus::Approved,
        event_type: event_types::VARIATION_APPROVED,
    };

    pub const REJECT: Transition<VariationStatus> = Transition {
        action: "reject",
        from: &[VariationStatus::Pending],
        to: VariationStatus::Rejected,
        event_type: event_types::VARIATION_REJECTED,
    };

    pub const COMPLETE: Transition<VariationStatus> = Transition {
        action: "complete",
        from: &[VariationStatus::Approved],
        to: VariationStatus::Completed,
        event_type: event_types::VARIATION_COMPLETED,
    };
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variation {
    pub id: String,
    pub tenant_id: TenantId,
    pub job_id: String,
    pub description: String,
    pub net_pence: i64,
    pub vat_rate_bp: i64,
    pub vat_pence: i64,
    pub gross_pence: i64,
    pub status: VariationStatus,
    pub rejection_reason: Option<String>,
    pub decided_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//! Quotes: priced proposals sent to a client for approval.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::event::event_types;
use crate::domain::money::{LineItem, Totals};
use crate::domain::status::{Status, Transition};
use crate::domain::tenant::TenantId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteStatus {
    /// Being prepared, editable
    Draft,
    /// Issued to the client
    Sent,
    Approved,
    Rejected,
}

impl Status for QuoteStatus {
    const ENTITY: &'static str = "quote";

    fn as_str(&self) -> &'static str {
        match self {
            QuoteStatus::Draft => "draft",
            QuoteStatus::Sent => "sent",
            QuoteStatus::Approved => "approved",
            QuoteStatus::Rejected => "rejected",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(QuoteStatus::Draft),
            "sent" => Some(QuoteStatus::Sent),
            "approved" => Some(QuoteStatus::Approved),
            "rejected" => Some(QuoteStatus::Rejected),
            _ => None,
        }
    }
}

pub mod transitions {
    use super::*;

    pub const SEND: Transition<QuoteStatus> = Transition {
        action: "send",
        from: &[QuoteStatus::Draft],
        to: QuoteStatus::Sent,
        event_type: event_types::QUOTE_SENT,
    };

    pub const APPROVE: Transition<QuoteStatus> = Transition {
        action: "approve",
        from: &[QuoteStatus::Sent],
        to: QuoteStatus::Approved,
        event_type: event_types::QUOTE_APPROVED,
    };

    pub const REJECT: Transition<QuoteStatus> = Transition {
        action: "reject",
        from: &[QuoteStatus::Sent],
        to: QuoteStatus::Rejected,
        event_type: event_types::QUOTE_REJECTED,
    };
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub id: String,
    pub tenant_id: TenantId,
    /// Per-tenant sequence, e.g. "Q-00012"
    pub quote_number: String,
    pub client_id: String,
    pub title: String,
    pub notes: Option<String>,
    pub status: QuoteStatus,
    pub items: Vec<LineItem>,
    pub net_pence: i64,
    pub vat_pence: i64,
    pub gross_pence: i64,
    pub valid_until: Option<NaiveDate>,
    pub sent_at: Option<DateTime<Utc>>,
    /// When the client approved or rejected
    pub decided_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Quote {
    pub fn totals(&self) -> Totals {
        Totals {
            net_pence: self.net_pence,
            vat_pence: self.vat_pence,
            gross_pence: self.gross_pence,
        }
    }
}

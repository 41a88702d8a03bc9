//! Invoices and the payments recorded against them.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::event::event_types;
use crate::domain::money::{LineItem, check_amount};
use crate::domain::status::{Status, Transition};
use crate::domain::tenant::TenantId;
use crate::error::{JobBuildaError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Sent,
    /// Some but not all of the gross amount received
    Partial,
    Paid,
    Cancelled,
}

impl Status for InvoiceStatus {
    const ENTITY: &'static str = "invoice";

    fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Sent => "sent",
            InvoiceStatus::Partial => "partial",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Cancelled => "cancelled",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(InvoiceStatus::Draft),
            "sent" => Some(InvoiceStatus::Sent),
            "partial" => Some(InvoiceStatus::Partial),
            "paid" => Some(InvoiceStatus::Paid),
            "cancelled" => Some(InvoiceStatus::Cancelled),
            _ => None,
        }
    }
}

impl InvoiceStatus {
    /// Statuses that count as issued for VAT purposes
    pub const ISSUED: &'static [InvoiceStatus] = &[InvoiceStatus::Sent, InvoiceStatus::Partial, InvoiceStatus::Paid];

    /// Issued but not yet fully paid
    pub const OPEN: &'static [InvoiceStatus] = &[InvoiceStatus::Sent, InvoiceStatus::Partial];
}

pub mod transitions {
    use super::*;

    pub const SEND: Transition<InvoiceStatus> = Transition {
        action: "send",
        from: &[InvoiceStatus::Draft],
        to: InvoiceStatus::Sent,
        event_type: event_types::INVOICE_SENT,
    };

    pub const PAY_PART: Transition<InvoiceStatus> = Transition {
        action: "record_payment",
        from: &[InvoiceStatus::Sent, InvoiceStatus::Partial],
        to: InvoiceStatus::Partial,
        event_type: event_types::INVOICE_PARTIALLY_PAID,
    };

    pub const PAY_FULL: Transition<InvoiceStatus> = Transition {
        action: "record_payment",
        from: &[InvoiceStatus::Sent, InvoiceStatus::Partial],
        to: InvoiceStatus::Paid,
        event_type: event_types::INVOICE_PAID,
    };

    pub const CANCEL: Transition<InvoiceStatus> = Transition {
        action: "cancel",
        from: &[InvoiceStatus::Draft, InvoiceStatus::Sent],
        to: InvoiceStatus::Cancelled,
        event_type: event_types::INVOICE_CANCELLED,
    };
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: String,
    pub tenant_id: TenantId,
    pub invoice_number: String,
    pub client_id: String,
    pub quote_id: Option<String>,
    pub job_id: Option<String>,
    pub status: InvoiceStatus,
    pub items: Vec<LineItem>,
    pub net_pence: i64,
    pub vat_pence: i64,
    pub gross_pence: i64,
    pub amount_paid_pence: i64,
    /// Payment terms applied when the invoice is sent
    pub due_days: i64,
    pub issued_on: Option<NaiveDate>,
    pub due_on: Option<NaiveDate>,
    pub cancellation_reason: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    pub fn outstanding_pence(&self) -> i64 {
        self.gross_pence - self.amount_paid_pence
    }

    /// Pick the payment transition for an amount, checking it against the balance.
    pub fn payment_transition(&self, amount_pence: i64) -> Result<&'static Transition<InvoiceStatus>> {
        if amount_pence <= 0 {
            return Err(JobBuildaError::validation(format!(
                "amount_pence must be positive, got {}",
                amount_pence
            )));
        }
        check_amount("amount_pence", amount_pence)?;
        let outstanding = self.outstanding_pence();
        if amount_pence > outstanding {
            return Err(JobBuildaError::validation(format!(
                "payment of {} exceeds outstanding balance {} on invoice {}",
                amount_pence, outstanding, self.invoice_number
            )));
        }
        if amount_pence == outstanding {
            Ok(&transitions::PAY_FULL)
        } else {
            Ok(&transitions::PAY_PART)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    BankTransfer,
    Card,
    Cash,
    Cheque,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::Card => "card",
            PaymentMethod::Cash => "cash",
            PaymentMethod::Cheque => "cheque",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "bank_transfer" => Some(PaymentMethod::BankTransfer),
            "card" => Some(PaymentMethod::Card),
            "cash" => Some(PaymentMethod::Cash),
            "cheque" => Some(PaymentMethod::Cheque),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: String,
    pub tenant_id: TenantId,
    pub invoice_id: String,
    pub amount_pence: i64,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub paid_on: NaiveDate,
    pub recorded_by: String,
    pub created_at: DateTime<Utc>,
}

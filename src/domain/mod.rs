//! Domain types for JobBuilda
//!
//! - Tenant scope and request context
//! - Status machines with static transition allow-lists
//! - Entities: quotes, invoices/payments, jobs/time, variations,
//!   compliance tests, expenses, supplier catalogs and job materials
//! - Outbox event envelope
//! - Money and VAT arithmetic

pub mod compliance;
pub mod event;
pub mod expense;
pub mod invoice;
pub mod job;
pub mod material;
pub mod money;
pub mod quote;
pub mod status;
pub mod tenant;
pub mod variation;

pub use compliance::{
    CertificateType, CircuitReadings, CircuitResult, ComplianceTest, TestOutcome, TestStatus,
};
pub use event::{EventEnvelope, event_types};
pub use expense::Expense;
pub use invoice::{Invoice, InvoiceStatus, Payment, PaymentMethod};
pub use job::{Job, JobStatus, TimeEntry};
pub use material::{CatalogItem, MaterialDraw, MaterialStatus};
pub use money::{LineItem, LineItemInput, LineKind, Totals};
pub use quote::{Quote, QuoteStatus};
pub use status::{Status, Transition};
pub use tenant::{RequestContext, TenantId};
pub use variation::{Variation, VariationStatus};

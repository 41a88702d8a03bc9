//! JobBuilda - multi-tenant backend for electrical contractors
//!
//! Quotes, jobs, variations, invoices, BS 7671 compliance tests and VAT
//! reporting, each behind a guarded status transition that commits the
//! row change and one outbox event together. A JSON-lines gateway routes
//! tool calls and resource reads to the owning service.

pub mod bus;
pub mod config;
pub mod domain;
pub mod error;
pub mod gateway;
pub mod id;
pub mod services;
pub mod store;

pub use error::{JobBuildaError, Result};

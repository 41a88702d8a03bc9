//! Gateway - the single entry point clients talk to
//!
//! This module provides:
//! - Message types for requests, responses and event notifications
//! - The tool/resource catalog built from registered services
//! - Request dispatch ([`Gateway`])
//! - Unix socket and stdio transports

pub mod catalog;
pub mod messages;
pub mod router;
pub mod server;

pub use catalog::Catalog;
pub use messages::{ErrorCode, GatewayError, Methods, Notification, Request, Response};
pub use router::Gateway;
pub use server::{GatewayServer, serve_connection, serve_stdio};

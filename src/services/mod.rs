//! Backend services
//!
//! Each service owns one slice of the domain and exposes:
//! - **tools**: named writes taking a JSON `arguments` object
//! - **resources**: reads addressed by `jobbuilda://` URI templates
//!
//! State-changing tools commit the row and exactly one outbox event in a
//! single transaction, then hand the event to the [`Publisher`].

pub mod definition;
pub mod invoicing;
pub mod jobs;
pub mod materials;
pub mod quoting;
pub mod reporting;
pub mod testing;
pub mod uri;
pub mod variations;

use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::Transaction;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::bus::Publisher;
use crate::config::{FinanceConfig, ReportingConfig};
use crate::domain::{EventEnvelope, RequestContext, Status};
use crate::error::{JobBuildaError, Result};
use crate::store::{Database, outbox};

pub use definition::{ResourceTemplate, Tool};
pub use invoicing::InvoicingService;
pub use jobs::JobsService;
pub use materials::MaterialsService;
pub use quoting::QuotingService;
pub use reporting::ReportingService;
pub use testing::TestingService;
pub use uri::{ResourceMatch, ResourceUri};
pub use variations::VariationsService;

/// A backend service registered with the gateway.
#[async_trait]
pub trait Service: Send + Sync {
    /// Service name (e.g., "quoting")
    fn name(&self) -> &'static str;

    /// Tools this service handles
    fn tools(&self) -> Vec<Tool>;

    /// Resource templates this service serves
    fn resources(&self) -> Vec<ResourceTemplate>;

    /// Read a resource whose URI matched one of [`Service::resources`].
    async fn read_resource(&self, ctx: &RequestContext, resource: &ResourceMatch) -> Result<Value>;

    /// Execute one of [`Service::tools`].
    async fn call_tool(&self, ctx: &RequestContext, name: &str, arguments: Value) -> Result<Value>;
}

/// Shared handles every service needs
#[derive(Clone)]
pub struct ServiceDeps {
    pub db: Arc<Database>,
    pub publisher: Publisher,
    pub finance: FinanceConfig,
    pub reporting: ReportingConfig,
}

/// A committed mutation: the row to return and the event describing it.
pub struct Change<T> {
    pub row: T,
    pub event_type: &'static str,
    pub payload: Value,
}

impl<T: Serialize> Change<T> {
    /// Event payload is the serialized row.
    pub fn of(event_type: &'static str, row: T) -> Result<Self> {
        let payload = serde_json::to_value(&row)?;
        Ok(Self {
            row,
            event_type,
            payload,
        })
    }
}

impl ServiceDeps {
    /// Run `f` in a write transaction, enqueue its event alongside, then
    /// publish after commit.
    pub async fn commit<T, F>(&self, ctx: &RequestContext, f: F) -> Result<T>
    where
        T: Send,
        F: FnOnce(&Transaction<'_>) -> Result<Change<T>> + Send,
    {
        let (row, event) = self.db.write(|tx| {
            let change = f(tx)?;
            let event = EventEnvelope::new(change.event_type, ctx, change.payload);
            outbox::enqueue(tx, &event)?;
            Ok((change.row, event))
        })?;
        self.publisher.deliver(&event).await;
        Ok(row)
    }
}

/// Deserialize tool arguments, reporting failures as validation errors.
pub fn parse_args<T: DeserializeOwned>(tool: &str, arguments: Value) -> Result<T> {
    let arguments = if arguments.is_null() {
        Value::Object(Default::default())
    } else {
        arguments
    };
    serde_json::from_value(arguments)
        .map_err(|e| JobBuildaError::validation(format!("invalid arguments for {}: {}", tool, e)))
}

/// Parse an optional `?status=` filter.
pub fn status_filter<S: Status>(resource: &ResourceMatch) -> Result<Option<S>> {
    resource
        .query("status")
        .map(|raw| {
            S::parse(raw).ok_or_else(|| JobBuildaError::validation(format!("unknown {} status '{}'", S::ENTITY, raw)))
        })
        .transpose()
}

/// Reject blank required strings.
pub fn require_text(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(JobBuildaError::validation(format!("{} must not be empty", field)));
    }
    Ok(())
}

/// Serialize a tool or resource result.
pub fn to_json<T: Serialize>(value: &T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

/// Every service wired to one set of dependencies.
pub fn all(deps: &ServiceDeps) -> Vec<Arc<dyn Service>> {
    vec![
        Arc::new(QuotingService::new(deps.clone())),
        Arc::new(InvoicingService::new(deps.clone())),
        Arc::new(JobsService::new(deps.clone())),
        Arc::new(VariationsService::new(deps.clone())),
        Arc::new(MaterialsService::new(deps.clone())),
        Arc::new(TestingService::new(deps.clone())),
        Arc::new(ReportingService::new(deps.clone())),
    ]
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Args {
        quote_id: String,
        #[serde(default)]
        reason: Option<String>,
    }

    #[test]
    fn test_parse_args() {
        let args: Args = parse_args("reject_quote", serde_json::json!({"quote_id": "q1"})).unwrap();
        assert_eq!(args.quote_id, "q1");
        assert!(args.reason.is_none());
    }

    #[test]
    fn test_parse_args_missing_field_is_validation() {
        let err = parse_args::<Args>("reject_quote", Value::Null).unwrap_err();
        assert!(matches!(err, JobBuildaError::Validation(_)));
        assert!(err.to_string().contains("reject_quote"));
    }

    #[test]
    fn test_require_text() {
        assert!(require_text("title", "Rewire").is_ok());
        assert!(require_text("title", "   ").is_err());
    }

    #[test]
    fn test_service_tool_names_are_unique() {
        let deps = test_support::deps();
        let mut names: Vec<String> = all(&deps)
            .iter()
            .flat_map(|s| s.tools())
            .map(|t| t.name)
            .collect();
        let total = names.len();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), total);
    }
}

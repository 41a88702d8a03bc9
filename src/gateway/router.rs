//! Request dispatch: the coordinator every transport feeds.

use std::sync::Arc;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::sync::broadcast;

use crate::bus::{BroadcastBus, EventBus, FanoutBus, JsonlBus, Publisher};
use crate::config::Config;
use crate::domain::{EventEnvelope, RequestContext};
use crate::error::{JobBuildaError, Result};
use crate::gateway::catalog::Catalog;
use crate::gateway::messages::{GatewayError, Methods, Request, Response};
use crate::services::{self, ServiceDeps};
use crate::store::Database;

#[derive(Debug, Deserialize)]
struct ToolCallParams {
    name: String,
    #[serde(default)]
    arguments: Value,
    context: RequestContext,
}

#[derive(Debug, Deserialize)]
struct ResourceReadParams {
    uri: String,
    context: RequestContext,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SubscribeParams {
    pub context: RequestContext,
}

/// Dispatches gateway requests to the service catalog
pub struct Gateway {
    catalog: Catalog,
    events: BroadcastBus,
}

impl Gateway {
    pub fn new(catalog: Catalog, events: BroadcastBus) -> Self {
        Self { catalog, events }
    }

    /// Open the configured database and wire every service to it.
    pub fn from_config(config: &Config) -> Result<Self> {
        let db = Arc::new(Database::open(&config.database.path)?);
        Self::with_database(db, config)
    }

    /// Wire every service to an already-open database.
    pub fn with_database(db: Arc<Database>, config: &Config) -> Result<Self> {
        let events = BroadcastBus::new(config.bus.channel_capacity);
        let bus: Arc<dyn EventBus> = match &config.bus.jsonl_path {
            Some(path) => {
                log::info!("Mirroring events to {}", path.display());
                let buses: Vec<Arc<dyn EventBus>> = vec![Arc::new(events.clone()), Arc::new(JsonlBus::new(path))];
                Arc::new(FanoutBus::new(buses))
            }
            None => Arc::new(events.clone()),
        };

        let deps = ServiceDeps {
            publisher: Publisher::new(Arc::clone(&db), bus),
            db,
            finance: config.finance.clone(),
            reporting: config.reporting.clone(),
        };
        let catalog = Catalog::new(services::all(&deps))?;
        Ok(Self::new(catalog, events))
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Receive every event published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        let rx = self.events.subscribe();
        log::debug!("Event subscribers: {}", self.events.subscriber_count());
        rx
    }

    /// Parse one JSON line and dispatch it.
    pub async fn handle_line(&self, line: &str) -> Response {
        let value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => return Response::error(0, GatewayError::parse_error(format!("Parse error: {}", e))),
        };
        let id = value.get("id").and_then(Value::as_u64).unwrap_or(0);
        match serde_json::from_value::<Request>(value) {
            Ok(request) => self.handle(request).await,
            Err(e) => Response::error(id, GatewayError::invalid_request(format!("Invalid request: {}", e))),
        }
    }

    /// Dispatch a request to its method handler.
    pub async fn handle(&self, request: Request) -> Response {
        log::debug!("Request {} {}", request.id, request.method);
        let result = match request.method.as_str() {
            Methods::INITIALIZE => Ok(self.initialize()),
            Methods::PING => Ok(json!({ "pong": true })),
            Methods::TOOLS_LIST => Ok(json!({ "tools": self.catalog.tools() })),
            Methods::RESOURCES_LIST => Ok(json!({ "resources": self.catalog.resources() })),
            Methods::TOOLS_CALL => self.call_tool(request.params).await,
            Methods::RESOURCES_READ => self.read_resource(request.params).await,
            Methods::SUBSCRIBE => params::<SubscribeParams>(request.params)
                .map(|p| json!({ "subscribed": true, "tenant_id": p.context.tenant_id })),
            other => Err(GatewayError::method_not_found(other)),
        };

        match result {
            Ok(value) => Response::success(request.id, value),
            Err(error) => {
                log::debug!("Request {} failed: {} {}", request.id, error.code, error.message);
                Response::error(request.id, error)
            }
        }
    }

    fn initialize(&self) -> Value {
        let services: Vec<&str> = self.catalog.services().iter().map(|s| s.name()).collect();
        json!({
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "services": services,
            "capabilities": { "tools": true, "resources": true, "subscribe": true },
        })
    }

    async fn call_tool(&self, raw: Value) -> std::result::Result<Value, GatewayError> {
        let p: ToolCallParams = params(raw)?;
        let service = self.catalog.tool(&p.name)?;
        log::info!("{} -> {}.{} for {}", p.context.actor, service.name(), p.name, p.context.tenant_id);
        service.call_tool(&p.context, &p.name, p.arguments).await.map_err(|e| {
            log_failure(&p.name, &e);
            GatewayError::from(&e)
        })
    }

    async fn read_resource(&self, raw: Value) -> std::result::Result<Value, GatewayError> {
        let p: ResourceReadParams = params(raw)?;
        let (service, resource) = self.catalog.resolve(&p.uri)?;
        service.read_resource(&p.context, &resource).await.map_err(|e| {
            log_failure(&p.uri, &e);
            GatewayError::from(&e)
        })
    }
}

fn log_failure(target: &str, err: &JobBuildaError) {
    match err {
        JobBuildaError::NotFound { .. } | JobBuildaError::Conflict { .. } | JobBuildaError::Validation(_) => {
            log::debug!("{} rejected: {}", target, err)
        }
        _ => log::warn!("{} failed: {}", target, err),
    }
}

pub(crate) fn params<T: DeserializeOwned>(raw: Value) -> std::result::Result<T, GatewayError> {
    serde_json::from_value(raw).map_err(|e| GatewayError::invalid_params(format!("Invalid params: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::messages::ErrorCode;

    fn gateway() -> Gateway {
        let db = Arc::new(Database::open_in_memory().unwrap());
        Gateway::with_database(db, &Config::default()).unwrap()
    }

    fn call(id: u64, name: &str, tenant: &str, arguments: Value) -> Request {
        Request::new(
            id,
            Methods::TOOLS_CALL,
            json!({ "name": name, "arguments": arguments, "context": { "tenant_id": tenant, "actor": "sam" } }),
        )
    }

    fn read(id: u64, uri: &str, tenant: &str) -> Request {
        Request::new(id, Methods::RESOURCES_READ, json!({ "uri": uri, "context": { "tenant_id": tenant } }))
    }

    fn code(response: &Response) -> i32 {
        response.error.as_ref().map(|e| e.code).unwrap_or(0)
    }

    #[tokio::test]
    async fn test_initialize_and_ping() {
        let gw = gateway();
        let init = gw.handle(Request::no_params(1, Methods::INITIALIZE)).await;
        assert_eq!(init.id, 1);
        assert_eq!(init.result.unwrap()["services"].as_array().unwrap().len(), 7);

        let pong = gw.handle(Request::no_params(2, Methods::PING)).await;
        assert_eq!(pong.result.unwrap()["pong"], true);
    }

    #[tokio::test]
    async fn test_tools_and_resources_list() {
        let gw = gateway();
        let tools = gw.handle(Request::no_params(1, Methods::TOOLS_LIST)).await.result.unwrap();
        let names: Vec<&str> = tools["tools"].as_array().unwrap().iter().filter_map(|t| t["name"].as_str()).collect();
        assert!(names.contains(&"approve_quote"));
        assert!(names.contains(&"generate_report"));

        let resources = gw.handle(Request::no_params(2, Methods::RESOURCES_LIST)).await.result.unwrap();
        assert!(
            resources["resources"]
                .as_array()
                .unwrap()
                .iter()
                .any(|r| r["uri_template"] == "jobbuilda://invoices/{id}/payments")
        );
    }

    #[tokio::test]
    async fn test_tool_call_and_resource_read() {
        let gw = gateway();
        let created = gw
            .handle(call(
                1,
                "create_quote",
                "acme",
                json!({"client_id": "c1", "title": "Rewire", "items": [{"description": "Labour", "quantity": 2, "unit_price_pence": 5000}]}),
            ))
            .await;
        assert!(created.is_success(), "{:?}", created.error);
        let quote = created.result.unwrap();
        assert_eq!(quote["created_by"], "sam");

        let uri = format!("jobbuilda://quotes/{}", quote["id"].as_str().unwrap());
        let fetched = gw.handle(read(2, &uri, "acme")).await;
        assert_eq!(fetched.result.unwrap()["title"], "Rewire");

        let other_tenant = gw.handle(read(3, &uri, "other")).await;
        assert_eq!(code(&other_tenant), ErrorCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_error_codes() {
        let gw = gateway();

        let unknown_method = gw.handle(Request::no_params(1, "loop.list")).await;
        assert_eq!(code(&unknown_method), ErrorCode::METHOD_NOT_FOUND);

        let unknown_tool = gw.handle(call(2, "launch_rocket", "acme", json!({}))).await;
        assert_eq!(code(&unknown_tool), ErrorCode::METHOD_NOT_FOUND);

        let unknown_resource = gw.handle(read(3, "jobbuilda://rockets", "acme")).await;
        assert_eq!(code(&unknown_resource), ErrorCode::METHOD_NOT_FOUND);

        let missing_context = gw
            .handle(Request::new(4, Methods::TOOLS_CALL, json!({"name": "send_quote", "arguments": {}})))
            .await;
        assert_eq!(code(&missing_context), ErrorCode::INVALID_PARAMS);

        let blank_tenant = gw.handle(read(5, "jobbuilda://quotes", "  ")).await;
        assert_eq!(code(&blank_tenant), ErrorCode::INVALID_PARAMS);

        let bad_args = gw.handle(call(6, "send_quote", "acme", json!({}))).await;
        assert_eq!(code(&bad_args), ErrorCode::INVALID_PARAMS);

        let missing = gw.handle(call(7, "send_quote", "acme", json!({"quote_id": "nope"}))).await;
        assert_eq!(code(&missing), ErrorCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_conflict_maps_to_invalid_state() {
        let gw = gateway();
        let quote = gw
            .handle(call(
                1,
                "create_quote",
                "acme",
                json!({"client_id": "c1", "title": "EICR", "items": [{"description": "Inspection", "quantity": 1, "unit_price_pence": 15000}]}),
            ))
            .await
            .result
            .unwrap();
        let id = quote["id"].as_str().unwrap();

        let approve = gw.handle(call(2, "approve_quote", "acme", json!({"quote_id": id}))).await;
        assert_eq!(code(&approve), ErrorCode::INVALID_STATE);
        assert_eq!(approve.error.unwrap().data.unwrap()["status"], "draft");
    }

    #[tokio::test]
    async fn test_handle_line_parse_and_shape_errors() {
        let gw = gateway();

        let garbage = gw.handle_line("{not json").await;
        assert_eq!(garbage.id, 0);
        assert_eq!(code(&garbage), ErrorCode::PARSE_ERROR);

        let no_method = gw.handle_line(r#"{"id": 9}"#).await;
        assert_eq!(no_method.id, 9);
        assert_eq!(code(&no_method), ErrorCode::INVALID_REQUEST);

        let ok = gw.handle_line(r#"{"id": 10, "method": "ping"}"#).await;
        assert!(ok.is_success());
    }

    #[tokio::test]
    async fn test_subscribe_receives_committed_events() {
        let gw = gateway();
        let mut rx = gw.subscribe();
        let ack = gw
            .handle(Request::new(1, Methods::SUBSCRIBE, json!({"context": {"tenant_id": "acme"}})))
            .await;
        assert_eq!(ack.result.unwrap()["tenant_id"], "acme");

        gw.handle(call(
            2,
            "record_expense",
            "acme",
            json!({"supplier": "CEF", "description": "Cable", "net_pence": 1000, "vat_pence": 200, "incurred_on": "2024-05-01"}),
        ))
        .await;
        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type, "expense.recorded");
        assert_eq!(event.tenant_id.as_str(), "acme");
        assert_eq!(event.actor, "sam");
    }
}

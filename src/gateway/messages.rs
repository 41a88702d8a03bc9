//! Gateway message types.
//!
//! JSON Lines (newline-delimited JSON) over a Unix stream socket or stdio.
//! The schema borrows JSON-RPC field names (id, method, params, result,
//! error) but does NOT implement JSON-RPC 2.0.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::EventEnvelope;
use crate::error::JobBuildaError;

/// Request sent from a client to the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Correlates the response; echoed back unchanged.
    pub id: u64,
    /// Method name (e.g., "tools/call").
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl Request {
    pub fn new(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self {
            id,
            method: method.into(),
            params,
        }
    }

    pub fn no_params(id: u64, method: impl Into<String>) -> Self {
        Self::new(id, method, Value::Object(Default::default()))
    }
}

/// Response sent from the gateway to a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<GatewayError>,
}

impl Response {
    pub fn success(id: u64, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: u64, error: GatewayError) -> Self {
        Self {
            id,
            result: None,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Error details in a gateway response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl GatewayError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(code: i32, message: impl Into<String>, data: Value) -> Self {
        Self {
            code,
            message: message.into(),
            data: Some(data),
        }
    }

    /// Parse error (-32700).
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::PARSE_ERROR, message)
    }

    /// Invalid request error (-32600).
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::INVALID_REQUEST, message)
    }

    /// Method not found error (-32601).
    pub fn method_not_found(method: impl Into<String>) -> Self {
        Self::new(ErrorCode::METHOD_NOT_FOUND, format!("Unknown method: {}", method.into()))
    }

    /// Invalid params error (-32602).
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::INVALID_PARAMS, message)
    }

    /// Internal error (-32603).
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::INTERNAL_ERROR, message)
    }
}

impl From<&JobBuildaError> for GatewayError {
    fn from(err: &JobBuildaError) -> Self {
        match err {
            JobBuildaError::NotFound { entity, id } => Self::with_data(
                ErrorCode::NOT_FOUND,
                err.to_string(),
                serde_json::json!({ "entity": entity, "id": id }),
            ),
            JobBuildaError::Conflict { entity, id, status, .. } => Self::with_data(
                ErrorCode::INVALID_STATE,
                err.to_string(),
                serde_json::json!({ "entity": entity, "id": id, "status": status }),
            ),
            JobBuildaError::Validation(_) => Self::new(ErrorCode::INVALID_PARAMS, err.to_string()),
            JobBuildaError::UnknownTool(_) | JobBuildaError::UnknownResource(_) => {
                Self::new(ErrorCode::METHOD_NOT_FOUND, err.to_string())
            }
            _ => Self::new(ErrorCode::INTERNAL_ERROR, err.to_string()),
        }
    }
}

impl From<JobBuildaError> for GatewayError {
    fn from(err: JobBuildaError) -> Self {
        Self::from(&err)
    }
}

/// Standard error codes.
pub struct ErrorCode;

impl ErrorCode {
    /// Invalid JSON.
    pub const PARSE_ERROR: i32 = -32700;
    /// Invalid request object.
    pub const INVALID_REQUEST: i32 = -32600;
    /// Unknown method, tool or resource.
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Invalid parameters.
    pub const INVALID_PARAMS: i32 = -32602;
    /// Internal gateway error.
    pub const INTERNAL_ERROR: i32 = -32603;
    /// Entity doesn't exist for the tenant.
    pub const NOT_FOUND: i32 = 1001;
    /// Entity in wrong status for the action.
    pub const INVALID_STATE: i32 = 1002;
}

/// Push notification sent to subscribed clients (no request ID).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    /// Event type (e.g., "invoice.paid").
    pub event: String,
    pub data: Value,
}

impl Notification {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }
}

impl From<&EventEnvelope> for Notification {
    fn from(event: &EventEnvelope) -> Self {
        Self::new(
            event.event_type.clone(),
            serde_json::to_value(event).unwrap_or(Value::Null),
        )
    }
}

/// Known method names as constants.
pub struct Methods;

impl Methods {
    pub const INITIALIZE: &'static str = "initialize";
    pub const PING: &'static str = "ping";
    pub const SUBSCRIBE: &'static str = "subscribe";

    pub const TOOLS_LIST: &'static str = "tools/list";
    pub const TOOLS_CALL: &'static str = "tools/call";

    pub const RESOURCES_LIST: &'static str = "resources/list";
    pub const RESOURCES_READ: &'static str = "resources/read";
}

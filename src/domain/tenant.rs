//! Tenant scope and request context
//!
//! Every row carries a tenant id and every query is filtered by it. The
//! request context travels with each resource read and tool call.

use serde::{Deserialize, Serialize};

use crate::error::{JobBuildaError, Result};

/// Isolation boundary for all data
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TenantId(String);

impl TenantId {
    /// Create a tenant id, rejecting empty or whitespace-only values.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(JobBuildaError::validation("tenant_id must not be empty"));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Wrap a tenant id read back from storage.
    pub(crate) fn from_db(id: String) -> Self {
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for TenantId {
    type Error = JobBuildaError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<TenantId> for String {
    fn from(value: TenantId) -> Self {
        value.0
    }
}

impl std::fmt::Display for TenantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn default_actor() -> String {
    "system".to_string()
}

/// Who is calling, on behalf of which tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestContext {
    pub tenant_id: TenantId,
    #[serde(default = "default_actor")]
    pub actor: String,
}

impl RequestContext {
    pub fn new(tenant_id: TenantId, actor: impl Into<String>) -> Self {
        Self {
            tenant_id,
            actor: actor.into(),
        }
    }
}

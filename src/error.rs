//! Error types for JobBuilda
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

/// All error types that can occur in JobBuilda services
#[derive(Debug, Error)]
pub enum JobBuildaError {
    /// Entity does not exist for the calling tenant
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Entity exists but its current status does not allow the action
    #[error("Cannot {action} {entity} {id}: status is {status}")]
    Conflict {
        entity: &'static str,
        id: String,
        action: String,
        status: String,
    },

    /// Input failed validation
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Storage/persistence error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Message bus publication error
    #[error("Bus error: {0}")]
    Bus(String),

    /// Tool name not registered with any service
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// Resource URI not matched by any service
    #[error("Unknown resource: {0}")]
    UnknownResource(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl JobBuildaError {
    /// Shorthand for a not-found error.
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Shorthand for a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

/// Result type alias for JobBuilda operations
pub type Result<T> = std::result::Result<T, JobBuildaError>;

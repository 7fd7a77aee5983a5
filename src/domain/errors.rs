//! Domain errors for the ModForge orchestrator.

use thiserror::Error;
use uuid::Uuid;

use super::models::ProjectId;

/// Domain-level errors that can occur in the orchestrator.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Project not found: {0}")]
    ProjectNotFound(ProjectId),

    #[error("Build not found: {0}")]
    BuildNotFound(Uuid),

    #[error("File not found: {0}")]
    FileNotFound(Uuid),

    #[error("Pattern not found: {0}")]
    PatternNotFound(Uuid),

    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition { from: String, to: String, reason: String },

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}

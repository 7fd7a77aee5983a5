use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{PatternKind, PatternRecord};

/// Repository port for pattern persistence
///
/// Patterns are never deleted through this port; retention belongs to the
/// storage side.
#[async_trait]
pub trait PatternRepository: Send + Sync {
    /// Insert a new pattern
    async fn insert(&self, pattern: &PatternRecord) -> DomainResult<()>;

    /// Update an existing pattern's usage statistics
    async fn update(&self, pattern: &PatternRecord) -> DomainResult<()>;

    /// Get a pattern by ID
    async fn get(&self, id: Uuid) -> DomainResult<Option<PatternRecord>>;

    /// All patterns of one kind
    async fn list_by_kind(&self, kind: PatternKind) -> DomainResult<Vec<PatternRecord>>;
}

use async_trait::async_trait;

use crate::domain::models::OrchestratorEvent;

/// Port for lifecycle notifications
///
/// Emission must not fail the caller; sinks swallow and log their own errors.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: OrchestratorEvent);
}

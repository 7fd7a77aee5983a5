use async_trait::async_trait;

use crate::domain::models::{FixRequest, GenerationRequest, GenerationResult};
use crate::domain::ports::errors::GenerationError;

/// Port for the external AI code generation service
#[async_trait]
pub trait CodeGenerator: Send + Sync {
    /// Generate a project's sources from a natural-language prompt
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult, GenerationError>;

    /// Produce repaired files for the given compiler errors
    async fn fix(&self, request: &FixRequest) -> Result<GenerationResult, GenerationError>;
}

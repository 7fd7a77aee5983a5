use async_trait::async_trait;

use crate::domain::models::{ProjectFile, ProjectId, VerificationReport};
use crate::domain::ports::errors::VerifierError;

/// Port for the compiler simulation that checks a project's file set
#[async_trait]
pub trait BuildVerifier: Send + Sync {
    /// Verify the files and report errors and warnings
    async fn verify(
        &self,
        project_id: ProjectId,
        files: &[ProjectFile],
    ) -> Result<VerificationReport, VerifierError>;
}

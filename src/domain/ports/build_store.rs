use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Build, BuildUpdate, Project, ProjectFile, ProjectId};

/// Repository port for the project, build and file records the orchestrator touches
#[async_trait]
pub trait BuildStore: Send + Sync {
    /// Get a project by ID
    async fn get_project(&self, id: ProjectId) -> DomainResult<Option<Project>>;

    /// Insert a new build
    async fn create_build(&self, build: &Build) -> DomainResult<()>;

    /// Apply a partial update and return the stored result
    async fn update_build(&self, id: Uuid, update: &BuildUpdate) -> DomainResult<Build>;

    /// Get a build by ID
    async fn get_build(&self, id: Uuid) -> DomainResult<Option<Build>>;

    /// All builds of a project ordered by build number
    async fn list_builds(&self, project_id: ProjectId) -> DomainResult<Vec<Build>>;

    /// Insert a new file
    async fn create_file(&self, file: &ProjectFile) -> DomainResult<()>;

    /// Replace an existing file's content
    async fn update_file(&self, file: &ProjectFile) -> DomainResult<()>;

    /// All files of a project ordered by path
    async fn list_files(&self, project_id: ProjectId) -> DomainResult<Vec<ProjectFile>>;
}

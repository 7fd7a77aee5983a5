use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Build, BuildUpdate, Project, ProjectFile, ProjectId};
use crate::domain::ports::BuildStore;

/// `BuildStore` held entirely in process memory.
#[derive(Default)]
pub struct InMemoryBuildStore {
    projects: RwLock<HashMap<ProjectId, Project>>,
    builds: RwLock<HashMap<Uuid, Build>>,
    files: RwLock<HashMap<Uuid, ProjectFile>>,
}

impl InMemoryBuildStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a project record.
    pub async fn insert_project(&self, project: Project) {
        self.projects.write().await.insert(project.id, project);
    }

    /// Delete a project record, leaving its builds and files behind.
    pub async fn remove_project(&self, id: ProjectId) -> Option<Project> {
        self.projects.write().await.remove(&id)
    }
}

#[async_trait]
impl BuildStore for InMemoryBuildStore {
    async fn get_project(&self, id: ProjectId) -> DomainResult<Option<Project>> {
        Ok(self.projects.read().await.get(&id).cloned())
    }

    async fn create_build(&self, build: &Build) -> DomainResult<()> {
        let mut builds = self.builds.write().await;
        let duplicate = builds
            .values()
            .any(|b| b.project_id == build.project_id && b.build_number == build.build_number);
        if duplicate {
            return Err(DomainError::ValidationFailed(format!(
                "build number {} already exists for project {}",
                build.build_number, build.project_id
            )));
        }
        builds.insert(build.id, build.clone());
        Ok(())
    }

    async fn update_build(&self, id: Uuid, update: &BuildUpdate) -> DomainResult<Build> {
        let mut builds = self.builds.write().await;
        let build = builds.get_mut(&id).ok_or(DomainError::BuildNotFound(id))?;

        // Validate on a copy so a rejected transition leaves the record untouched.
        let mut updated = build.clone();
        updated.apply(update)?;
        *build = updated.clone();
        Ok(updated)
    }

    async fn get_build(&self, id: Uuid) -> DomainResult<Option<Build>> {
        Ok(self.builds.read().await.get(&id).cloned())
    }

    async fn list_builds(&self, project_id: ProjectId) -> DomainResult<Vec<Build>> {
        let builds = self.builds.read().await;
        let mut result: Vec<Build> = builds
            .values()
            .filter(|b| b.project_id == project_id)
            .cloned()
            .collect();
        result.sort_by_key(|b| b.build_number);
        Ok(result)
    }

    async fn create_file(&self, file: &ProjectFile) -> DomainResult<()> {
        self.files.write().await.insert(file.id, file.clone());
        Ok(())
    }

    async fn update_file(&self, file: &ProjectFile) -> DomainResult<()> {
        let mut files = self.files.write().await;
        let existing = files.get_mut(&file.id).ok_or(DomainError::FileNotFound(file.id))?;
        existing.path = file.path.clone();
        existing.content = file.content.clone();
        existing.updated_at = Utc::now();
        Ok(())
    }

    async fn list_files(&self, project_id: ProjectId) -> DomainResult<Vec<ProjectFile>> {
        let files = self.files.read().await;
        let mut result: Vec<ProjectFile> = files
            .values()
            .filter(|f| f.project_id == project_id)
            .cloned()
            .collect();
        result.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(result)
    }
}

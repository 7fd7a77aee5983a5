//! SQLite implementation of the BuildStore.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    AutoFixLevel, Build, BuildStatus, BuildUpdate, ModLoader, Project, ProjectFile, ProjectId,
};
use crate::domain::ports::BuildStore;

use super::{parse_datetime, parse_optional_datetime, parse_uuid};

#[derive(Clone)]
pub struct SqliteBuildStore {
    pool: SqlitePool,
}

impl SqliteBuildStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a project, ignoring `project.id`; returns it with the assigned id.
    pub async fn create_project(&self, project: &Project) -> DomainResult<Project> {
        let result = sqlx::query(
            r#"INSERT INTO projects (name, description, mod_loader, minecraft_version, auto_fix_level)
               VALUES (?, ?, ?, ?, ?)"#,
        )
        .bind(&project.name)
        .bind(&project.description)
        .bind(project.mod_loader.as_str())
        .bind(&project.minecraft_version)
        .bind(project.auto_fix_level.as_str())
        .execute(&self.pool)
        .await?;

        let mut created = project.clone();
        created.id = ProjectId(result.last_insert_rowid());
        Ok(created)
    }

    pub async fn list_projects(&self) -> DomainResult<Vec<Project>> {
        let rows: Vec<ProjectRow> = sqlx::query_as("SELECT * FROM projects ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Delete a project with its builds and files.
    pub async fn delete_project(&self, id: ProjectId) -> DomainResult<bool> {
        let result = sqlx::query("DELETE FROM projects WHERE id = ?")
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl BuildStore for SqliteBuildStore {
    async fn get_project(&self, id: ProjectId) -> DomainResult<Option<Project>> {
        let row: Option<ProjectRow> = sqlx::query_as("SELECT * FROM projects WHERE id = ?")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn create_build(&self, build: &Build) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO builds (id, project_id, build_number, status, error_count, warning_count,
               log, download_ref, automatic, created_at, completed_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(build.id.to_string())
        .bind(build.project_id.0)
        .bind(to_i64(build.build_number)?)
        .bind(build.status.as_str())
        .bind(i64::from(build.error_count))
        .bind(i64::from(build.warning_count))
        .bind(&build.log)
        .bind(&build.download_ref)
        .bind(build.automatic)
        .bind(build.created_at.to_rfc3339())
        .bind(build.completed_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_build(&self, id: Uuid, update: &BuildUpdate) -> DomainResult<Build> {
        let current = self.get_build(id).await?.ok_or(DomainError::BuildNotFound(id))?;
        let mut updated = current.clone();
        updated.apply(update)?;

        // Compare-and-set on the previous status so a concurrent finalize cannot
        // overwrite a build that already went terminal.
        let result = sqlx::query(
            r#"UPDATE builds SET status = ?, error_count = ?, warning_count = ?, log = ?,
               download_ref = ?, completed_at = ?
               WHERE id = ? AND status = ?"#,
        )
        .bind(updated.status.as_str())
        .bind(i64::from(updated.error_count))
        .bind(i64::from(updated.warning_count))
        .bind(&updated.log)
        .bind(&updated.download_ref)
        .bind(updated.completed_at.map(|t| t.to_rfc3339()))
        .bind(id.to_string())
        .bind(current.status.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let latest = self.get_build(id).await?.ok_or(DomainError::BuildNotFound(id))?;
            return Err(DomainError::InvalidStateTransition {
                from: latest.status.as_str().to_string(),
                to: updated.status.as_str().to_string(),
                reason: "build changed concurrently".to_string(),
            });
        }

        Ok(updated)
    }

    async fn get_build(&self, id: Uuid) -> DomainResult<Option<Build>> {
        let row: Option<BuildRow> = sqlx::query_as("SELECT * FROM builds WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn list_builds(&self, project_id: ProjectId) -> DomainResult<Vec<Build>> {
        let rows: Vec<BuildRow> =
            sqlx::query_as("SELECT * FROM builds WHERE project_id = ? ORDER BY build_number")
                .bind(project_id.0)
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn create_file(&self, file: &ProjectFile) -> DomainResult<()> {
        sqlx::query(
            "INSERT INTO project_files (id, project_id, path, content, updated_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(file.id.to_string())
        .bind(file.project_id.0)
        .bind(&file.path)
        .bind(&file.content)
        .bind(file.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_file(&self, file: &ProjectFile) -> DomainResult<()> {
        let result = sqlx::query("UPDATE project_files SET path = ?, content = ?, updated_at = ? WHERE id = ?")
            .bind(&file.path)
            .bind(&file.content)
            .bind(Utc::now().to_rfc3339())
            .bind(file.id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::FileNotFound(file.id));
        }
        Ok(())
    }

    async fn list_files(&self, project_id: ProjectId) -> DomainResult<Vec<ProjectFile>> {
        let rows: Vec<FileRow> =
            sqlx::query_as("SELECT * FROM project_files WHERE project_id = ? ORDER BY path")
                .bind(project_id.0)
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }
}

fn to_i64(n: u64) -> DomainResult<i64> {
    i64::try_from(n).map_err(|_| DomainError::ValidationFailed(format!("value out of range: {n}")))
}

fn to_u32(n: i64) -> DomainResult<u32> {
    u32::try_from(n).map_err(|_| DomainError::SerializationError(format!("invalid count: {n}")))
}

#[derive(sqlx::FromRow)]
struct ProjectRow {
    id: i64,
    name: String,
    description: String,
    mod_loader: String,
    minecraft_version: String,
    auto_fix_level: String,
}

impl TryFrom<ProjectRow> for Project {
    type Error = DomainError;

    fn try_from(row: ProjectRow) -> Result<Self, Self::Error> {
        let mod_loader = ModLoader::from_str(&row.mod_loader)
            .ok_or_else(|| DomainError::SerializationError(format!("Invalid mod loader: {}", row.mod_loader)))?;
        let auto_fix_level = AutoFixLevel::from_str(&row.auto_fix_level).ok_or_else(|| {
            DomainError::SerializationError(format!("Invalid auto-fix level: {}", row.auto_fix_level))
        })?;

        Ok(Project::new(ProjectId(row.id), row.name)
            .with_description(row.description)
            .with_loader(mod_loader, row.minecraft_version)
            .with_auto_fix(auto_fix_level))
    }
}

#[derive(sqlx::FromRow)]
struct BuildRow {
    id: String,
    project_id: i64,
    build_number: i64,
    status: String,
    error_count: i64,
    warning_count: i64,
    log: String,
    download_ref: Option<String>,
    automatic: bool,
    created_at: String,
    completed_at: Option<String>,
}

impl TryFrom<BuildRow> for Build {
    type Error = DomainError;

    fn try_from(row: BuildRow) -> Result<Self, Self::Error> {
        let status = BuildStatus::from_str(&row.status)
            .ok_or_else(|| DomainError::SerializationError(format!("Invalid status: {}", row.status)))?;
        let build_number = u64::try_from(row.build_number)
            .map_err(|_| DomainError::SerializationError(format!("Invalid build number: {}", row.build_number)))?;

        Ok(Build {
            id: parse_uuid(&row.id)?,
            project_id: ProjectId(row.project_id),
            build_number,
            status,
            error_count: to_u32(row.error_count)?,
            warning_count: to_u32(row.warning_count)?,
            log: row.log,
            download_ref: row.download_ref,
            automatic: row.automatic,
            created_at: parse_datetime(&row.created_at)?,
            completed_at: parse_optional_datetime(row.completed_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct FileRow {
    id: String,
    project_id: i64,
    path: String,
    content: String,
    updated_at: String,
}

impl TryFrom<FileRow> for ProjectFile {
    type Error = DomainError;

    fn try_from(row: FileRow) -> Result<Self, Self::Error> {
        Ok(ProjectFile {
            id: parse_uuid(&row.id)?,
            project_id: ProjectId(row.project_id),
            path: row.path,
            content: row.content,
            updated_at: parse_datetime(&row.updated_at)?,
        })
    }
}

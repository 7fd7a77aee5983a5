//! `modforge builds <project>`

use anyhow::{Context, Result};
use serde::Serialize;

use crate::adapters::sqlite::SqliteBuildStore;
use crate::cli::commands::open_database;
use crate::cli::output::{list_table, output, render_list, CommandOutput};
use crate::domain::models::{Build, Config, ProjectId};
use crate::domain::ports::BuildStore;

#[derive(Debug, Serialize)]
pub struct BuildOutput {
    pub id: String,
    pub build_number: u64,
    pub status: String,
    pub error_count: u32,
    pub warning_count: u32,
    pub automatic: bool,
    pub download_ref: Option<String>,
    pub created_at: String,
    pub completed_at: Option<String>,
}

impl From<&Build> for BuildOutput {
    fn from(build: &Build) -> Self {
        Self {
            id: build.id.to_string(),
            build_number: build.build_number,
            status: build.status.as_str().to_string(),
            error_count: build.error_count,
            warning_count: build.warning_count,
            automatic: build.automatic,
            download_ref: build.download_ref.clone(),
            created_at: build.created_at.to_rfc3339(),
            completed_at: build.completed_at.map(|t| t.to_rfc3339()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BuildListOutput {
    pub project_id: i64,
    pub builds: Vec<BuildOutput>,
    pub total: usize,
}

impl CommandOutput for BuildListOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["#", "status", "errors", "warnings", "trigger", "created"]);
        for b in &self.builds {
            table.add_row(vec![
                b.build_number.to_string(),
                b.status.clone(),
                b.error_count.to_string(),
                b.warning_count.to_string(),
                if b.automatic { "auto" } else { "manual" }.to_string(),
                b.created_at.clone(),
            ]);
        }
        render_list("build", &table, self.builds.len())
    }
}

/// Most recent `limit` builds, newest first.
fn latest(mut builds: Vec<Build>, limit: usize) -> Vec<Build> {
    builds.sort_by(|a, b| b.build_number.cmp(&a.build_number));
    builds.truncate(limit);
    builds
}

pub async fn execute(project: i64, limit: usize, config: &Config, json_mode: bool) -> Result<()> {
    let store = SqliteBuildStore::new(open_database(config).await?);
    let project_id = ProjectId(project);

    store
        .get_project(project_id)
        .await?
        .with_context(|| format!("Project {project_id} not found"))?;

    let builds = store
        .list_builds(project_id)
        .await
        .context("Failed to list builds")?;
    let total = builds.len();

    let out = BuildListOutput {
        project_id: project,
        builds: latest(builds, limit).iter().map(BuildOutput::from).collect(),
        total,
    };
    output(&out, json_mode);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latest_orders_newest_first() {
        let builds = (1..=5).map(|n| Build::new(ProjectId(1), n, true)).collect();
        let numbers: Vec<u64> = latest(builds, 3).iter().map(|b| b.build_number).collect();
        assert_eq!(numbers, vec![5, 4, 3]);
    }
}

//! `modforge project add|list`

use anyhow::{Context, Result};
use serde::Serialize;

use crate::adapters::sqlite::SqliteBuildStore;
use crate::cli::commands::open_database;
use crate::cli::output::{list_table, output, render_list, truncate, CommandOutput};
use crate::cli::types::ProjectCommands;
use crate::domain::models::{AutoFixLevel, Config, ModLoader, Project, ProjectId};

#[derive(Debug, Serialize)]
pub struct ProjectOutput {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub mod_loader: String,
    pub minecraft_version: String,
    pub auto_fix_level: String,
}

impl From<&Project> for ProjectOutput {
    fn from(project: &Project) -> Self {
        Self {
            id: project.id.0,
            name: project.name.clone(),
            description: project.description.clone(),
            mod_loader: project.mod_loader.as_str().to_string(),
            minecraft_version: project.minecraft_version.clone(),
            auto_fix_level: project.auto_fix_level.as_str().to_string(),
        }
    }
}

impl CommandOutput for ProjectOutput {
    fn to_human(&self) -> String {
        format!(
            "Project {} created: {} ({} {}, auto-fix {})",
            self.id, self.name, self.mod_loader, self.minecraft_version, self.auto_fix_level
        )
    }
}

#[derive(Debug, Serialize)]
pub struct ProjectListOutput {
    pub projects: Vec<ProjectOutput>,
    pub total: usize,
}

impl CommandOutput for ProjectListOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["id", "name", "loader", "version", "auto-fix", "description"]);
        for p in &self.projects {
            table.add_row(vec![
                p.id.to_string(),
                truncate(&p.name, 24),
                p.mod_loader.clone(),
                p.minecraft_version.clone(),
                p.auto_fix_level.clone(),
                truncate(&p.description, 40),
            ]);
        }
        render_list("project", &table, self.total)
    }
}

pub async fn execute(command: ProjectCommands, config: &Config, json_mode: bool) -> Result<()> {
    let store = SqliteBuildStore::new(open_database(config).await?);

    match command {
        ProjectCommands::Add {
            name,
            description,
            loader,
            minecraft_version,
            auto_fix,
        } => {
            let loader = ModLoader::from_str(&loader)
                .with_context(|| format!("Unknown mod loader '{loader}'"))?;
            let auto_fix = AutoFixLevel::from_str(&auto_fix)
                .with_context(|| format!("Unknown auto-fix level '{auto_fix}'"))?;

            let project = Project::new(ProjectId(0), name)
                .with_description(description)
                .with_loader(loader, minecraft_version)
                .with_auto_fix(auto_fix);
            let created = store
                .create_project(&project)
                .await
                .context("Failed to create project")?;
            output(&ProjectOutput::from(&created), json_mode);
        }
        ProjectCommands::List => {
            let projects = store.list_projects().await.context("Failed to list projects")?;
            let out = ProjectListOutput {
                total: projects.len(),
                projects: projects.iter().map(ProjectOutput::from).collect(),
            };
            output(&out, json_mode);
        }
    }

    Ok(())
}

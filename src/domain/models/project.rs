//! Project domain model.
//!
//! A project is one user's mod: a description to generate from, the loader and
//! game version it targets, and how aggressively failed builds get auto-fixed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Numeric project identifier, as issued by the project store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(pub i64);

impl std::fmt::Display for ProjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ProjectId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Mod loader a project targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ModLoader {
    #[default]
    Forge,
    Fabric,
    Quilt,
    Architectury,
}

impl ModLoader {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Forge => "forge",
            Self::Fabric => "fabric",
            Self::Quilt => "quilt",
            Self::Architectury => "architectury",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "forge" => Some(Self::Forge),
            "fabric" => Some(Self::Fabric),
            "quilt" => Some(Self::Quilt),
            "architectury" => Some(Self::Architectury),
            _ => None,
        }
    }
}

/// How the build cycle reacts to compile errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AutoFixLevel {
    /// Never attempt a fix; the first verification decides the build.
    Off,
    /// Fix once, accepting cached fixes at the standard confidence.
    #[default]
    Balanced,
    /// Fix once, accepting cached fixes at a lower confidence.
    Aggressive,
}

impl AutoFixLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Balanced => "balanced",
            Self::Aggressive => "aggressive",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "off" => Some(Self::Off),
            "balanced" => Some(Self::Balanced),
            "aggressive" => Some(Self::Aggressive),
            _ => None,
        }
    }

    /// Whether failed verifications should be followed by a fix attempt.
    pub fn fixes_enabled(&self) -> bool {
        !matches!(self, Self::Off)
    }
}

/// A mod project, read by the orchestrator and owned by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    /// Natural-language description the initial sources are generated from.
    pub description: String,
    pub mod_loader: ModLoader,
    pub minecraft_version: String,
    pub auto_fix_level: AutoFixLevel,
}

impl Project {
    pub fn new(id: ProjectId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            description: String::new(),
            mod_loader: ModLoader::default(),
            minecraft_version: "1.20.1".to_string(),
            auto_fix_level: AutoFixLevel::default(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_auto_fix(mut self, level: AutoFixLevel) -> Self {
        self.auto_fix_level = level;
        self
    }

    pub fn with_loader(mut self, loader: ModLoader, minecraft_version: impl Into<String>) -> Self {
        self.mod_loader = loader;
        self.minecraft_version = minecraft_version.into();
        self
    }
}

/// A source file belonging to a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectFile {
    pub id: Uuid,
    pub project_id: ProjectId,
    pub path: String,
    pub content: String,
    pub updated_at: DateTime<Utc>,
}

impl ProjectFile {
    pub fn new(project_id: ProjectId, path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            project_id,
            path: path.into(),
            content: content.into(),
            updated_at: Utc::now(),
        }
    }
}

//! Payloads exchanged with the code generation service and the build verifier.

use serde::{Deserialize, Serialize};

use super::project::{ModLoader, Project, ProjectId};

/// A file produced by generation or fix output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedFile {
    pub path: String,
    pub content: String,
}

impl GeneratedFile {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// Request to generate a project's initial sources from its description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub project_id: ProjectId,
    pub prompt: String,
    pub mod_loader: ModLoader,
    pub minecraft_version: String,
}

impl GenerationRequest {
    pub fn for_project(project: &Project) -> Self {
        Self {
            project_id: project.id,
            prompt: project.description.clone(),
            mod_loader: project.mod_loader,
            minecraft_version: project.minecraft_version.clone(),
        }
    }
}

/// Request to repair files given the compiler's errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixRequest {
    pub project_id: ProjectId,
    pub files: Vec<GeneratedFile>,
    pub errors: Vec<CompileError>,
    pub mod_loader: ModLoader,
    pub minecraft_version: String,
}

/// Files and explanation returned by generate/fix.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub files: Vec<GeneratedFile>,
    #[serde(default)]
    pub explanation: String,
}

/// A single compiler diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileError {
    pub file: String,
    #[serde(default)]
    pub line: u32,
    pub message: String,
}

impl CompileError {
    pub fn new(file: impl Into<String>, line: u32, message: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}: {}", self.file, self.line, self.message)
    }
}

/// Outcome of verifying a project's file set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub success: bool,
    #[serde(default)]
    pub errors: Vec<CompileError>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub download_ref: Option<String>,
}

impl VerificationReport {
    pub fn passed() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    pub fn failed(errors: Vec<CompileError>) -> Self {
        Self {
            success: false,
            errors,
            ..Default::default()
        }
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }

    pub fn with_download(mut self, download_ref: impl Into<String>) -> Self {
        self.download_ref = Some(download_ref.into());
        self
    }
}

//! Build domain model.
//!
//! A build records one attempt of the verify/fix/reverify cycle. Builds are
//! append-only: once a build leaves `InProgress` it is never rewritten.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::project::ProjectId;
use crate::domain::errors::{DomainError, DomainResult};

/// Status of a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
    /// Build is created but not yet started
    #[default]
    Queued,
    /// Build cycle is running
    InProgress,
    /// Final verification succeeded
    Success,
    /// Final verification failed or the cycle was aborted
    Failed,
}

impl BuildStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::InProgress => "in_progress",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "queued" => Some(Self::Queued),
            "in_progress" | "inprogress" => Some(Self::InProgress),
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }

    /// Queued or in progress; the states `stop` and a tripped breaker sweep.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Valid transitions from this status.
    pub fn valid_transitions(&self) -> Vec<BuildStatus> {
        match self {
            Self::Queued => vec![Self::InProgress, Self::Failed],
            Self::InProgress => vec![Self::Success, Self::Failed],
            Self::Success | Self::Failed => vec![],
        }
    }

    pub fn can_transition_to(&self, new_status: Self) -> bool {
        self.valid_transitions().contains(&new_status)
    }
}

impl std::fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded build attempt for a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Build {
    pub id: Uuid,
    pub project_id: ProjectId,
    /// Strictly increasing per project, assigned by the scheduler.
    pub build_number: u64,
    pub status: BuildStatus,
    pub error_count: u32,
    pub warning_count: u32,
    pub log: String,
    pub download_ref: Option<String>,
    /// True when triggered by the scheduler rather than a user.
    pub automatic: bool,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Build {
    /// Create a queued build.
    pub fn new(project_id: ProjectId, build_number: u64, automatic: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            project_id,
            build_number,
            status: BuildStatus::Queued,
            error_count: 0,
            warning_count: 0,
            log: String::new(),
            download_ref: None,
            automatic,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Create a build that is already running.
    pub fn started(project_id: ProjectId, build_number: u64, automatic: bool) -> Self {
        let mut build = Self::new(project_id, build_number, automatic);
        build.status = BuildStatus::InProgress;
        build
    }

    /// Transition to a new status, stamping completion on terminal states.
    pub fn transition_to(&mut self, new_status: BuildStatus) -> DomainResult<()> {
        if !self.status.can_transition_to(new_status) {
            return Err(DomainError::InvalidStateTransition {
                from: self.status.as_str().to_string(),
                to: new_status.as_str().to_string(),
                reason: format!("build {} #{}", self.project_id, self.build_number),
            });
        }

        self.status = new_status;
        if new_status.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Apply a partial update. Status changes are validated and terminal
    /// builds reject every update.
    pub fn apply(&mut self, update: &BuildUpdate) -> DomainResult<()> {
        if self.status.is_terminal() {
            return Err(DomainError::InvalidStateTransition {
                from: self.status.as_str().to_string(),
                to: update.status.unwrap_or(self.status).as_str().to_string(),
                reason: format!("build {} #{} is already finished", self.project_id, self.build_number),
            });
        }
        if let Some(status) = update.status {
            if status != self.status {
                self.transition_to(status)?;
            }
        }
        if let Some(errors) = update.error_count {
            self.error_count = errors;
        }
        if let Some(warnings) = update.warning_count {
            self.warning_count = warnings;
        }
        if let Some(ref log) = update.log {
            self.log = log.clone();
        }
        if let Some(ref line) = update.append_log {
            if !self.log.is_empty() && !self.log.ends_with('\n') {
                self.log.push('\n');
            }
            self.log.push_str(line);
        }
        if let Some(ref download) = update.download_ref {
            self.download_ref = Some(download.clone());
        }
        Ok(())
    }
}

/// Partial update for a build record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildUpdate {
    pub status: Option<BuildStatus>,
    pub error_count: Option<u32>,
    pub warning_count: Option<u32>,
    /// Replace the whole log.
    pub log: Option<String>,
    /// Append a line to the log.
    pub append_log: Option<String>,
    pub download_ref: Option<String>,
}

impl BuildUpdate {
    /// Mark a build failed with an explanatory log line.
    pub fn failed(note: impl Into<String>) -> Self {
        Self {
            status: Some(BuildStatus::Failed),
            append_log: Some(note.into()),
            ..Default::default()
        }
    }
}

//! Lifecycle events emitted by the orchestrator for external alerting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::project::ProjectId;

/// An orchestrator lifecycle event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrchestratorEvent {
    /// Continuous builds started for a project.
    Started {
        project_id: ProjectId,
        interval_ms: u64,
        at: DateTime<Utc>,
    },
    /// Continuous builds stopped for a project.
    Stopped {
        project_id: ProjectId,
        reason: String,
        at: DateTime<Utc>,
    },
    /// A build cycle reached a terminal status.
    BuildCompleted {
        project_id: ProjectId,
        build_id: Uuid,
        build_number: u64,
        success: bool,
        error_count: u32,
        warning_count: u32,
        fixed_from_pattern: bool,
        at: DateTime<Utc>,
    },
    /// A build cycle failed with an error.
    Error {
        project_id: ProjectId,
        message: String,
        classification: String,
        at: DateTime<Utc>,
    },
    /// The project's circuit breaker tripped; automatic builds are suspended.
    CircuitTripped {
        project_id: ProjectId,
        failure_count: u32,
        retry_after_secs: u64,
        at: DateTime<Utc>,
    },
    /// The watchdog restarted a stalled project.
    WatchdogRestart {
        project_id: ProjectId,
        stalled_for_secs: i64,
        success: bool,
        at: DateTime<Utc>,
    },
}

impl OrchestratorEvent {
    /// Project the event concerns.
    pub fn project_id(&self) -> ProjectId {
        match self {
            Self::Started { project_id, .. }
            | Self::Stopped { project_id, .. }
            | Self::BuildCompleted { project_id, .. }
            | Self::Error { project_id, .. }
            | Self::CircuitTripped { project_id, .. }
            | Self::WatchdogRestart { project_id, .. } => *project_id,
        }
    }

    /// Short type name, matching the serialized tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Started { .. } => "started",
            Self::Stopped { .. } => "stopped",
            Self::BuildCompleted { .. } => "build_completed",
            Self::Error { .. } => "error",
            Self::CircuitTripped { .. } => "circuit_tripped",
            Self::WatchdogRestart { .. } => "watchdog_restart",
        }
    }
}

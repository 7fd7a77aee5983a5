//! Domain models for the build orchestrator.

pub mod build;
pub mod config;
pub mod event;
pub mod generation;
pub mod pattern;
pub mod project;

pub use build::{Build, BuildStatus, BuildUpdate};
pub use config::{
    BackoffConfig, CircuitBreakerConfig, Config, DatabaseConfig, LoggingConfig, PatternConfig,
    SchedulerConfig, ServiceConfig, WatchdogConfig,
};
pub use event::OrchestratorEvent;
pub use generation::{
    CompileError, FixRequest, GeneratedFile, GenerationRequest, GenerationResult,
    VerificationReport,
};
pub use pattern::{PatternKind, PatternRecord, PatternRequest};
pub use project::{AutoFixLevel, ModLoader, Project, ProjectFile, ProjectId};

//! ModForge - continuous build orchestrator for AI-generated Minecraft mods
//!
//! Each registered project is built on a timer: sources are generated once,
//! then every cycle verifies them, optionally repairs compile errors (reusing
//! earlier fixes through a similarity-matched pattern cache) and records the
//! outcome as a numbered build. Consecutive failures trip a per-project circuit
//! breaker, transient failures are retried with exponential backoff, and a
//! watchdog restarts projects that stop making progress.
//!
//! # Architecture
//!
//! - **Domain Layer** (`domain`): models, errors and the ports the services use
//! - **Service Layer** (`services`): build cycle, scheduler, breaker, cache, watchdog
//! - **Adapters** (`adapters`): SQLite, in-memory and HTTP implementations of the ports
//! - **Infrastructure Layer** (`infrastructure`): configuration and logging
//! - **CLI Layer** (`cli`): the `modforge` command

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

pub use domain::models::{Build, BuildStatus, Config, Project, ProjectId};
pub use domain::ports::{BuildStore, BuildVerifier, CodeGenerator, EventSink, PatternRepository};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{BuildCycle, CircuitBreakerService, PatternCache, Scheduler, Watchdog};

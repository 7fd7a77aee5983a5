//! CLI command implementations.

pub mod builds;
pub mod config;
pub mod patterns;
pub mod project;
pub mod run;

use anyhow::{Context, Result};
use sqlx::SqlitePool;

use crate::adapters::sqlite::initialize_database;
use crate::domain::models::Config;

/// Open and migrate the configured database.
pub(crate) async fn open_database(config: &Config) -> Result<SqlitePool> {
    initialize_database(&config.database)
        .await
        .with_context(|| format!("Failed to open database at {}", config.database.path))
}

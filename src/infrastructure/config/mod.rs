//! Configuration loading.
//!
//! Defaults, then `.modforge/config.yaml`, then `MODFORGE_*` environment
//! variables, merged with figment and validated before use.

pub mod loader;

pub use loader::{ConfigError, ConfigLoader};

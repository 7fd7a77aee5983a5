//! Domain layer for the ModForge build orchestrator
//!
//! This module contains core business models, errors and the ports the
//! orchestrator depends on.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult};

//! In-memory adapters, used by tests and for dry runs without a database.

pub mod build_store;
pub mod pattern_repository;

pub use build_store::InMemoryBuildStore;
pub use pattern_repository::InMemoryPatternRepository;

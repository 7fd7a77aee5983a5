//! Port trait definitions (Hexagonal Architecture)
//!
//! This module defines async trait interfaces that adapters must implement:
//! - BuildStore: project, build and file records
//! - PatternRepository: learned generation/fix patterns
//! - CodeGenerator: the external AI generation service
//! - BuildVerifier: the external compiler simulation
//! - EventSink: lifecycle notifications

pub mod build_store;
pub mod build_verifier;
pub mod code_generator;
pub mod errors;
pub mod event_sink;
pub mod pattern_repository;

pub use build_store::BuildStore;
pub use build_verifier::BuildVerifier;
pub use code_generator::CodeGenerator;
pub use errors::{GenerationError, VerifierError};
pub use event_sink::EventSink;
pub use pattern_repository::PatternRepository;

//! Orchestration services: the build cycle and everything that keeps it
//! running safely.

pub mod backoff;
pub mod build_cycle;
pub mod circuit_breaker;
pub mod error_classifier;
pub mod event_bus;
pub mod pattern_cache;
pub mod scheduler;
pub mod similarity;
pub mod watchdog;

pub use backoff::BackoffPolicy;
pub use build_cycle::{BuildCycle, CycleOutcome};
pub use circuit_breaker::{AllowDecision, CircuitBreakerService, CircuitBreakerState, FailureOutcome};
pub use error_classifier::{classify, CycleError, CycleErrorKind, ErrorCategory, ErrorClass};
pub use event_bus::{EventBus, EventBusConfig, SequencedEvent};
pub use pattern_cache::{LookupResult, PatternCache, PatternCacheStats, PatternMatch};
pub use scheduler::{
    LivenessEntry, ScheduleResult, Scheduler, SchedulerPhase, SchedulerStatistics, ShutdownReport,
};
pub use similarity::{extract_key_terms, SimilarityScorer, WeightedOverlapScorer};
pub use watchdog::{Watchdog, WatchdogHandle, WatchdogReport, WatchdogStatus};

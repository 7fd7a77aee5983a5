//! Per-project circuit breaker.
//!
//! Counts consecutive failed build cycles per project. Once the count reaches
//! the threshold the breaker trips and freezes: automatic builds are refused
//! until the cooldown has elapsed, after which the breaker clears itself. A
//! single successful cycle fully resets the project.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::models::{CircuitBreakerConfig, ProjectId};

/// Breaker state for one project.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CircuitBreakerState {
    /// Consecutive failures since the last success.
    pub failure_count: u32,
    /// Set while the breaker is tripped.
    pub tripped_at: Option<DateTime<Utc>>,
    /// Times this breaker has tripped since it was created or manually reset.
    pub trip_count: u32,
}

impl CircuitBreakerState {
    pub fn is_tripped(&self) -> bool {
        self.tripped_at.is_some()
    }

    /// Decide whether work may run at `now`, clearing an expired trip.
    fn evaluate(&mut self, now: DateTime<Utc>, cooldown: Duration) -> AllowDecision {
        let Some(tripped_at) = self.tripped_at else {
            return AllowDecision::allowed();
        };

        let elapsed = now - tripped_at;
        if elapsed >= cooldown {
            self.failure_count = 0;
            self.tripped_at = None;
            return AllowDecision::allowed();
        }

        let remaining = (cooldown - elapsed).num_seconds().max(0);
        #[allow(clippy::cast_sign_loss)]
        AllowDecision::blocked(remaining as u64)
    }

    /// Count a failure; returns true when this failure tripped the breaker.
    fn record_failure(&mut self, now: DateTime<Utc>, threshold: u32) -> bool {
        if self.is_tripped() {
            // Frozen until the cooldown clears it.
            return false;
        }

        self.failure_count += 1;
        if self.failure_count >= threshold {
            self.tripped_at = Some(now);
            self.trip_count += 1;
            return true;
        }
        false
    }

    fn record_success(&mut self) {
        self.failure_count = 0;
        self.tripped_at = None;
    }

    fn reset(&mut self) -> bool {
        let changed = self.failure_count != 0 || self.tripped_at.is_some() || self.trip_count != 0;
        *self = Self::default();
        changed
    }
}

/// Result of a breaker check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AllowDecision {
    pub allowed: bool,
    /// Remaining cooldown when blocked.
    pub retry_after_secs: Option<u64>,
}

impl AllowDecision {
    fn allowed() -> Self {
        Self {
            allowed: true,
            retry_after_secs: None,
        }
    }

    fn blocked(retry_after_secs: u64) -> Self {
        Self {
            allowed: false,
            retry_after_secs: Some(retry_after_secs),
        }
    }
}

/// Result of recording a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureOutcome {
    /// True only for the failure that tripped the breaker.
    pub tripped: bool,
    pub failure_count: u32,
}

/// Statistics for one project's breaker.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitStats {
    pub project_id: ProjectId,
    pub state: &'static str,
    pub failure_count: u32,
    pub trip_count: u32,
    pub tripped_at: Option<DateTime<Utc>>,
}

/// Format a cooldown as `1h 0m`, `59m 40s` or `12s`.
pub fn format_cooldown(secs: u64) -> String {
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;
    if hours > 0 {
        format!("{hours}h {minutes}m")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}

/// Service owning every project's breaker.
pub struct CircuitBreakerService {
    config: CircuitBreakerConfig,
    circuits: Arc<RwLock<HashMap<ProjectId, CircuitBreakerState>>>,
}

impl CircuitBreakerService {
    /// Create a new circuit breaker service.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            circuits: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Create with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }

    fn cooldown(&self) -> Duration {
        Duration::seconds(i64::try_from(self.config.cooldown_secs).unwrap_or(i64::MAX))
    }

    /// Check whether automatic work may run for the project.
    pub async fn allow(&self, project_id: ProjectId) -> AllowDecision {
        self.allow_at(project_id, Utc::now()).await
    }

    /// Check at an explicit point in time.
    pub async fn allow_at(&self, project_id: ProjectId, now: DateTime<Utc>) -> AllowDecision {
        let mut circuits = self.circuits.write().await;
        match circuits.get_mut(&project_id) {
            Some(state) => {
                let was_tripped = state.is_tripped();
                let decision = state.evaluate(now, self.cooldown());
                if was_tripped && decision.allowed {
                    tracing::info!(project_id = %project_id, "Circuit breaker cooldown elapsed, closing");
                }
                decision
            }
            None => AllowDecision::allowed(),
        }
    }

    /// Record a successful cycle; clears failures and any trip.
    pub async fn record_success(&self, project_id: ProjectId) {
        let mut circuits = self.circuits.write().await;
        if let Some(state) = circuits.get_mut(&project_id) {
            if state.failure_count > 0 || state.is_tripped() {
                tracing::debug!(project_id = %project_id, "Circuit breaker reset by success");
            }
            state.record_success();
        }
    }

    /// Record a failed cycle.
    pub async fn record_failure(&self, project_id: ProjectId) -> FailureOutcome {
        let mut circuits = self.circuits.write().await;
        let state = circuits.entry(project_id).or_default();
        let tripped = state.record_failure(Utc::now(), self.config.failure_threshold);

        if tripped {
            tracing::warn!(
                project_id = %project_id,
                failures = state.failure_count,
                cooldown_secs = self.config.cooldown_secs,
                "Circuit breaker tripped"
            );
        }

        FailureOutcome {
            tripped,
            failure_count: state.failure_count,
        }
    }

    /// Manually reset a project's breaker; returns whether anything changed.
    pub async fn reset(&self, project_id: ProjectId) -> bool {
        let mut circuits = self.circuits.write().await;
        circuits
            .get_mut(&project_id)
            .is_some_and(CircuitBreakerState::reset)
    }

    /// Current state, if the project has one.
    pub async fn snapshot(&self, project_id: ProjectId) -> Option<CircuitBreakerState> {
        let circuits = self.circuits.read().await;
        circuits.get(&project_id).cloned()
    }

    /// Seed a project's state.
    pub async fn restore(&self, project_id: ProjectId, state: CircuitBreakerState) {
        let mut circuits = self.circuits.write().await;
        circuits.insert(project_id, state);
    }

    /// Human-readable refusal for a blocked start.
    pub async fn cooldown_message(&self, project_id: ProjectId, retry_after_secs: u64) -> String {
        let failures = self
            .snapshot(project_id)
            .await
            .map_or(self.config.failure_threshold, |s| s.failure_count);
        format!(
            "Circuit breaker open for project {project_id} after {failures} consecutive failures; retry in {}",
            format_cooldown(retry_after_secs)
        )
    }

    /// Get statistics for all breakers.
    pub async fn stats(&self) -> Vec<CircuitStats> {
        let circuits = self.circuits.read().await;
        let mut stats: Vec<_> = circuits
            .iter()
            .map(|(project_id, s)| CircuitStats {
                project_id: *project_id,
                state: if s.is_tripped() { "open" } else { "closed" },
                failure_count: s.failure_count,
                trip_count: s.trip_count,
                tripped_at: s.tripped_at,
            })
            .collect();
        stats.sort_by_key(|s| s.project_id);
        stats
    }

    /// Get configuration.
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROJECT: ProjectId = ProjectId(1);

    #[test]
    fn test_config_default() {
        let config = CircuitBreakerConfig::default();
        assert_eq!(config.failure_threshold, 5);
        assert_eq!(config.cooldown_secs, 3600);
    }

    #[tokio::test]
    async fn test_trips_after_threshold() {
        let service = CircuitBreakerService::with_defaults();

        for i in 1..5 {
            let outcome = service.record_failure(PROJECT).await;
            assert!(!outcome.tripped);
            assert_eq!(outcome.failure_count, i);
            assert!(service.allow(PROJECT).await.allowed);
        }

        let outcome = service.record_failure(PROJECT).await;
        assert!(outcome.tripped);

        let decision = service.allow(PROJECT).await;
        assert!(!decision.allowed);
        let retry_after = decision.retry_after_secs.unwrap();
        assert!((3595..=3600).contains(&retry_after), "got {retry_after}");
    }

    #[tokio::test]
    async fn test_tripped_breaker_is_frozen() {
        let service = CircuitBreakerService::with_defaults();
        for _ in 0..5 {
            service.record_failure(PROJECT).await;
        }
        let tripped_at = service.snapshot(PROJECT).await.unwrap().tripped_at;

        let outcome = service.record_failure(PROJECT).await;
        assert!(!outcome.tripped);
        assert_eq!(outcome.failure_count, 5);

        let state = service.snapshot(PROJECT).await.unwrap();
        assert_eq!(state.tripped_at, tripped_at);
        assert_eq!(state.trip_count, 1);
    }

    #[tokio::test]
    async fn test_success_resets_count() {
        let service = CircuitBreakerService::with_defaults();
        for _ in 0..4 {
            service.record_failure(PROJECT).await;
        }
        service.record_success(PROJECT).await;
        assert_eq!(service.snapshot(PROJECT).await.unwrap().failure_count, 0);

        // Needs a full run of five again
        for _ in 0..4 {
            assert!(!service.record_failure(PROJECT).await.tripped);
        }
        assert!(service.record_failure(PROJECT).await.tripped);
    }

    #[tokio::test]
    async fn test_auto_clear_after_cooldown() {
        let service = CircuitBreakerService::with_defaults();
        service
            .restore(
                PROJECT,
                CircuitBreakerState {
                    failure_count: 5,
                    tripped_at: Some(Utc::now() - Duration::seconds(3601)),
                    trip_count: 1,
                },
            )
            .await;

        let decision = service.allow(PROJECT).await;
        assert!(decision.allowed);
        assert_eq!(decision.retry_after_secs, None);

        let state = service.snapshot(PROJECT).await.unwrap();
        assert_eq!(state.failure_count, 0);
        assert!(state.tripped_at.is_none());
    }

    #[tokio::test]
    async fn test_allow_at_reports_remaining_cooldown() {
        let service = CircuitBreakerService::with_defaults();
        let tripped_at = Utc::now();
        service
            .restore(
                PROJECT,
                CircuitBreakerState {
                    failure_count: 5,
                    tripped_at: Some(tripped_at),
                    trip_count: 1,
                },
            )
            .await;

        let decision = service
            .allow_at(PROJECT, tripped_at + Duration::seconds(20))
            .await;
        assert!(!decision.allowed);
        assert_eq!(decision.retry_after_secs, Some(3580));
    }

    #[tokio::test]
    async fn test_reset_is_idempotent() {
        let service = CircuitBreakerService::with_defaults();
        assert!(!service.reset(PROJECT).await);

        service.record_failure(PROJECT).await;
        assert!(service.reset(PROJECT).await);
        assert!(!service.reset(PROJECT).await);
    }

    #[tokio::test]
    async fn test_projects_are_independent() {
        let service = CircuitBreakerService::new(CircuitBreakerConfig {
            failure_threshold: 2,
            ..Default::default()
        });

        service.record_failure(ProjectId(1)).await;
        service.record_failure(ProjectId(1)).await;
        service.record_failure(ProjectId(2)).await;

        assert!(!service.allow(ProjectId(1)).await.allowed);
        assert!(service.allow(ProjectId(2)).await.allowed);

        let stats = service.stats().await;
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].state, "open");
        assert_eq!(stats[1].state, "closed");
    }

    #[tokio::test]
    async fn test_cooldown_message() {
        let service = CircuitBreakerService::with_defaults();
        for _ in 0..5 {
            service.record_failure(PROJECT).await;
        }
        let message = service.cooldown_message(PROJECT, 3580).await;
        assert_eq!(
            message,
            "Circuit breaker open for project 1 after 5 consecutive failures; retry in 59m 40s"
        );
    }

    #[test]
    fn test_format_cooldown() {
        assert_eq!(format_cooldown(3600), "1h 0m");
        assert_eq!(format_cooldown(3580), "59m 40s");
        assert_eq!(format_cooldown(12), "12s");
    }
}

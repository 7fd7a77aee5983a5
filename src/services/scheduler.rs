//! Continuous build scheduler.
//!
//! Each running project owns one loop task that runs an immediate build
//! cycle, then one per interval tick. Ticks and transient retries execute
//! sequentially inside that task, so two cycles of the same project never
//! overlap. Every start gets a fresh epoch; a task whose epoch is no longer
//! the project's current one exits without acting on its results.
//!
//! A per-project async lock, kept across restarts, serializes build-number
//! allocation and the cycle body so that a restarted loop cannot race a
//! cycle that is still finishing.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::domain::errors::DomainError;
use crate::domain::models::{BuildUpdate, OrchestratorEvent, ProjectId, SchedulerConfig};
use crate::services::backoff::BackoffPolicy;
use crate::services::build_cycle::BuildCycle;
use crate::services::circuit_breaker::{CircuitBreakerService, CircuitBreakerState};
use crate::services::error_classifier::{classify, CycleError, ErrorClass};

/// Where a project's loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerPhase {
    /// Between cycles with nothing armed (only momentarily, after a cycle).
    Idle,
    /// Waiting for the next tick.
    Scheduled,
    /// A build cycle is executing.
    Running,
    /// Sleeping before retrying a transient failure.
    BackoffWait,
}

impl SchedulerPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Scheduled => "scheduled",
            Self::Running => "running",
            Self::BackoffWait => "backoff_wait",
        }
    }
}

/// Result of `start`, `stop` and `restart`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduleResult {
    pub success: bool,
    pub message: Option<String>,
}

impl ScheduleResult {
    fn ok() -> Self {
        Self {
            success: true,
            message: None,
        }
    }

    fn ok_with(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
        }
    }

    fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }
}

/// Snapshot of one running project.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatistics {
    pub project_id: ProjectId,
    pub phase: SchedulerPhase,
    pub interval_ms: u64,
    pub epoch: u64,
    pub started_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    /// Highest build number allocated so far.
    pub build_counter: u64,
    pub retry_attempt: u32,
    pub cycles: u64,
    pub successes: u64,
    pub failures: u64,
    pub retries: u64,
    pub circuit: Option<CircuitBreakerState>,
}

/// What the watchdog needs to judge liveness.
#[derive(Debug, Clone, Copy)]
pub struct LivenessEntry {
    pub project_id: ProjectId,
    pub last_activity: DateTime<Utc>,
    pub phase: SchedulerPhase,
    pub interval: Duration,
    pub epoch: u64,
}

/// Outcome of `shutdown_all`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ShutdownReport {
    pub stopped: Vec<ProjectId>,
    pub failed: Vec<(ProjectId, String)>,
}

struct SchedulerEntry {
    phase: SchedulerPhase,
    interval: Duration,
    epoch: u64,
    started_at: DateTime<Utc>,
    last_activity: DateTime<Utc>,
    build_counter: u64,
    retry_attempt: u32,
    cycles: u64,
    successes: u64,
    failures: u64,
    retries: u64,
    stop_tx: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

struct SchedulerInner {
    cycle: BuildCycle,
    breaker: Arc<CircuitBreakerService>,
    backoff: BackoffPolicy,
    config: SchedulerConfig,
    entries: RwLock<HashMap<ProjectId, SchedulerEntry>>,
    cycle_locks: RwLock<HashMap<ProjectId, Arc<Mutex<()>>>>,
    next_epoch: AtomicU64,
}

/// Per-project continuous build scheduler. Cheap to clone.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl Scheduler {
    pub fn new(
        cycle: BuildCycle,
        breaker: Arc<CircuitBreakerService>,
        backoff: BackoffPolicy,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                cycle,
                breaker,
                backoff,
                config,
                entries: RwLock::new(HashMap::new()),
                cycle_locks: RwLock::new(HashMap::new()),
                next_epoch: AtomicU64::new(0),
            }),
        }
    }

    pub fn breaker(&self) -> &Arc<CircuitBreakerService> {
        &self.inner.breaker
    }

    pub fn default_interval(&self) -> Duration {
        Duration::from_millis(self.inner.config.default_interval_ms)
    }

    /// Start continuous builds for a project.
    ///
    /// `interval` defaults to the configured interval.
    pub async fn start(&self, project_id: ProjectId, interval: Option<Duration>) -> ScheduleResult {
        let interval = interval.unwrap_or_else(|| self.default_interval());
        if interval.is_zero() {
            return ScheduleResult::rejected("Interval must be greater than zero");
        }

        if self.is_running(project_id).await {
            return ScheduleResult::rejected(format!(
                "Continuous builds already running for project {project_id}"
            ));
        }

        let decision = self.inner.breaker.allow(project_id).await;
        if !decision.allowed {
            let retry_after = decision.retry_after_secs.unwrap_or_default();
            let message = self.inner.breaker.cooldown_message(project_id, retry_after).await;
            tracing::warn!(project_id = %project_id, retry_after_secs = retry_after, "Start refused by circuit breaker");
            return ScheduleResult::rejected(message);
        }

        let store = self.inner.cycle.store();
        match store.get_project(project_id).await {
            Ok(Some(_)) => {}
            Ok(None) => return ScheduleResult::rejected(format!("Project {project_id} not found")),
            Err(e) => return ScheduleResult::rejected(format!("Failed to load project {project_id}: {e}")),
        }
        let seed = match store.list_builds(project_id).await {
            Ok(builds) => builds.iter().map(|b| b.build_number).max().unwrap_or(0),
            Err(e) => return ScheduleResult::rejected(format!("Failed to load builds for project {project_id}: {e}")),
        };

        let epoch = self.inner.next_epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let (stop_tx, stop_rx) = watch::channel(false);
        let now = Utc::now();

        {
            let mut entries = self.inner.entries.write().await;
            if entries.contains_key(&project_id) {
                return ScheduleResult::rejected(format!(
                    "Continuous builds already running for project {project_id}"
                ));
            }
            entries.insert(
                project_id,
                SchedulerEntry {
                    phase: SchedulerPhase::Scheduled,
                    interval,
                    epoch,
                    started_at: now,
                    last_activity: now,
                    build_counter: seed,
                    retry_attempt: 0,
                    cycles: 0,
                    successes: 0,
                    failures: 0,
                    retries: 0,
                    stop_tx,
                    handle: None,
                },
            );
        }

        let this = self.clone();
        let handle = tokio::spawn(async move {
            this.run_loop(project_id, epoch, interval, stop_rx).await;
        });

        {
            let mut entries = self.inner.entries.write().await;
            match entries.get_mut(&project_id) {
                Some(entry) if entry.epoch == epoch => entry.handle = Some(handle),
                // Already stopped again; the task exits on its own.
                _ => {}
            }
        }

        let interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        tracing::info!(project_id = %project_id, epoch, interval_ms, build_counter = seed, "Scheduler started");
        self.emit(OrchestratorEvent::Started {
            project_id,
            interval_ms,
            at: now,
        })
        .await;

        ScheduleResult::ok()
    }

    /// Stop continuous builds for a project.
    pub async fn stop(&self, project_id: ProjectId) -> ScheduleResult {
        self.stop_with_reason(project_id, "Stopped by user").await
    }

    /// Stop with an explicit reason, recorded on in-flight builds and the event.
    pub async fn stop_with_reason(&self, project_id: ProjectId, reason: &str) -> ScheduleResult {
        let removed = self.inner.entries.write().await.remove(&project_id);
        let Some(entry) = removed else {
            return ScheduleResult::rejected(format!(
                "Continuous builds are not running for project {project_id}"
            ));
        };
        self.finish_removed(project_id, entry, reason, false).await;
        ScheduleResult::ok()
    }

    /// Abort the project's loop task and start it again. `None` means the
    /// configured default interval.
    pub async fn restart(&self, project_id: ProjectId, interval: Option<Duration>) -> ScheduleResult {
        let removed = self.inner.entries.write().await.remove(&project_id);
        if let Some(entry) = removed {
            self.finish_removed(project_id, entry, "Restarted after stall", true).await;
        }

        let result = self.start(project_id, interval).await;
        if result.success {
            ScheduleResult::ok_with(format!("Project {project_id} restarted"))
        } else {
            result
        }
    }

    /// Stop every running project.
    pub async fn shutdown_all(&self, reason: &str) -> ShutdownReport {
        let projects = self.running_projects().await;
        let mut report = ShutdownReport::default();

        for project_id in projects {
            let result = self.stop_with_reason(project_id, reason).await;
            if result.success {
                report.stopped.push(project_id);
            } else {
                report
                    .failed
                    .push((project_id, result.message.unwrap_or_default()));
            }
        }

        tracing::info!(
            stopped = report.stopped.len(),
            failed = report.failed.len(),
            reason,
            "Scheduler shut down"
        );
        report
    }

    pub async fn is_running(&self, project_id: ProjectId) -> bool {
        self.inner.entries.read().await.contains_key(&project_id)
    }

    pub async fn running_projects(&self) -> Vec<ProjectId> {
        let mut projects: Vec<_> = self.inner.entries.read().await.keys().copied().collect();
        projects.sort();
        projects
    }

    pub async fn statistics(&self, project_id: ProjectId) -> Option<SchedulerStatistics> {
        let circuit = self.inner.breaker.snapshot(project_id).await;
        let entries = self.inner.entries.read().await;
        let entry = entries.get(&project_id)?;
        Some(SchedulerStatistics {
            project_id,
            phase: entry.phase,
            interval_ms: u64::try_from(entry.interval.as_millis()).unwrap_or(u64::MAX),
            epoch: entry.epoch,
            started_at: entry.started_at,
            last_activity: entry.last_activity,
            build_counter: entry.build_counter,
            retry_attempt: entry.retry_attempt,
            cycles: entry.cycles,
            successes: entry.successes,
            failures: entry.failures,
            retries: entry.retries,
            circuit,
        })
    }

    /// Last activity of every running project.
    pub async fn liveness(&self) -> Vec<LivenessEntry> {
        let entries = self.inner.entries.read().await;
        let mut liveness: Vec<_> = entries
            .iter()
            .map(|(project_id, entry)| LivenessEntry {
                project_id: *project_id,
                last_activity: entry.last_activity,
                phase: entry.phase,
                interval: entry.interval,
                epoch: entry.epoch,
            })
            .collect();
        liveness.sort_by_key(|l| l.project_id);
        liveness
    }

    async fn finish_removed(
        &self,
        project_id: ProjectId,
        mut entry: SchedulerEntry,
        reason: &str,
        abort: bool,
    ) {
        let _ = entry.stop_tx.send(true);
        if let Some(handle) = entry.handle.take() {
            if abort {
                handle.abort();
                // The task may be mid-poll elsewhere; wait so it cannot create
                // a build after the sweep below.
                if let Err(e) = handle.await {
                    if !e.is_cancelled() {
                        tracing::warn!(project_id = %project_id, error = %e, "Aborted scheduler task panicked");
                    }
                }
            }
        }

        self.fail_active_builds(project_id, &format!("Stopped by user/system: {reason}"))
            .await;

        tracing::info!(project_id = %project_id, epoch = entry.epoch, reason, "Scheduler stopped");
        self.emit(OrchestratorEvent::Stopped {
            project_id,
            reason: reason.to_string(),
            at: Utc::now(),
        })
        .await;
    }

    async fn run_loop(
        &self,
        project_id: ProjectId,
        epoch: u64,
        interval: Duration,
        mut stop_rx: watch::Receiver<bool>,
    ) {
        if !self.tick(project_id, epoch, &mut stop_rx).await {
            return;
        }

        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = stop_rx.changed() => {
                    if changed.is_err() || *stop_rx.borrow() {
                        break;
                    }
                    continue;
                }
            }

            if !self.tick(project_id, epoch, &mut stop_rx).await {
                break;
            }
        }

        tracing::debug!(project_id = %project_id, epoch, "Scheduler loop exited");
    }

    /// One tick; returns false when the loop should exit.
    async fn tick(&self, project_id: ProjectId, epoch: u64, stop_rx: &mut watch::Receiver<bool>) -> bool {
        if !self
            .with_entry(project_id, epoch, |e| e.last_activity = Utc::now())
            .await
        {
            return false;
        }

        let decision = self.inner.breaker.allow(project_id).await;
        if !decision.allowed {
            tracing::debug!(
                project_id = %project_id,
                retry_after_secs = decision.retry_after_secs,
                "Circuit open, skipping tick"
            );
            return true;
        }

        self.run_with_retries(project_id, epoch, stop_rx).await
    }

    async fn run_with_retries(
        &self,
        project_id: ProjectId,
        epoch: u64,
        stop_rx: &mut watch::Receiver<bool>,
    ) -> bool {
        let mut attempt = 0u32;

        loop {
            let lock = self.cycle_lock(project_id).await;
            let guard = lock.lock().await;

            let Some(build_number) = self.allocate_build_number(project_id, epoch).await else {
                return false;
            };

            let result = self.inner.cycle.run(project_id, build_number, true).await;

            match result {
                Ok(outcome) => {
                    self.commit_build_number(project_id, epoch, build_number).await;
                    drop(guard);

                    if outcome.superseded || !self.is_current(project_id, epoch).await {
                        return self.is_current(project_id, epoch).await;
                    }

                    if outcome.success {
                        self.inner.breaker.record_success(project_id).await;
                        self.with_entry(project_id, epoch, |e| {
                            e.successes += 1;
                            e.retry_attempt = 0;
                            e.phase = SchedulerPhase::Scheduled;
                        })
                        .await;
                    } else {
                        self.with_entry(project_id, epoch, |e| {
                            e.failures += 1;
                            e.retry_attempt = 0;
                            e.phase = SchedulerPhase::Scheduled;
                        })
                        .await;
                        self.register_failure(project_id).await;
                    }
                    return true;
                }
                Err(err) => {
                    if let Some(build_id) = err.build_id {
                        self.commit_build_number(project_id, epoch, build_number).await;
                        self.mark_failed(build_id, &format!("Cycle error: {err}")).await;
                    }
                    drop(guard);

                    if !self.is_current(project_id, epoch).await {
                        return false;
                    }

                    let class = self.classify_failure(project_id, &err).await;
                    self.report_error(project_id, build_number, &err, class).await;

                    match class {
                        ErrorClass::Transient if attempt < self.inner.config.max_transient_retries => {
                            attempt += 1;
                            if !self.backoff_wait(project_id, epoch, attempt, stop_rx).await {
                                return false;
                            }
                        }
                        ErrorClass::ProjectMissing => {
                            if self.is_current(project_id, epoch).await {
                                self.stop_with_reason(project_id, "Project no longer exists").await;
                            }
                            return false;
                        }
                        ErrorClass::Transient | ErrorClass::Persistent => {
                            self.with_entry(project_id, epoch, |e| {
                                e.failures += 1;
                                e.retry_attempt = 0;
                                e.phase = SchedulerPhase::Scheduled;
                            })
                            .await;
                            self.register_failure(project_id).await;
                            return true;
                        }
                    }
                }
            }
        }
    }

    /// Classify a cycle error, treating any failure of a project whose record
    /// has vanished as `ProjectMissing`. A cascade delete surfaces first as a
    /// missing build or a constraint violation.
    async fn classify_failure(&self, project_id: ProjectId, err: &CycleError) -> ErrorClass {
        let class = classify(err);
        if class == ErrorClass::ProjectMissing {
            return class;
        }
        match self.inner.cycle.store().get_project(project_id).await {
            Ok(None) => ErrorClass::ProjectMissing,
            _ => class,
        }
    }

    /// Sleep before a transient retry; false if the project stopped meanwhile.
    async fn backoff_wait(
        &self,
        project_id: ProjectId,
        epoch: u64,
        attempt: u32,
        stop_rx: &mut watch::Receiver<bool>,
    ) -> bool {
        let delay = self.inner.backoff.next_delay(attempt);
        if !self
            .with_entry(project_id, epoch, |e| {
                e.phase = SchedulerPhase::BackoffWait;
                e.retry_attempt = attempt;
                e.retries += 1;
            })
            .await
        {
            return false;
        }

        tracing::warn!(
            project_id = %project_id,
            attempt,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "Transient failure, retrying after backoff"
        );

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = stop_rx.changed() => {}
        }

        self.with_entry(project_id, epoch, |e| {
            e.phase = SchedulerPhase::Scheduled;
            e.last_activity = Utc::now();
        })
        .await
    }

    async fn register_failure(&self, project_id: ProjectId) {
        let outcome = self.inner.breaker.record_failure(project_id).await;
        if !outcome.tripped {
            return;
        }

        self.fail_active_builds(
            project_id,
            &format!(
                "Circuit breaker tripped after {} consecutive failures; automatic builds suspended",
                outcome.failure_count
            ),
        )
        .await;

        let retry_after_secs = self
            .inner
            .breaker
            .allow(project_id)
            .await
            .retry_after_secs
            .unwrap_or(self.inner.breaker.config().cooldown_secs);

        self.emit(OrchestratorEvent::CircuitTripped {
            project_id,
            failure_count: outcome.failure_count,
            retry_after_secs,
            at: Utc::now(),
        })
        .await;
    }

    async fn report_error(&self, project_id: ProjectId, build_number: u64, err: &CycleError, class: ErrorClass) {
        tracing::warn!(
            project_id = %project_id,
            build_number,
            classification = class.as_str(),
            error = %err,
            "Build cycle failed"
        );
        self.emit(OrchestratorEvent::Error {
            project_id,
            message: err.to_string(),
            classification: class.as_str().to_string(),
            at: Utc::now(),
        })
        .await;
    }

    /// Mark every Queued/InProgress build of the project Failed.
    async fn fail_active_builds(&self, project_id: ProjectId, note: &str) {
        let builds = match self.inner.cycle.store().list_builds(project_id).await {
            Ok(builds) => builds,
            Err(e) => {
                tracing::error!(project_id = %project_id, error = %e, "Failed to list builds for cleanup");
                return;
            }
        };

        for build in builds.into_iter().filter(|b| b.status.is_active()) {
            self.mark_failed(build.id, note).await;
        }
    }

    async fn mark_failed(&self, build_id: uuid::Uuid, note: &str) {
        match self
            .inner
            .cycle
            .store()
            .update_build(build_id, &BuildUpdate::failed(note))
            .await
        {
            Ok(_) | Err(DomainError::InvalidStateTransition { .. }) => {}
            Err(e) => {
                tracing::error!(build_id = %build_id, error = %e, "Failed to mark build failed");
            }
        }
    }

    async fn allocate_build_number(&self, project_id: ProjectId, epoch: u64) -> Option<u64> {
        let stored = match self.inner.cycle.store().list_builds(project_id).await {
            Ok(builds) => builds.iter().map(|b| b.build_number).max().unwrap_or(0),
            Err(e) => {
                tracing::warn!(project_id = %project_id, error = %e, "Could not read latest build number");
                0
            }
        };

        let mut entries = self.inner.entries.write().await;
        let entry = entries.get_mut(&project_id).filter(|e| e.epoch == epoch)?;
        entry.phase = SchedulerPhase::Running;
        entry.cycles += 1;
        entry.last_activity = Utc::now();
        Some(entry.build_counter.max(stored) + 1)
    }

    async fn commit_build_number(&self, project_id: ProjectId, epoch: u64, build_number: u64) {
        self.with_entry(project_id, epoch, |e| {
            e.build_counter = e.build_counter.max(build_number);
            e.phase = SchedulerPhase::Idle;
        })
        .await;
    }

    async fn cycle_lock(&self, project_id: ProjectId) -> Arc<Mutex<()>> {
        if let Some(lock) = self.inner.cycle_locks.read().await.get(&project_id) {
            return lock.clone();
        }
        self.inner
            .cycle_locks
            .write()
            .await
            .entry(project_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn is_current(&self, project_id: ProjectId, epoch: u64) -> bool {
        self.inner
            .entries
            .read()
            .await
            .get(&project_id)
            .is_some_and(|e| e.epoch == epoch)
    }

    /// Mutate the entry if `epoch` is still current; returns whether it was.
    async fn with_entry(
        &self,
        project_id: ProjectId,
        epoch: u64,
        f: impl FnOnce(&mut SchedulerEntry),
    ) -> bool {
        let mut entries = self.inner.entries.write().await;
        match entries.get_mut(&project_id) {
            Some(entry) if entry.epoch == epoch => {
                f(entry);
                true
            }
            _ => false,
        }
    }

    async fn emit(&self, event: OrchestratorEvent) {
        self.inner.cycle.events().emit(event).await;
    }
}

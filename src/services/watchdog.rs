//! Stalled-project watchdog.
//!
//! Periodically compares every running project's last activity against a
//! stall threshold and restarts the ones that have gone quiet. Restart
//! failures are counted and reported but never stop the loop.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::domain::models::{OrchestratorEvent, ProjectId, WatchdogConfig};
use crate::domain::ports::EventSink;
use crate::services::scheduler::{LivenessEntry, Scheduler, SchedulerPhase};

/// Result of one scan.
#[derive(Debug, Clone, Serialize)]
pub struct WatchdogReport {
    pub scanned_at: DateTime<Utc>,
    pub scanned: usize,
    pub restarted: Vec<ProjectId>,
    pub failed: Vec<(ProjectId, String)>,
}

/// Status of the watchdog.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WatchdogStatus {
    pub running: bool,
    pub scans: u64,
    pub restarts: u64,
    pub restart_failures: u64,
    pub last_scan: Option<DateTime<Utc>>,
}

/// Handle to control a spawned watchdog.
#[derive(Clone)]
pub struct WatchdogHandle {
    stop_flag: Arc<AtomicBool>,
    wake: Arc<Notify>,
    status: Arc<RwLock<WatchdogStatus>>,
}

impl WatchdogHandle {
    /// Request the watchdog to stop.
    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::Release);
        self.wake.notify_one();
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop_flag.load(Ordering::Acquire)
    }

    pub async fn status(&self) -> WatchdogStatus {
        self.status.read().await.clone()
    }
}

pub struct Watchdog {
    scheduler: Scheduler,
    events: Arc<dyn EventSink>,
    config: WatchdogConfig,
    status: Arc<RwLock<WatchdogStatus>>,
    stop_flag: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

impl Watchdog {
    pub fn new(scheduler: Scheduler, events: Arc<dyn EventSink>, config: WatchdogConfig) -> Self {
        Self {
            scheduler,
            events,
            config,
            status: Arc::new(RwLock::new(WatchdogStatus::default())),
            stop_flag: Arc::new(AtomicBool::new(false)),
            wake: Arc::new(Notify::new()),
        }
    }

    pub fn handle(&self) -> WatchdogHandle {
        WatchdogHandle {
            stop_flag: self.stop_flag.clone(),
            wake: self.wake.clone(),
            status: self.status.clone(),
        }
    }

    pub fn config(&self) -> &WatchdogConfig {
        &self.config
    }

    /// Spawn the scan loop. The first scan happens one interval from now.
    pub fn spawn(self) -> (WatchdogHandle, JoinHandle<()>) {
        let handle = self.handle();
        let task = tokio::spawn(async move {
            self.run_loop().await;
        });
        (handle, task)
    }

    async fn run_loop(self) {
        self.status.write().await.running = true;
        tracing::info!(
            scan_interval_secs = self.config.scan_interval_secs,
            stall_threshold_secs = self.config.stall_threshold_secs,
            "Watchdog started"
        );

        let period = Duration::from_secs(self.config.scan_interval_secs.max(1));
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                () = self.wake.notified() => {}
            }

            if self.stop_flag.load(Ordering::Acquire) {
                break;
            }

            self.scan().await;
        }

        self.status.write().await.running = false;
        tracing::info!("Watchdog stopped");
    }

    /// Scan now.
    pub async fn scan(&self) -> WatchdogReport {
        self.scan_at(Utc::now()).await
    }

    /// Scan as if the current time were `now`.
    pub async fn scan_at(&self, now: DateTime<Utc>) -> WatchdogReport {
        let threshold =
            chrono::Duration::seconds(i64::try_from(self.config.stall_threshold_secs).unwrap_or(i64::MAX));
        let liveness = self.scheduler.liveness().await;

        let mut report = WatchdogReport {
            scanned_at: now,
            scanned: liveness.len(),
            restarted: Vec::new(),
            failed: Vec::new(),
        };

        for entry in liveness {
            let stalled_for = now - entry.last_activity;
            if stalled_for <= allowed_quiet(&entry, threshold) {
                continue;
            }

            tracing::warn!(
                project_id = %entry.project_id,
                stalled_for_secs = stalled_for.num_seconds(),
                phase = entry.phase.as_str(),
                "Project stalled, restarting"
            );

            let result = self.scheduler.restart(entry.project_id, None).await;
            if result.success {
                report.restarted.push(entry.project_id);
            } else {
                let message = result.message.unwrap_or_else(|| "restart failed".to_string());
                tracing::error!(project_id = %entry.project_id, error = %message, "Watchdog restart failed");
                report.failed.push((entry.project_id, message));
            }

            self.events
                .emit(OrchestratorEvent::WatchdogRestart {
                    project_id: entry.project_id,
                    stalled_for_secs: stalled_for.num_seconds(),
                    success: result.success,
                    at: Utc::now(),
                })
                .await;
        }

        {
            let mut status = self.status.write().await;
            status.scans += 1;
            status.restarts += report.restarted.len() as u64;
            status.restart_failures += report.failed.len() as u64;
            status.last_scan = Some(now);
        }

        tracing::debug!(
            scanned = report.scanned,
            restarted = report.restarted.len(),
            failed = report.failed.len(),
            "Watchdog scan complete"
        );
        report
    }

    pub async fn status(&self) -> WatchdogStatus {
        self.status.read().await.clone()
    }
}

/// How long a project may go without activity before it counts as stalled.
///
/// A project waiting for its next tick is only overdue once that tick is
/// itself `threshold` late, so long intervals are not mistaken for stalls.
fn allowed_quiet(entry: &LivenessEntry, threshold: chrono::Duration) -> chrono::Duration {
    if entry.phase != SchedulerPhase::Scheduled {
        return threshold;
    }
    chrono::Duration::from_std(entry.interval)
        .ok()
        .and_then(|interval| threshold.checked_add(&interval))
        .unwrap_or(chrono::Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = WatchdogConfig::default();
        assert!(config.enabled);
        assert_eq!(config.scan_interval_secs, 1800);
        assert_eq!(config.stall_threshold_secs, 7200);
    }

    fn entry(phase: SchedulerPhase, interval_secs: u64) -> LivenessEntry {
        LivenessEntry {
            project_id: ProjectId(1),
            last_activity: Utc::now(),
            phase,
            interval: Duration::from_secs(interval_secs),
            epoch: 1,
        }
    }

    #[test]
    fn test_scheduled_projects_get_their_interval() {
        let threshold = chrono::Duration::hours(2);
        assert_eq!(
            allowed_quiet(&entry(SchedulerPhase::Scheduled, 3 * 3600), threshold),
            chrono::Duration::hours(5)
        );
        assert_eq!(
            allowed_quiet(&entry(SchedulerPhase::Running, 3 * 3600), threshold),
            threshold
        );
        assert_eq!(
            allowed_quiet(&entry(SchedulerPhase::BackoffWait, 60), threshold),
            threshold
        );
    }

    #[test]
    fn test_status_default() {
        let status = WatchdogStatus::default();
        assert!(!status.running);
        assert_eq!(status.scans, 0);
        assert!(status.last_scan.is_none());
    }
}

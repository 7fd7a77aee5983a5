//! `modforge run`: continuous builds until interrupted.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

use crate::adapters::http::HttpModService;
use crate::adapters::sqlite::{SqliteBuildStore, SqlitePatternRepository};
use crate::cli::commands::open_database;
use crate::cli::types::RunArgs;
use crate::domain::models::{Config, OrchestratorEvent, ProjectId};
use crate::services::{
    BackoffPolicy, BuildCycle, CircuitBreakerService, EventBus, PatternCache, Scheduler,
    SequencedEvent, Watchdog,
};

/// Everything `run` wires together.
pub struct Orchestrator {
    pub scheduler: Scheduler,
    pub events: Arc<EventBus>,
    pub watchdog: Watchdog,
}

impl Orchestrator {
    /// Build the services over the given store, repository and remote service.
    pub fn assemble(
        config: &Config,
        store: SqliteBuildStore,
        patterns: SqlitePatternRepository,
        service: HttpModService,
    ) -> Self {
        let events = Arc::new(EventBus::default());
        let service = Arc::new(service);
        let cache = Arc::new(PatternCache::new(Arc::new(patterns), config.patterns.clone()));

        let cycle = BuildCycle::new(Arc::new(store), service.clone(), service, cache, events.clone());
        let scheduler = Scheduler::new(
            cycle,
            Arc::new(CircuitBreakerService::new(config.circuit_breaker.clone())),
            BackoffPolicy::new(config.backoff.clone()),
            config.scheduler.clone(),
        );
        let watchdog = Watchdog::new(scheduler.clone(), events.clone(), config.watchdog.clone());

        Self {
            scheduler,
            events,
            watchdog,
        }
    }
}

fn describe(event: &SequencedEvent) -> String {
    let at = |t: &chrono::DateTime<chrono::Utc>| t.format("%H:%M:%S").to_string();
    match &event.event {
        OrchestratorEvent::Started {
            project_id,
            interval_ms,
            at: t,
        } => format!("[{}] project {project_id}: started, every {interval_ms} ms", at(t)),
        OrchestratorEvent::Stopped {
            project_id,
            reason,
            at: t,
        } => format!("[{}] project {project_id}: stopped ({reason})", at(t)),
        OrchestratorEvent::BuildCompleted {
            project_id,
            build_number,
            success,
            error_count,
            fixed_from_pattern,
            at: t,
            ..
        } => {
            let verdict = if *success { "success" } else { "failed" };
            let note = if *fixed_from_pattern { ", fixed from pattern" } else { "" };
            format!(
                "[{}] project {project_id}: build #{build_number} {verdict} ({error_count} errors{note})",
                at(t)
            )
        }
        OrchestratorEvent::Error {
            project_id,
            message,
            classification,
            at: t,
        } => format!("[{}] project {project_id}: {classification} error: {message}", at(t)),
        OrchestratorEvent::CircuitTripped {
            project_id,
            failure_count,
            retry_after_secs,
            at: t,
        } => format!(
            "[{}] project {project_id}: circuit open after {failure_count} failures, retry in {retry_after_secs}s",
            at(t)
        ),
        OrchestratorEvent::WatchdogRestart {
            project_id,
            stalled_for_secs,
            success,
            at: t,
        } => format!(
            "[{}] project {project_id}: watchdog restart after {stalled_for_secs}s idle ({})",
            at(t),
            if *success { "ok" } else { "failed" }
        ),
    }
}

pub async fn execute(args: RunArgs, config: &Config, json_mode: bool) -> Result<()> {
    let pool = open_database(config).await?;
    let service = HttpModService::from_service_config(&config.service)
        .context("Failed to build HTTP client for the mod service")?;

    let orchestrator = Orchestrator::assemble(
        config,
        SqliteBuildStore::new(pool.clone()),
        SqlitePatternRepository::new(pool),
        service,
    );
    let mut rx = orchestrator.events.subscribe();

    let interval = args.interval_ms.map(Duration::from_millis);
    let mut started = 0usize;
    for id in args.projects {
        let result = orchestrator.scheduler.start(ProjectId(id), interval).await;
        if result.success {
            started += 1;
        } else {
            eprintln!(
                "Project {id} not started: {}",
                result.message.unwrap_or_default()
            );
        }
    }
    if started == 0 {
        anyhow::bail!("No project could be started");
    }

    let watchdog = if config.watchdog.enabled && !args.no_watchdog {
        Some(orchestrator.watchdog.spawn())
    } else {
        None
    };

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            received = rx.recv() => match received {
                Ok(event) => {
                    if json_mode {
                        println!("{}", serde_json::to_string(&event).unwrap_or_default());
                    } else {
                        println!("{}", describe(&event));
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event stream lagged");
                }
                Err(RecvError::Closed) => break,
            },
            signal = &mut ctrl_c => {
                signal.context("Failed to listen for Ctrl-C")?;
                break;
            }
        }
    }

    let report = orchestrator.scheduler.shutdown_all("Process shutting down").await;
    if let Some((handle, task)) = watchdog {
        handle.stop();
        if let Err(e) = task.await {
            tracing::warn!(error = %e, "Watchdog task ended abnormally");
        }
    }

    tracing::info!(
        stopped = report.stopped.len(),
        failed = report.failed.len(),
        "Shutdown complete"
    );
    Ok(())
}

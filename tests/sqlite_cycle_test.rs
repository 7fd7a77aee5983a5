//! Build cycles against a file-backed SQLite database.

mod common;

use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use common::{failing_report, fast_config, wait_for, FakeGenerator, FakeVerifier, VerifierDefault, HOUR, WAIT};
use modforge::adapters::sqlite::{initialize_database, SqliteBuildStore, SqlitePatternRepository};
use modforge::domain::models::{
    AutoFixLevel, BuildStatus, DatabaseConfig, ModLoader, OrchestratorEvent, PatternConfig,
    PatternKind, Project, ProjectId,
};
use modforge::domain::ports::{BuildStore, PatternRepository};
use modforge::services::{
    BackoffPolicy, BuildCycle, CircuitBreakerService, EventBus, PatternCache, Scheduler,
};

struct SqliteHarness {
    _dir: TempDir,
    store: Arc<SqliteBuildStore>,
    patterns: Arc<SqlitePatternRepository>,
    generator: Arc<FakeGenerator>,
    verifier: Arc<FakeVerifier>,
    events: Arc<EventBus>,
    cycle: BuildCycle,
}

async fn setup() -> SqliteHarness {
    let dir = TempDir::new().unwrap();
    let config = DatabaseConfig {
        path: dir.path().join("nested").join("modforge.db").display().to_string(),
        max_connections: 2,
    };
    let pool = initialize_database(&config).await.unwrap();

    let store = Arc::new(SqliteBuildStore::new(pool.clone()));
    let patterns = Arc::new(SqlitePatternRepository::new(pool));
    let generator = Arc::new(FakeGenerator::default());
    let verifier = Arc::new(FakeVerifier::new(VerifierDefault::Pass));
    let events = Arc::new(EventBus::default());
    let cycle = BuildCycle::new(
        store.clone(),
        generator.clone(),
        verifier.clone(),
        Arc::new(PatternCache::new(patterns.clone(), PatternConfig::default())),
        events.clone(),
    );

    SqliteHarness {
        _dir: dir,
        store,
        patterns,
        generator,
        verifier,
        events,
        cycle,
    }
}

async fn add_project(store: &SqliteBuildStore, description: &str) -> ProjectId {
    store
        .create_project(
            &Project::new(ProjectId(0), "Ruby Tools")
                .with_description(description)
                .with_loader(ModLoader::Fabric, "1.20.4")
                .with_auto_fix(AutoFixLevel::Balanced),
        )
        .await
        .unwrap()
        .id
}

#[tokio::test]
async fn test_empty_project_is_generated_then_built() {
    let h = setup().await;
    let project = add_project(&h.store, "Create a ruby sword with fire damage").await;

    let outcome = h.cycle.run(project, 1, false).await.unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.build.build_number, 1);
    assert!(!outcome.build.automatic);
    assert_eq!(h.generator.generate_calls(), 1);

    let stored = h.store.get_build(outcome.build.id).await.unwrap().unwrap();
    assert_eq!(stored.status, BuildStatus::Success);
    assert!(stored.log.contains("Generated 1 file(s)"));
    assert_eq!(h.store.list_files(project).await.unwrap().len(), 1);

    let generation = h.patterns.list_by_kind(PatternKind::Generation).await.unwrap();
    assert_eq!(generation.len(), 1);
    assert_eq!(generation[0].fingerprint, "Create a ruby sword with fire damage");
}

#[tokio::test]
async fn test_generation_pattern_reused_for_similar_project() {
    let h = setup().await;
    let first = add_project(&h.store, "Create a ruby sword with fire damage").await;
    h.cycle.run(first, 1, true).await.unwrap();

    let second = add_project(&h.store, "create a RUBY sword with FIRE damage").await;
    let outcome = h.cycle.run(second, 1, true).await.unwrap();
    assert!(outcome.success);
    assert_eq!(h.generator.generate_calls(), 1);

    let pattern = &h.patterns.list_by_kind(PatternKind::Generation).await.unwrap()[0];
    assert_eq!(pattern.use_count, 2);
}

#[tokio::test]
async fn test_failed_fix_leaves_failed_build() {
    let h = setup().await;
    let project = add_project(&h.store, "Add ruby ore").await;
    h.verifier.push(Ok(modforge::domain::models::VerificationReport::passed()));
    h.cycle.run(project, 1, true).await.unwrap();

    h.verifier.push(Ok(failing_report()));
    h.verifier.push(Ok(failing_report()));
    let outcome = h.cycle.run(project, 2, true).await.unwrap();
    assert!(!outcome.success);
    assert_eq!(h.generator.fix_calls(), 1);

    let build = h.store.get_build(outcome.build.id).await.unwrap().unwrap();
    assert_eq!(build.status, BuildStatus::Failed);
    assert_eq!(build.error_count, 1);
    assert!(build.log.contains("Error category: unresolved_symbol"));
    assert!(h.patterns.list_by_kind(PatternKind::Fix).await.unwrap().is_empty());

    let numbers: Vec<u64> = h
        .store
        .list_builds(project)
        .await
        .unwrap()
        .iter()
        .map(|b| b.build_number)
        .collect();
    assert_eq!(numbers, vec![1, 2]);
}

#[tokio::test]
async fn test_project_deleted_mid_cycle_stops_without_breaker_failure() {
    let h = setup().await;
    let project = add_project(&h.store, "Add ruby ore").await;
    h.verifier.set_delay(Duration::from_millis(300));

    let config = fast_config();
    let breaker = Arc::new(CircuitBreakerService::new(config.circuit_breaker.clone()));
    let scheduler = Scheduler::new(
        h.cycle,
        breaker.clone(),
        BackoffPolicy::new(config.backoff.clone()),
        config.scheduler.clone(),
    );

    assert!(scheduler.start(project, Some(HOUR)).await.success);
    assert!(
        wait_for(WAIT, || async {
            h.store
                .list_builds(project)
                .await
                .unwrap()
                .iter()
                .any(|b| b.status == BuildStatus::InProgress)
        })
        .await
    );

    // Cascades to the in-flight build and the project's files.
    assert!(h.store.delete_project(project).await.unwrap());
    assert!(wait_for(WAIT, || async { !scheduler.is_running(project).await }).await);

    assert_eq!(breaker.snapshot(project).await.map_or(0, |s| s.failure_count), 0);

    let history = h.events.history(Some(project)).await;
    let classifications: Vec<&str> = history
        .iter()
        .filter_map(|e| match e {
            OrchestratorEvent::Error { classification, .. } => Some(classification.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(classifications, vec!["project_missing"]);
    assert!(history.iter().any(|e| {
        matches!(e, OrchestratorEvent::Stopped { reason, .. } if reason == "Project no longer exists")
    }));
}

//! Common test utilities for integration tests
//!
//! Scripted fakes for the generation service and the verifier, plus a harness
//! that wires them into a scheduler over in-memory stores.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use modforge::adapters::memory::{InMemoryBuildStore, InMemoryPatternRepository};
use modforge::domain::models::{
    AutoFixLevel, BackoffConfig, CompileError, Config, FixRequest, GeneratedFile,
    GenerationRequest, GenerationResult, Project, ProjectFile, ProjectId, VerificationReport,
};
use modforge::domain::ports::{
    BuildStore, BuildVerifier, CodeGenerator, GenerationError, VerifierError,
};
use modforge::services::{
    BackoffPolicy, BuildCycle, CircuitBreakerService, EventBus, PatternCache, Scheduler,
    SimilarityScorer, Watchdog,
};

/// Code generator returning scripted results, then a default.
#[derive(Default)]
pub struct FakeGenerator {
    generate_script: Mutex<VecDeque<Result<GenerationResult, GenerationError>>>,
    fix_script: Mutex<VecDeque<Result<GenerationResult, GenerationError>>>,
    pub generate_calls: AtomicUsize,
    pub fix_calls: AtomicUsize,
}

impl FakeGenerator {
    pub fn push_generate(&self, result: Result<GenerationResult, GenerationError>) {
        self.generate_script.lock().unwrap().push_back(result);
    }

    pub fn push_fix(&self, result: Result<GenerationResult, GenerationError>) {
        self.fix_script.lock().unwrap().push_back(result);
    }

    pub fn generate_calls(&self) -> usize {
        self.generate_calls.load(Ordering::SeqCst)
    }

    pub fn fix_calls(&self) -> usize {
        self.fix_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CodeGenerator for FakeGenerator {
    async fn generate(&self, _request: &GenerationRequest) -> Result<GenerationResult, GenerationError> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        self.generate_script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(source_result("src/main/java/ModMain.java", "class ModMain {}")))
    }

    async fn fix(&self, _request: &FixRequest) -> Result<GenerationResult, GenerationError> {
        self.fix_calls.fetch_add(1, Ordering::SeqCst);
        self.fix_script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(source_result("src/main/java/ModMain.java", "class ModMain { }")))
    }
}

/// What the verifier does once its script runs out.
#[derive(Clone)]
pub enum VerifierDefault {
    Pass,
    Fail,
    Unavailable,
}

/// Verifier returning scripted reports, with an optional delay per call.
pub struct FakeVerifier {
    script: Mutex<VecDeque<Result<VerificationReport, VerifierError>>>,
    default: Mutex<VerifierDefault>,
    delay: Mutex<Option<Duration>>,
    pub calls: AtomicUsize,
}

impl FakeVerifier {
    pub fn new(default: VerifierDefault) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            default: Mutex::new(default),
            delay: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn push(&self, result: Result<VerificationReport, VerifierError>) {
        self.script.lock().unwrap().push_back(result);
    }

    pub fn set_default(&self, default: VerifierDefault) {
        *self.default.lock().unwrap() = default;
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BuildVerifier for FakeVerifier {
    async fn verify(
        &self,
        _project_id: ProjectId,
        _files: &[ProjectFile],
    ) -> Result<VerificationReport, VerifierError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self.script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| match *self.default.lock().unwrap() {
            VerifierDefault::Pass => Ok(VerificationReport::passed()),
            VerifierDefault::Fail => Ok(failing_report()),
            VerifierDefault::Unavailable => Err(VerifierError::Unavailable("connection refused".to_string())),
        })
    }
}

pub fn source_result(path: &str, content: &str) -> GenerationResult {
    GenerationResult {
        files: vec![GeneratedFile::new(path, content)],
        explanation: "generated".to_string(),
    }
}

pub fn failing_report() -> VerificationReport {
    VerificationReport::failed(vec![CompileError::new(
        "src/main/java/ModMain.java",
        12,
        "cannot find symbol RubyItem",
    )])
}

/// Services wired over in-memory stores and the fakes.
pub struct Harness {
    pub store: Arc<InMemoryBuildStore>,
    pub patterns: Arc<InMemoryPatternRepository>,
    pub generator: Arc<FakeGenerator>,
    pub verifier: Arc<FakeVerifier>,
    pub events: Arc<EventBus>,
    pub breaker: Arc<CircuitBreakerService>,
    pub scheduler: Scheduler,
    pub config: Config,
}

/// Configuration with millisecond-scale backoff.
pub fn fast_config() -> Config {
    let mut config = Config::default();
    config.backoff = BackoffConfig {
        base_ms: 1,
        max_delay_ms: 10,
        jitter_ms: 0,
    };
    config
}

impl Harness {
    pub fn new(default: VerifierDefault) -> Self {
        Self::build(fast_config(), default, None)
    }

    pub fn with_scorer(default: VerifierDefault, scorer: Arc<dyn SimilarityScorer>) -> Self {
        Self::build(fast_config(), default, Some(scorer))
    }

    pub fn build(config: Config, default: VerifierDefault, scorer: Option<Arc<dyn SimilarityScorer>>) -> Self {
        let store = Arc::new(InMemoryBuildStore::new());
        let patterns = Arc::new(InMemoryPatternRepository::new());
        let generator = Arc::new(FakeGenerator::default());
        let verifier = Arc::new(FakeVerifier::new(default));
        let events = Arc::new(EventBus::default());

        let cache = match scorer {
            Some(scorer) => PatternCache::with_scorer(patterns.clone(), config.patterns.clone(), scorer),
            None => PatternCache::new(patterns.clone(), config.patterns.clone()),
        };
        let cycle = BuildCycle::new(
            store.clone(),
            generator.clone(),
            verifier.clone(),
            Arc::new(cache),
            events.clone(),
        );
        let breaker = Arc::new(CircuitBreakerService::new(config.circuit_breaker.clone()));
        let scheduler = Scheduler::new(
            cycle,
            breaker.clone(),
            BackoffPolicy::new(config.backoff.clone()),
            config.scheduler.clone(),
        );

        Self {
            store,
            patterns,
            generator,
            verifier,
            events,
            breaker,
            scheduler,
            config,
        }
    }

    /// Register a project that already has one source file.
    pub async fn add_project(&self, id: i64, level: AutoFixLevel) -> ProjectId {
        let project_id = ProjectId(id);
        self.store
            .insert_project(
                Project::new(project_id, format!("Project {id}"))
                    .with_description("Add a ruby sword with fire damage")
                    .with_auto_fix(level),
            )
            .await;
        self.store
            .create_file(&ProjectFile::new(project_id, "src/main/java/ModMain.java", "class ModMain {}"))
            .await
            .unwrap();
        project_id
    }

    pub fn watchdog(&self) -> Watchdog {
        Watchdog::new(self.scheduler.clone(), self.events.clone(), self.config.watchdog.clone())
    }

    /// Terminal builds of a project.
    pub async fn finished_builds(&self, project_id: ProjectId) -> usize {
        self.store
            .list_builds(project_id)
            .await
            .unwrap()
            .iter()
            .filter(|b| b.status.is_terminal())
            .count()
    }

    pub async fn failure_count(&self, project_id: ProjectId) -> u32 {
        self.breaker
            .snapshot(project_id)
            .await
            .map_or(0, |s| s.failure_count)
    }
}

/// Poll an async condition every 10 ms until it holds or `timeout` passes.
pub async fn wait_for<F, Fut>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition().await
}

pub const WAIT: Duration = Duration::from_secs(5);
pub const HOUR: Duration = Duration::from_secs(3600);

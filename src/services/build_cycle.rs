//! One generate → verify → fix → reverify pass for a project.
//!
//! The cycle owns the lifecycle of exactly one [`Build`]: it is created
//! InProgress once the project has sources, and finalized as Success or
//! Failed at the end. Errors abort the pass and are returned to the caller
//! with the build id attached; the caller decides retry and breaker policy
//! and marks the build Failed.

use chrono::Utc;
use std::collections::BTreeSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::errors::DomainError;
use crate::domain::models::{
    Build, BuildStatus, BuildUpdate, CompileError, FixRequest, GeneratedFile, GenerationRequest,
    GenerationResult, OrchestratorEvent, PatternRequest, Project, ProjectFile, ProjectId,
    VerificationReport,
};
use crate::domain::ports::{BuildStore, BuildVerifier, CodeGenerator, EventSink, GenerationError};
use crate::services::error_classifier::{categorize, CycleError};
use crate::services::pattern_cache::PatternCache;

/// Result of a completed pass.
#[derive(Debug, Clone)]
pub struct CycleOutcome {
    pub build: Build,
    pub success: bool,
    /// A cached fix was applied instead of calling the fix service.
    pub fixed_from_pattern: bool,
    /// The build had already been made terminal elsewhere (e.g. by stop).
    pub superseded: bool,
}

/// What the verify/fix stage produced.
struct VerifyOutcome {
    report: VerificationReport,
    fixed_from_pattern: bool,
}

pub struct BuildCycle {
    store: Arc<dyn BuildStore>,
    generator: Arc<dyn CodeGenerator>,
    verifier: Arc<dyn BuildVerifier>,
    patterns: Arc<PatternCache>,
    events: Arc<dyn EventSink>,
}

impl BuildCycle {
    pub fn new(
        store: Arc<dyn BuildStore>,
        generator: Arc<dyn CodeGenerator>,
        verifier: Arc<dyn BuildVerifier>,
        patterns: Arc<PatternCache>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            store,
            generator,
            verifier,
            patterns,
            events,
        }
    }

    pub fn store(&self) -> &Arc<dyn BuildStore> {
        &self.store
    }

    pub fn events(&self) -> &Arc<dyn EventSink> {
        &self.events
    }

    pub fn patterns(&self) -> &Arc<PatternCache> {
        &self.patterns
    }

    /// Run one pass, creating build `build_number`.
    ///
    /// An error with `build_id == None` means no build was created and the
    /// number is still free.
    pub async fn run(
        &self,
        project_id: ProjectId,
        build_number: u64,
        automatic: bool,
    ) -> Result<CycleOutcome, CycleError> {
        let project = self
            .store
            .get_project(project_id)
            .await?
            .ok_or_else(|| CycleError::project_missing(project_id))?;

        let mut log = Vec::new();
        let generation_pattern = self.ensure_sources(&project, &mut log).await?;

        let mut build = Build::started(project_id, build_number, automatic);
        build.log = log.join("\n");
        self.store.create_build(&build).await?;

        tracing::info!(
            project_id = %project_id,
            build_number,
            build_id = %build.id,
            automatic,
            "Build started"
        );

        let verified = match self.verify_and_fix(&project, &mut log).await {
            Ok(v) => v,
            Err(e) => return Err(e.for_build(build.id)),
        };

        if let Some(pattern_id) = generation_pattern {
            self.record_pattern_outcome(pattern_id, verified.report.success).await;
        }

        self.finalize(&mut build, verified, log).await
    }

    /// Generate initial sources when the project has none.
    ///
    /// Returns the id of a reused generation pattern, if any.
    async fn ensure_sources(
        &self,
        project: &Project,
        log: &mut Vec<String>,
    ) -> Result<Option<Uuid>, CycleError> {
        let existing = self.store.list_files(project.id).await?;
        if !existing.is_empty() {
            return Ok(None);
        }

        let request = PatternRequest::generation(project.description.clone());
        let threshold = self.patterns.generation_threshold();

        if let Some(hit) = self.lookup_pattern(&request, threshold).await {
            self.write_files(project.id, &existing, &hit.pattern.output).await?;
            log.push(format!(
                "Generated {} file(s) from cached pattern {} (similarity {:.2})",
                hit.pattern.output.len(),
                hit.pattern.id,
                hit.similarity
            ));
            return Ok(Some(hit.pattern.id));
        }

        let result = self
            .generator
            .generate(&GenerationRequest::for_project(project))
            .await?;
        if result.files.is_empty() {
            return Err(GenerationError::Malformed("generation returned no files".to_string()).into());
        }

        self.write_files(project.id, &existing, &result.files).await?;
        log.push(format!("Generated {} file(s)", result.files.len()));
        self.store_pattern(&request, &result, None).await;

        Ok(None)
    }

    async fn verify_and_fix(
        &self,
        project: &Project,
        log: &mut Vec<String>,
    ) -> Result<VerifyOutcome, CycleError> {
        let files = self.store.list_files(project.id).await?;
        let first = self.verifier.verify(project.id, &files).await?;
        log.push(format!(
            "Verification: {} error(s), {} warning(s)",
            first.errors.len(),
            first.warnings.len()
        ));

        if first.success || first.errors.is_empty() || !project.auto_fix_level.fixes_enabled() {
            return Ok(VerifyOutcome {
                report: first,
                fixed_from_pattern: false,
            });
        }

        let category = categorize(&first.errors);
        log.push(format!("Error category: {category}"));

        let request = PatternRequest::fix(error_fingerprint(&first.errors), error_files(&first.errors));
        let threshold = self.patterns.fix_threshold(project.auto_fix_level);

        let (fix, cached_pattern) = match self.lookup_pattern(&request, threshold).await {
            Some(hit) => {
                log.push(format!(
                    "Applying cached fix {} (similarity {:.2})",
                    hit.pattern.id, hit.similarity
                ));
                let result = GenerationResult {
                    files: hit.pattern.output,
                    explanation: hit.pattern.explanation,
                };
                (result, Some(hit.pattern.id))
            }
            None => {
                let request = FixRequest {
                    project_id: project.id,
                    files: files
                        .iter()
                        .map(|f| GeneratedFile::new(f.path.clone(), f.content.clone()))
                        .collect(),
                    errors: first.errors.clone(),
                    mod_loader: project.mod_loader,
                    minecraft_version: project.minecraft_version.clone(),
                };
                let result = self.generator.fix(&request).await?;
                log.push(format!("Fix service changed {} file(s)", result.files.len()));
                (result, None)
            }
        };

        self.write_files(project.id, &files, &fix.files).await?;

        let files = self.store.list_files(project.id).await?;
        let second = self.verifier.verify(project.id, &files).await?;
        log.push(format!(
            "Re-verification: {} error(s), {} warning(s)",
            second.errors.len(),
            second.warnings.len()
        ));

        match cached_pattern {
            Some(pattern_id) => self.record_pattern_outcome(pattern_id, second.success).await,
            None if second.success && !fix.files.is_empty() => {
                self.store_pattern(&request, &fix, Some(category)).await;
            }
            None => {}
        }

        Ok(VerifyOutcome {
            report: second,
            fixed_from_pattern: cached_pattern.is_some(),
        })
    }

    async fn finalize(
        &self,
        build: &mut Build,
        verified: VerifyOutcome,
        mut log: Vec<String>,
    ) -> Result<CycleOutcome, CycleError> {
        let report = verified.report;
        let status = if report.success {
            BuildStatus::Success
        } else {
            BuildStatus::Failed
        };
        for error in report.errors.iter().take(20) {
            log.push(error.to_string());
        }

        let update = BuildUpdate {
            status: Some(status),
            error_count: Some(saturating_count(report.errors.len())),
            warning_count: Some(saturating_count(report.warnings.len())),
            log: Some(log.join("\n")),
            append_log: None,
            download_ref: report.download_ref.clone(),
        };

        let finished = match self.store.update_build(build.id, &update).await {
            Ok(b) => b,
            Err(DomainError::InvalidStateTransition { from, .. }) => {
                tracing::info!(
                    project_id = %build.project_id,
                    build_number = build.build_number,
                    status = %from,
                    "Build already finalized elsewhere, leaving it untouched"
                );
                let current = self.store.get_build(build.id).await?.unwrap_or_else(|| build.clone());
                return Ok(CycleOutcome {
                    build: current,
                    success: false,
                    fixed_from_pattern: verified.fixed_from_pattern,
                    superseded: true,
                });
            }
            Err(e) => return Err(CycleError::from(e).for_build(build.id)),
        };
        *build = finished.clone();

        self.events
            .emit(OrchestratorEvent::BuildCompleted {
                project_id: finished.project_id,
                build_id: finished.id,
                build_number: finished.build_number,
                success: report.success,
                error_count: finished.error_count,
                warning_count: finished.warning_count,
                fixed_from_pattern: verified.fixed_from_pattern,
                at: Utc::now(),
            })
            .await;

        Ok(CycleOutcome {
            build: finished,
            success: report.success,
            fixed_from_pattern: verified.fixed_from_pattern,
            superseded: false,
        })
    }

    /// Upsert generated files by path.
    async fn write_files(
        &self,
        project_id: ProjectId,
        existing: &[ProjectFile],
        output: &[GeneratedFile],
    ) -> Result<(), CycleError> {
        for generated in output {
            match existing.iter().find(|f| f.path == generated.path) {
                Some(file) => {
                    let mut updated = file.clone();
                    updated.content = generated.content.clone();
                    updated.updated_at = Utc::now();
                    self.store.update_file(&updated).await?;
                }
                None => {
                    let file = ProjectFile::new(project_id, generated.path.clone(), generated.content.clone());
                    self.store.create_file(&file).await?;
                }
            }
        }
        Ok(())
    }

    /// Pattern lookups are best effort; a failing repository counts as a miss.
    async fn lookup_pattern(
        &self,
        request: &PatternRequest,
        threshold: f64,
    ) -> Option<crate::services::pattern_cache::PatternMatch> {
        match self.patterns.lookup(request, threshold).await {
            Ok(lookup) => lookup.matched,
            Err(e) => {
                tracing::warn!(kind = request.kind.as_str(), error = %e, "Pattern lookup failed");
                None
            }
        }
    }

    async fn store_pattern(
        &self,
        request: &PatternRequest,
        result: &GenerationResult,
        category: Option<crate::services::error_classifier::ErrorCategory>,
    ) {
        if let Err(e) = self.patterns.store(request, result, category).await {
            tracing::warn!(kind = request.kind.as_str(), error = %e, "Failed to store pattern");
        }
    }

    async fn record_pattern_outcome(&self, pattern_id: Uuid, success: bool) {
        if let Err(e) = self.patterns.record_outcome(pattern_id, success).await {
            tracing::warn!(pattern_id = %pattern_id, error = %e, "Failed to record pattern outcome");
        }
    }
}

/// Error messages joined into the text used for fix pattern matching.
pub fn error_fingerprint(errors: &[CompileError]) -> String {
    errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Distinct files named by a set of errors.
pub fn error_files(errors: &[CompileError]) -> Vec<String> {
    errors
        .iter()
        .map(|e| e.file.clone())
        .filter(|f| !f.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn saturating_count(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{InMemoryBuildStore, InMemoryPatternRepository};
    use crate::domain::models::{AutoFixLevel, PatternConfig};
    use crate::domain::ports::VerifierError;
    use crate::services::event_bus::EventBus;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct StubGenerator {
        generate_calls: AtomicUsize,
        fix_calls: AtomicUsize,
    }

    impl StubGenerator {
        fn new() -> Self {
            Self {
                generate_calls: AtomicUsize::new(0),
                fix_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl CodeGenerator for StubGenerator {
        async fn generate(&self, _request: &GenerationRequest) -> Result<GenerationResult, GenerationError> {
            self.generate_calls.fetch_add(1, Ordering::SeqCst);
            Ok(GenerationResult {
                files: vec![GeneratedFile::new("src/Main.java", "class Main {")],
                explanation: "initial".to_string(),
            })
        }

        async fn fix(&self, _request: &FixRequest) -> Result<GenerationResult, GenerationError> {
            self.fix_calls.fetch_add(1, Ordering::SeqCst);
            Ok(GenerationResult {
                files: vec![GeneratedFile::new("src/Main.java", "class Main {}")],
                explanation: "closed brace".to_string(),
            })
        }
    }

    /// Passes once `src/Main.java` is balanced.
    struct BraceVerifier {
        reports: Mutex<Vec<bool>>,
    }

    #[async_trait]
    impl BuildVerifier for BraceVerifier {
        async fn verify(
            &self,
            _project_id: ProjectId,
            files: &[ProjectFile],
        ) -> Result<VerificationReport, VerifierError> {
            let ok = files.iter().all(|f| f.content.matches('{').count() == f.content.matches('}').count());
            self.reports.lock().unwrap().push(ok);
            if ok {
                Ok(VerificationReport::passed().with_download("artifact-1"))
            } else {
                Ok(VerificationReport::failed(vec![CompileError::new(
                    "src/Main.java",
                    1,
                    "reached end of file while parsing",
                )]))
            }
        }
    }

    async fn setup(level: AutoFixLevel) -> (BuildCycle, Arc<InMemoryBuildStore>, Arc<StubGenerator>) {
        let store = Arc::new(InMemoryBuildStore::new());
        store
            .insert_project(
                Project::new(ProjectId(1), "Ruby")
                    .with_description("A mod adding ruby tools")
                    .with_auto_fix(level),
            )
            .await;
        let generator = Arc::new(StubGenerator::new());
        let cycle = BuildCycle::new(
            store.clone(),
            generator.clone(),
            Arc::new(BraceVerifier {
                reports: Mutex::new(Vec::new()),
            }),
            Arc::new(PatternCache::new(
                Arc::new(InMemoryPatternRepository::new()),
                PatternConfig::default(),
            )),
            Arc::new(EventBus::default()),
        );
        (cycle, store, generator)
    }

    #[tokio::test]
    async fn test_generates_then_fixes() {
        let (cycle, store, generator) = setup(AutoFixLevel::Balanced).await;

        let outcome = cycle.run(ProjectId(1), 1, true).await.unwrap();
        assert!(outcome.success);
        assert!(!outcome.fixed_from_pattern);
        assert_eq!(outcome.build.status, BuildStatus::Success);
        assert_eq!(outcome.build.download_ref.as_deref(), Some("artifact-1"));
        assert_eq!(generator.generate_calls.load(Ordering::SeqCst), 1);
        assert_eq!(generator.fix_calls.load(Ordering::SeqCst), 1);

        let files = store.list_files(ProjectId(1)).await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].content, "class Main {}");

        // Fix pattern learned from the successful reverify
        let fixes = cycle.patterns().patterns(crate::domain::models::PatternKind::Fix).await.unwrap();
        assert_eq!(fixes.len(), 1);
        assert_eq!(fixes[0].category.as_deref(), Some("syntax_error"));
    }

    #[tokio::test]
    async fn test_auto_fix_off_keeps_first_result() {
        let (cycle, _store, generator) = setup(AutoFixLevel::Off).await;

        let outcome = cycle.run(ProjectId(1), 1, true).await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.build.status, BuildStatus::Failed);
        assert_eq!(outcome.build.error_count, 1);
        assert_eq!(generator.fix_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_project() {
        let (cycle, _store, _generator) = setup(AutoFixLevel::Off).await;
        let err = cycle.run(ProjectId(99), 1, true).await.unwrap_err();
        assert!(err.build_id.is_none());
        assert_eq!(
            crate::services::error_classifier::classify(&err),
            crate::services::error_classifier::ErrorClass::ProjectMissing
        );
    }

    #[test]
    fn test_error_files_are_distinct() {
        let errors = vec![
            CompileError::new("B.java", 1, "x"),
            CompileError::new("A.java", 2, "y"),
            CompileError::new("B.java", 3, "z"),
        ];
        assert_eq!(error_files(&errors), vec!["A.java", "B.java"]);
        assert_eq!(error_fingerprint(&errors), "x y z");
    }
}

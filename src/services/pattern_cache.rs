//! Similarity-based reuse of earlier generation and fix results.
//!
//! A lookup scores every stored pattern of the request's kind and reports the
//! best one. The match is only returned when it clears the caller's
//! threshold; callers that miss go to the external service and `store` the
//! answer on success.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    AutoFixLevel, GenerationResult, PatternConfig, PatternKind, PatternRecord, PatternRequest,
};
use crate::domain::ports::PatternRepository;
use crate::services::error_classifier::ErrorCategory;
use crate::services::similarity::{
    extract_key_terms, ScoreInput, SimilarityScorer, WeightedOverlapScorer,
};

/// Slack for floating point error at the threshold boundary.
const THRESHOLD_EPSILON: f64 = 1e-9;

/// A stored pattern that cleared the threshold.
#[derive(Debug, Clone)]
pub struct PatternMatch {
    pub pattern: PatternRecord,
    pub similarity: f64,
}

/// Outcome of a lookup.
#[derive(Debug, Clone, Default)]
pub struct LookupResult {
    pub matched: Option<PatternMatch>,
    /// Best similarity seen, whether or not it cleared the threshold.
    pub similarity: f64,
}

impl LookupResult {
    pub fn is_hit(&self) -> bool {
        self.matched.is_some()
    }
}

/// Cache usage counters.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct PatternCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub stored: u64,
    pub hit_ratio: f64,
}

pub struct PatternCache {
    repository: Arc<dyn PatternRepository>,
    scorer: Arc<dyn SimilarityScorer>,
    config: PatternConfig,
    hits: AtomicU64,
    misses: AtomicU64,
    stored: AtomicU64,
}

impl PatternCache {
    pub fn new(repository: Arc<dyn PatternRepository>, config: PatternConfig) -> Self {
        Self::with_scorer(repository, config, Arc::new(WeightedOverlapScorer::default()))
    }

    pub fn with_scorer(
        repository: Arc<dyn PatternRepository>,
        config: PatternConfig,
        scorer: Arc<dyn SimilarityScorer>,
    ) -> Self {
        Self {
            repository,
            scorer,
            config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            stored: AtomicU64::new(0),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Threshold for reusing a generation pattern.
    pub fn generation_threshold(&self) -> f64 {
        self.config.generation_threshold
    }

    /// Threshold for reusing a fix pattern at the given auto-fix level.
    pub fn fix_threshold(&self, level: AutoFixLevel) -> f64 {
        match level {
            AutoFixLevel::Aggressive => self.config.aggressive_fix_threshold,
            AutoFixLevel::Balanced | AutoFixLevel::Off => self.config.fix_threshold,
        }
    }

    /// Find the most similar stored pattern of the same kind.
    pub async fn lookup(&self, request: &PatternRequest, threshold: f64) -> DomainResult<LookupResult> {
        if !self.config.enabled {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return Ok(LookupResult::default());
        }

        let terms = extract_key_terms(&request.text);
        let candidates = self.repository.list_by_kind(request.kind).await?;

        let query = ScoreInput {
            terms: &terms,
            files: &request.files,
        };

        let mut best: Option<(f64, PatternRecord)> = None;
        for candidate in candidates {
            let score = self.scorer.score(
                query,
                ScoreInput {
                    terms: &candidate.key_terms,
                    files: &candidate.files,
                },
            );
            if best.as_ref().map_or(true, |(top, _)| score > *top) {
                best = Some((score, candidate));
            }
        }

        let Some((similarity, pattern)) = best else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(kind = request.kind.as_str(), "Pattern cache empty for kind");
            return Ok(LookupResult::default());
        };

        if similarity + THRESHOLD_EPSILON >= threshold {
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::info!(
                kind = request.kind.as_str(),
                pattern_id = %pattern.id,
                similarity,
                threshold,
                "Pattern cache hit"
            );
            Ok(LookupResult {
                matched: Some(PatternMatch {
                    pattern,
                    similarity,
                }),
                similarity,
            })
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(
                kind = request.kind.as_str(),
                similarity,
                threshold,
                "Pattern cache miss"
            );
            Ok(LookupResult {
                matched: None,
                similarity,
            })
        }
    }

    /// Remember a successful result. Returns `None` when the cache is disabled.
    pub async fn store(
        &self,
        request: &PatternRequest,
        result: &GenerationResult,
        category: Option<ErrorCategory>,
    ) -> DomainResult<Option<PatternRecord>> {
        if !self.config.enabled {
            return Ok(None);
        }

        let mut record = PatternRecord::new(
            request,
            extract_key_terms(&request.text),
            result.files.clone(),
            result.explanation.clone(),
        );
        if let Some(category) = category {
            record = record.with_category(category.as_str());
        }

        self.repository.insert(&record).await?;
        self.stored.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(
            kind = request.kind.as_str(),
            pattern_id = %record.id,
            terms = record.key_terms.len(),
            "Stored new pattern"
        );
        Ok(Some(record))
    }

    /// Fold the outcome of reusing a pattern into its success rate.
    pub async fn record_outcome(&self, pattern_id: Uuid, success: bool) -> DomainResult<PatternRecord> {
        let mut pattern = self
            .repository
            .get(pattern_id)
            .await?
            .ok_or(DomainError::PatternNotFound(pattern_id))?;

        pattern.record_outcome(success);
        self.repository.update(&pattern).await?;

        tracing::debug!(
            pattern_id = %pattern_id,
            success,
            use_count = pattern.use_count,
            success_rate = pattern.success_rate,
            "Recorded pattern outcome"
        );
        Ok(pattern)
    }

    /// All stored patterns of one kind.
    pub async fn patterns(&self, kind: PatternKind) -> DomainResult<Vec<PatternRecord>> {
        self.repository.list_by_kind(kind).await
    }

    pub fn stats(&self) -> PatternCacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;

        #[allow(clippy::cast_precision_loss)]
        let hit_ratio = if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        };

        PatternCacheStats {
            hits,
            misses,
            stored: self.stored.load(Ordering::Relaxed),
            hit_ratio,
        }
    }
}

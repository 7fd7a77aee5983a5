//! Pattern records: previously successful generation and fix results that can
//! be reused for sufficiently similar requests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::generation::GeneratedFile;

/// What kind of request a pattern answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    /// Initial source generation from a prompt.
    Generation,
    /// Repair of a set of compiler errors.
    Fix,
}

impl PatternKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Generation => "generation",
            Self::Fix => "fix",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "generation" => Some(Self::Generation),
            "fix" => Some(Self::Fix),
            _ => None,
        }
    }
}

/// Input side of a pattern lookup or store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternRequest {
    pub kind: PatternKind,
    /// Prompt text for generation, error fingerprint for fixes.
    pub text: String,
    /// File manifest the request touches; empty means term-only scoring.
    pub files: Vec<String>,
}

impl PatternRequest {
    pub fn generation(prompt: impl Into<String>) -> Self {
        Self {
            kind: PatternKind::Generation,
            text: prompt.into(),
            files: Vec::new(),
        }
    }

    pub fn fix(fingerprint: impl Into<String>, files: Vec<String>) -> Self {
        Self {
            kind: PatternKind::Fix,
            text: fingerprint.into(),
            files,
        }
    }
}

/// A stored, reusable generation or fix result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternRecord {
    pub id: Uuid,
    pub kind: PatternKind,
    /// The prompt or error text the pattern was learned from.
    pub fingerprint: String,
    pub key_terms: Vec<String>,
    pub files: Vec<String>,
    /// Output artifact replayed on a hit.
    pub output: Vec<GeneratedFile>,
    pub explanation: String,
    /// Diagnostic category for fix patterns.
    pub category: Option<String>,
    pub use_count: u32,
    /// Percentage of uses that led to a good outcome (0..=100).
    pub success_rate: u32,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl PatternRecord {
    pub fn new(
        request: &PatternRequest,
        key_terms: Vec<String>,
        output: Vec<GeneratedFile>,
        explanation: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: request.kind,
            fingerprint: request.text.clone(),
            key_terms,
            files: request.files.clone(),
            output,
            explanation: explanation.into(),
            category: None,
            use_count: 1,
            success_rate: 100,
            created_at: Utc::now(),
            last_used_at: None,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Fold one more observed outcome into the running success rate.
    pub fn record_outcome(&mut self, success: bool) {
        let uses = f64::from(self.use_count);
        let successes = (f64::from(self.success_rate) / 100.0 * uses).floor();
        let successes = successes + if success { 1.0 } else { 0.0 };

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let rate = (100.0 * successes / (uses + 1.0)).round() as u32;

        self.success_rate = rate.min(100);
        self.use_count += 1;
        self.last_used_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> PatternRecord {
        PatternRecord::new(
            &PatternRequest::generation("ruby sword"),
            vec!["ruby".to_string(), "sword".to_string()],
            vec![],
            "",
        )
    }

    #[test]
    fn test_new_record_starts_fully_successful() {
        let record = record();
        assert_eq!(record.use_count, 1);
        assert_eq!(record.success_rate, 100);
    }

    #[test]
    fn test_record_outcome_running_rate() {
        let mut record = record();

        // successes = floor(1.0 * 1) = 1; (1 + 0) / 2 = 50%
        record.record_outcome(false);
        assert_eq!(record.use_count, 2);
        assert_eq!(record.success_rate, 50);

        // successes = floor(0.5 * 2) = 1; (1 + 1) / 3 = 66.67 -> 67%
        record.record_outcome(true);
        assert_eq!(record.use_count, 3);
        assert_eq!(record.success_rate, 67);

        // successes = floor(0.67 * 3) = 2; (2 + 1) / 4 = 75%
        record.record_outcome(true);
        assert_eq!(record.success_rate, 75);
        assert!(record.last_used_at.is_some());
    }
}

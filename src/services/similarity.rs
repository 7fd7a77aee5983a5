//! Key-term extraction and similarity scoring for the pattern cache.

use std::collections::HashSet;

const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "and", "or", "but", "if", "then", "else", "when", "at", "by", "for", "with",
    "about", "against", "between", "into", "through", "during", "before", "after", "above",
    "below", "to", "from", "up", "down", "in", "out", "on", "off", "over", "under", "again",
    "further", "once", "here", "there", "where", "why", "how", "all", "any", "both", "each",
    "few", "more", "most", "other", "some", "such", "only", "own", "same", "than", "too", "very",
    "can", "will", "just", "should", "now", "this", "that", "these", "those", "which", "what",
    "would", "could", "make", "like", "want", "have", "has", "had", "been", "being", "does",
    "doing", "also", "please", "your", "yours", "their", "them", "they", "were",
];

/// Lowercased, whitespace-separated terms longer than three characters,
/// minus stop-words, first occurrence order preserved.
pub fn extract_key_terms(text: &str) -> Vec<String> {
    let stop: HashSet<&str> = STOP_WORDS.iter().copied().collect();
    let mut seen = HashSet::new();
    let mut terms = Vec::new();

    for token in text.to_lowercase().split_whitespace() {
        if token.chars().count() <= 3 || stop.contains(token) {
            continue;
        }
        if seen.insert(token.to_string()) {
            terms.push(token.to_string());
        }
    }
    terms
}

/// `|A ∩ B| / max(|A|, |B|)`, zero when both sets are empty.
pub fn overlap_ratio(a: &[String], b: &[String]) -> f64 {
    let a: HashSet<&str> = a.iter().map(String::as_str).collect();
    let b: HashSet<&str> = b.iter().map(String::as_str).collect();
    let largest = a.len().max(b.len());
    if largest == 0 {
        return 0.0;
    }
    let shared = a.intersection(&b).count();

    #[allow(clippy::cast_precision_loss)]
    let ratio = shared as f64 / largest as f64;
    ratio
}

/// One side of a similarity comparison.
#[derive(Debug, Clone, Copy)]
pub struct ScoreInput<'a> {
    pub terms: &'a [String],
    pub files: &'a [String],
}

/// Strategy for scoring a request against a stored pattern, in `[0, 1]`.
pub trait SimilarityScorer: Send + Sync {
    fn score(&self, request: ScoreInput<'_>, pattern: ScoreInput<'_>) -> f64;
}

/// Weighted blend of term overlap and file overlap.
///
/// When the request carries no file manifest only terms are scored.
#[derive(Debug, Clone, Copy)]
pub struct WeightedOverlapScorer {
    pub term_weight: f64,
    pub file_weight: f64,
}

impl Default for WeightedOverlapScorer {
    fn default() -> Self {
        Self {
            term_weight: 0.6,
            file_weight: 0.4,
        }
    }
}

impl SimilarityScorer for WeightedOverlapScorer {
    fn score(&self, request: ScoreInput<'_>, pattern: ScoreInput<'_>) -> f64 {
        let terms = overlap_ratio(request.terms, pattern.terms);
        if request.files.is_empty() {
            return terms;
        }
        let files = overlap_ratio(request.files, pattern.files);
        self.term_weight * terms + self.file_weight * files
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_extract_key_terms() {
        let terms = extract_key_terms("Add a Ruby sword and a ruby pickaxe to the game");
        assert_eq!(terms, strings(&["ruby", "sword", "pickaxe", "game"]));
    }

    #[test]
    fn test_extract_drops_short_tokens() {
        assert!(extract_key_terms("a an the ore mod").is_empty());
        assert_eq!(extract_key_terms("ores"), strings(&["ores"]));
    }

    #[test]
    fn test_overlap_uses_larger_set() {
        let a = strings(&["ruby", "sword"]);
        let b = strings(&["ruby", "sword", "pickaxe", "armor"]);
        assert!((overlap_ratio(&a, &b) - 0.5).abs() < 1e-9);
        assert_eq!(overlap_ratio(&[], &[]), 0.0);
    }

    #[test]
    fn test_term_only_when_no_files() {
        let scorer = WeightedOverlapScorer::default();
        let terms = strings(&["ruby", "sword"]);
        let files = strings(&["RubySword.java"]);
        let score = scorer.score(
            ScoreInput { terms: &terms, files: &[] },
            ScoreInput { terms: &terms, files: &files },
        );
        assert!((score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_weighted_blend() {
        let scorer = WeightedOverlapScorer::default();
        let request_terms = strings(&["cannot", "symbol"]);
        let pattern_terms = strings(&["cannot", "symbol"]);
        let request_files = strings(&["A.java", "B.java"]);
        let pattern_files = strings(&["A.java"]);

        let score = scorer.score(
            ScoreInput { terms: &request_terms, files: &request_files },
            ScoreInput { terms: &pattern_terms, files: &pattern_files },
        );
        // 0.6 * 1.0 + 0.4 * 0.5
        assert!((score - 0.8).abs() < 1e-9);
    }

    proptest! {
        #[test]
        fn score_is_a_ratio(
            a in proptest::collection::vec("[a-e]{4}", 0..6),
            b in proptest::collection::vec("[a-e]{4}", 0..6),
            fa in proptest::collection::vec("[a-c]\\.java", 0..3),
            fb in proptest::collection::vec("[a-c]\\.java", 0..3),
        ) {
            let score = WeightedOverlapScorer::default().score(
                ScoreInput { terms: &a, files: &fa },
                ScoreInput { terms: &b, files: &fb },
            );
            prop_assert!((0.0..=1.0 + 1e-9).contains(&score));
        }
    }
}

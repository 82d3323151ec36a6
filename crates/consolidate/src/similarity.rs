// crates/consolidate/src/similarity.rs
//! Fuzzy text similarity behind a small capability trait, so an
//! embedding-based scorer can replace word overlap without touching the
//! promoter's invariants.

use std::collections::HashSet;

/// Scores how alike two short texts are, in [0, 1].
pub trait Similarity: Send + Sync {
    fn score(&self, a: &str, b: &str) -> f64;
}

/// Word-set overlap: lowercase, strip punctuation, split on whitespace,
/// then |A ∩ B| relative to the smaller set.
///
/// Normalizing by the smaller set rather than the union keeps a terse fact
/// and its wordier restatement ("use chmod 600 for netplan" vs "use chmod
/// 600 on netplan configs") above the dedup threshold.
#[derive(Debug, Default, Clone, Copy)]
pub struct WordOverlap;

impl WordOverlap {
    fn tokenize(text: &str) -> HashSet<String> {
        text.to_lowercase()
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { ' ' })
            .collect::<String>()
            .split_whitespace()
            .map(String::from)
            .collect()
    }
}

impl Similarity for WordOverlap {
    fn score(&self, a: &str, b: &str) -> f64 {
        let set_a = Self::tokenize(a);
        let set_b = Self::tokenize(b);
        let smaller = set_a.len().min(set_b.len());
        if smaller == 0 {
            return 0.0;
        }
        let intersection = set_a.intersection(&set_b).count() as f64;
        intersection / smaller as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_texts() {
        let sim = WordOverlap;
        assert!((sim.score("use chmod 600", "use chmod 600") - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_case_and_punctuation_insensitive() {
        let sim = WordOverlap;
        assert!((sim.score("Use chmod 600!", "use, chmod: 600") - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_restatements_clear_the_dedup_threshold() {
        let sim = WordOverlap;
        // 4 shared words against the 5-word original
        let score = sim.score(
            "Use chmod 600 for netplan",
            "use chmod 600 on netplan configs",
        );
        assert!(score >= 0.7, "expected >= 0.7, got {score}");
    }

    #[test]
    fn test_unrelated_texts_score_low() {
        let sim = WordOverlap;
        assert!(sim.score("prefer sqlx over rusqlite", "always run tests in CI") < 0.3);
    }

    #[test]
    fn test_empty_inputs() {
        let sim = WordOverlap;
        assert_eq!(sim.score("", ""), 0.0);
        assert_eq!(sim.score("words here", ""), 0.0);
    }
}

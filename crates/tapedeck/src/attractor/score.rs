//! Match scores and the ranking used to order them.

use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;

/// Result of testing one attractor group (or one dimension of it) against a request.
///
/// A `required_total` of `-1` is the "impossible" sentinel: the matcher was
/// structurally unable to match anything.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchScore {
    pub required_total: i32,
    pub required_matched: i32,
    pub optional_matched: i32,
    pub required_ratio: f64,
    pub optional_ratio: f64,
}

impl Default for MatchScore {
    fn default() -> Self {
        Self::empty()
    }
}

impl MatchScore {
    /// Nothing required, nothing matched. Satisfies.
    pub const fn empty() -> Self {
        Self {
            required_total: 0,
            required_matched: 0,
            optional_matched: 0,
            required_ratio: 0.0,
            optional_ratio: 0.0,
        }
    }

    /// The "nothing can match" sentinel.
    pub const fn impossible() -> Self {
        Self {
            required_total: -1,
            required_matched: -1,
            optional_matched: -1,
            required_ratio: 0.0,
            optional_ratio: 0.0,
        }
    }

    /// `count` required rules with zero hits.
    pub const fn failed(count: i32) -> Self {
        Self {
            required_total: count,
            ..Self::empty()
        }
    }

    pub fn is_impossible(&self) -> bool {
        self.required_total == -1
    }

    /// Every required rule hit, and the score is not the impossible sentinel.
    pub fn satisfies_required(&self) -> bool {
        self.required_total != -1 && self.required_matched == self.required_total
    }

    /// Fold another dimension's score into this one. Impossible is absorbing.
    pub fn accumulate(&mut self, other: &MatchScore) {
        if self.is_impossible() || other.is_impossible() {
            *self = Self::impossible();
            return;
        }
        self.required_total += other.required_total;
        self.required_matched += other.required_matched;
        self.optional_matched += other.optional_matched;
        self.required_ratio += other.required_ratio;
        self.optional_ratio += other.optional_ratio;
    }
}

impl fmt::Display for MatchScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Req: {}/{} ({:.4}), Opt: {} ({:.4})",
            self.required_matched,
            self.required_total,
            self.required_ratio,
            self.optional_matched,
            self.optional_ratio
        )
    }
}

/// Ordering strategy used by the selector to pick the best candidate.
///
/// `Ordering::Greater` means `a` ranks above `b`. Candidates that compare
/// `Equal` to the best one make the selection ambiguous.
pub trait ScoreRanking: Send + Sync {
    fn compare(&self, a: &MatchScore, b: &MatchScore) -> Ordering;
}

/// Lexicographic ranking: required hits, required ratio, optional hits, optional ratio.
#[derive(Debug, Clone, Copy, Default)]
pub struct LexicographicRanking;

impl ScoreRanking for LexicographicRanking {
    fn compare(&self, a: &MatchScore, b: &MatchScore) -> Ordering {
        a.required_matched
            .cmp(&b.required_matched)
            .then_with(|| a.required_ratio.total_cmp(&b.required_ratio))
            .then_with(|| a.optional_matched.cmp(&b.optional_matched))
            .then_with(|| a.optional_ratio.total_cmp(&b.optional_ratio))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score(matched: i32, ratio: f64, opt: i32, opt_ratio: f64) -> MatchScore {
        MatchScore {
            required_total: matched,
            required_matched: matched,
            optional_matched: opt,
            required_ratio: ratio,
            optional_ratio: opt_ratio,
        }
    }

    #[test]
    fn test_satisfies_required() {
        assert!(MatchScore::empty().satisfies_required());
        assert!(!MatchScore::impossible().satisfies_required());
        assert!(!MatchScore::failed(1).satisfies_required());
        assert!(score(2, 1.0, 0, 0.0).satisfies_required());
    }

    #[test]
    fn test_accumulate_impossible_is_absorbing() {
        let mut total = score(1, 1.0, 0, 0.0);
        total.accumulate(&MatchScore::impossible());
        assert!(total.is_impossible());

        total.accumulate(&score(3, 1.0, 0, 0.0));
        assert!(total.is_impossible());
    }

    #[test]
    fn test_accumulate_sums_fields() {
        let mut total = score(1, 0.5, 1, 0.25);
        total.accumulate(&score(1, 1.0, 0, 0.0));
        assert_eq!(total.required_total, 2);
        assert_eq!(total.required_matched, 2);
        assert_eq!(total.optional_matched, 1);
        assert_eq!(total.required_ratio, 1.5);
    }

    #[test]
    fn test_lexicographic_ranking_order() {
        let ranking = LexicographicRanking;
        let more_hits = score(2, 0.1, 0, 0.0);
        let better_ratio = score(1, 1.0, 5, 1.0);
        assert_eq!(ranking.compare(&more_hits, &better_ratio), Ordering::Greater);

        let a = score(1, 0.5, 1, 0.2);
        let b = score(1, 0.5, 0, 0.9);
        assert_eq!(ranking.compare(&a, &b), Ordering::Greater);

        assert_eq!(ranking.compare(&a, &a), Ordering::Equal);
    }
}

//! Cross-candidate best-match selection.

use super::group::AttractorGroup;
use super::score::{LexicographicRanking, MatchScore, ScoreRanking};
use super::Fingerprint;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::debug;

/// Why a selection produced no winner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissReason {
    /// There were no candidates left after the pre-filter.
    NoCandidates,
    /// At least one candidate was scored but none satisfied its required rules.
    Unsatisfied,
    /// Every scored candidate was structurally unable to match.
    Impossible,
}

/// Outcome of a best-match selection.
#[derive(Debug, Clone)]
pub enum Selection<T> {
    /// A unique best candidate.
    Found { item: T, score: MatchScore },
    /// Two or more candidates share the best score.
    Conflict { tied: Vec<T>, score: MatchScore },
    NotFound { reason: MissReason },
}

impl<T> Selection<T> {
    pub fn is_found(&self) -> bool {
        matches!(self, Selection::Found { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Selection::Conflict { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Selection::NotFound { .. })
    }
}

/// Picks the single best candidate for a request, or reports ambiguity.
#[derive(Clone)]
pub struct BestMatchSelector {
    ranking: Arc<dyn ScoreRanking>,
}

impl Default for BestMatchSelector {
    fn default() -> Self {
        Self::new(Arc::new(LexicographicRanking))
    }
}

impl std::fmt::Debug for BestMatchSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BestMatchSelector").finish_non_exhaustive()
    }
}

impl BestMatchSelector {
    pub fn new(ranking: Arc<dyn ScoreRanking>) -> Self {
        Self { ranking }
    }

    /// Select the best candidate for `fingerprint`.
    ///
    /// Candidates rejected by `pre_filter` are never scored. A candidate
    /// without a group is scored as an empty group. Exact ties under the
    /// ranking are reported as [`Selection::Conflict`].
    pub fn select<'g, T, I, F>(
        &self,
        candidates: I,
        fingerprint: &Fingerprint,
        pre_filter: F,
    ) -> Selection<T>
    where
        I: IntoIterator<Item = (T, Option<&'g AttractorGroup>)>,
        F: Fn(&T) -> bool,
    {
        let empty = AttractorGroup::default();
        let mut survivors: Vec<(T, MatchScore)> = Vec::new();
        let mut scored = 0usize;
        let mut impossible = 0usize;

        for (item, group) in candidates {
            if !pre_filter(&item) {
                continue;
            }
            scored += 1;

            let score = group.unwrap_or(&empty).score(fingerprint);
            if score.is_impossible() {
                impossible += 1;
                continue;
            }
            if score.satisfies_required() {
                survivors.push((item, score));
            }
        }

        if survivors.is_empty() {
            let reason = match (scored, impossible) {
                (0, _) => MissReason::NoCandidates,
                (s, i) if s == i => MissReason::Impossible,
                _ => MissReason::Unsatisfied,
            };
            debug!("No candidate satisfied {:?} ({:?})", fingerprint, reason);
            return Selection::NotFound { reason };
        }

        let best = survivors
            .iter()
            .map(|(_, score)| *score)
            .reduce(|best, score| match self.ranking.compare(&score, &best) {
                Ordering::Greater => score,
                _ => best,
            })
            .unwrap_or_default();

        let mut top: Vec<T> = survivors
            .into_iter()
            .filter(|(_, score)| self.ranking.compare(score, &best) == Ordering::Equal)
            .map(|(item, _)| item)
            .collect();

        if top.len() == 1 {
            if let Some(item) = top.pop() {
                return Selection::Found { item, score: best };
            }
        }

        debug!("{} candidates tied at {}", top.len(), best);
        Selection::Conflict {
            tied: top,
            score: best,
        }
    }
}

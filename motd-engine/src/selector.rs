//! Winner selection with a random tie-break.
//!
//! Each call draws a fresh tiebreaker in `[0, 1)` for every candidate and
//! ranks by `score + tiebreaker`. Because the draw is below one it only ever
//! reorders candidates with equal integer scores.

use crate::candidate::{CandidateId, CandidateRecord};
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use serde::Serialize;
use std::cmp::Ordering;
use thiserror::Error;

/// Winner selection errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectError {
    #[error("No candidates to select from")]
    Empty,
}

/// One candidate's position in a ranking.
#[derive(Debug, Clone, Serialize)]
pub struct RankedEntry {
    /// Candidate id.
    pub id: CandidateId,
    /// Integer score at selection time.
    pub score: i64,
    /// Random draw added to the score for this selection only.
    pub tiebreaker: f64,
}

impl RankedEntry {
    /// The value candidates are ranked by.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn rank_value(&self) -> f64 {
        self.score as f64 + self.tiebreaker
    }
}

/// Result of a selection: the winner and the ranking it came from.
#[derive(Debug, Clone)]
pub struct Selection {
    /// The winning candidate.
    pub winner: CandidateRecord,
    /// Every candidate, best first.
    pub ranking: Vec<RankedEntry>,
}

/// Picks the highest-scoring candidate, breaking ties randomly.
pub struct WinnerSelector {
    rng: Box<dyn RngCore + Send>,
}

impl std::fmt::Debug for WinnerSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WinnerSelector").finish_non_exhaustive()
    }
}

impl Default for WinnerSelector {
    fn default() -> Self {
        Self::from_entropy()
    }
}

impl WinnerSelector {
    /// Create a selector drawing tiebreakers from `rng`.
    #[must_use]
    pub fn new(rng: impl RngCore + Send + 'static) -> Self {
        Self { rng: Box::new(rng) }
    }

    /// Create a selector seeded from the operating system.
    #[must_use]
    pub fn from_entropy() -> Self {
        Self::new(StdRng::from_entropy())
    }

    /// Create a deterministic selector.
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }

    /// Rank `candidates` and return the winner.
    ///
    /// Tiebreakers are drawn in the order the candidates are given.
    ///
    /// # Errors
    ///
    /// Returns `Empty` if there are no candidates.
    pub fn select_winner(&mut self, candidates: Vec<CandidateRecord>) -> Result<Selection, SelectError> {
        let mut ranked: Vec<(RankedEntry, CandidateRecord)> = candidates
            .into_iter()
            .map(|candidate| {
                let entry = RankedEntry {
                    id: candidate.id,
                    score: candidate.score,
                    tiebreaker: self.rng.gen_range(0.0..1.0),
                };
                (entry, candidate)
            })
            .collect();

        ranked.sort_by(|(a, _), (b, _)| compare_entries(b, a));

        let mut entries = ranked.into_iter();
        let (first, winner) = entries.next().ok_or(SelectError::Empty)?;
        let ranking = std::iter::once(first)
            .chain(entries.map(|(entry, _)| entry))
            .collect();

        Ok(Selection { winner, ranking })
    }
}

/// Order by integer score first, then by the draw. Comparing the score
/// separately keeps large scores from losing the tiebreaker to float rounding.
fn compare_entries(a: &RankedEntry, b: &RankedEntry) -> Ordering {
    a.score
        .cmp(&b.score)
        .then_with(|| a.tiebreaker.total_cmp(&b.tiebreaker))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::UserId;

    fn candidate(id: u64, score: i64) -> CandidateRecord {
        let mut record = CandidateRecord::new(CandidateId::new(id), UserId::new(id), "", vec![]);
        record.score = score;
        record
    }

    #[test]
    fn test_empty_selection() {
        let mut selector = WinnerSelector::seeded(1);
        assert_eq!(selector.select_winner(Vec::new()).err(), Some(SelectError::Empty));
    }

    #[test]
    fn test_highest_score_wins() -> Result<(), Box<dyn std::error::Error>> {
        let mut selector = WinnerSelector::seeded(7);
        for _ in 0..50 {
            let selection = selector.select_winner(vec![
                candidate(1, 3),
                candidate(2, 9),
                candidate(3, -2),
                candidate(4, 8),
            ])?;
            assert_eq!(selection.winner.id, CandidateId::new(2));
            let scores: Vec<i64> = selection.ranking.iter().map(|e| e.score).collect();
            assert_eq!(scores, vec![9, 8, 3, -2]);
        }
        Ok(())
    }

    #[test]
    fn test_tie_broken_by_draw() -> Result<(), Box<dyn std::error::Error>> {
        let seed = 42;
        let mut expected_rng = StdRng::seed_from_u64(seed);
        let draws: Vec<f64> = (0..2).map(|_| expected_rng.gen_range(0.0..1.0)).collect();
        let expected = if draws[0] > draws[1] { 1 } else { 2 };

        let mut selector = WinnerSelector::seeded(seed);
        let selection = selector.select_winner(vec![candidate(1, 5), candidate(2, 5)])?;

        assert_eq!(selection.winner.id, CandidateId::new(expected));
        assert!((selection.ranking[0].tiebreaker - draws[expected as usize - 1]).abs() < f64::EPSILON);
        Ok(())
    }

    #[test]
    fn test_fresh_draw_every_call() -> Result<(), Box<dyn std::error::Error>> {
        let mut selector = WinnerSelector::seeded(3);
        let mut winners = std::collections::HashSet::new();
        for _ in 0..200 {
            let selection = selector.select_winner(vec![candidate(1, 0), candidate(2, 0), candidate(3, 0)])?;
            winners.insert(selection.winner.id);
        }
        // Three-way ties resolve differently across calls.
        assert_eq!(winners.len(), 3);
        Ok(())
    }

    #[test]
    fn test_tiebreakers_stay_in_unit_range() -> Result<(), Box<dyn std::error::Error>> {
        let mut selector = WinnerSelector::seeded(11);
        let candidates = (0..100).map(|id| candidate(id, 0)).collect();
        let selection = selector.select_winner(candidates)?;
        assert!(selection
            .ranking
            .iter()
            .all(|entry| (0.0..1.0).contains(&entry.tiebreaker)));
        Ok(())
    }
}

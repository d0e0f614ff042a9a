//! Weighted reaction scoring.

use crate::candidate::CandidateId;
use crate::store::{CandidateStore, StoreError};
use std::collections::HashMap;
use tracing::{debug, info};

/// Whether a reaction was added or taken away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReactionSign {
    /// The reaction was added.
    Added,
    /// The reaction was removed.
    Removed,
}

impl ReactionSign {
    /// +1 for an addition, -1 for a removal.
    #[must_use]
    pub const fn factor(self) -> i64 {
        match self {
            Self::Added => 1,
            Self::Removed => -1,
        }
    }
}

impl std::fmt::Display for ReactionSign {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Added => write!(f, "added"),
            Self::Removed => write!(f, "removed"),
        }
    }
}

/// Turns reaction events into score deltas using the configured weights.
///
/// Only tracked emoji move the score. The favorite emoji is never tracked
/// here; it belongs to the favorite tracker.
#[derive(Debug, Clone, Default)]
pub struct ScoringEngine {
    weights: HashMap<String, i64>,
}

impl ScoringEngine {
    /// Create an engine from an emoji to weight table.
    #[must_use]
    pub fn new(weights: HashMap<String, i64>) -> Self {
        Self { weights }
    }

    /// Weight of `emoji`, if it is tracked.
    #[must_use]
    pub fn weight(&self, emoji: &str) -> Option<i64> {
        self.weights.get(emoji).copied()
    }

    /// Tracked emoji, in no particular order.
    pub fn tracked_emoji(&self) -> impl Iterator<Item = &str> {
        self.weights.keys().map(String::as_str)
    }

    /// Apply one reaction event to a candidate's score.
    ///
    /// Returns the new score, or `None` when the emoji is not tracked and the
    /// event was ignored. Reactions by the candidate's own author count like
    /// any other.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the candidate is unknown, or a storage error.
    pub fn apply_reaction(
        &self,
        store: &dyn CandidateStore,
        candidate: CandidateId,
        emoji: &str,
        sign: ReactionSign,
    ) -> Result<Option<i64>, StoreError> {
        let Some(weight) = self.weight(emoji) else {
            debug!("Ignoring untracked reaction {emoji} on {candidate}");
            return Ok(None);
        };

        let score = store.apply_score_delta(candidate, sign.factor() * weight)?;
        info!("Reaction {emoji} {sign} on {candidate} (weight {weight}), score now {score}");
        Ok(Some(score))
    }
}

//! One favorite per voter.
//!
//! Each voter may hold a single favorite, worth one point, at a time.
//! Favoriting a second candidate moves the point and asks the platform to
//! take the old reaction away. The platform later echoes that removal back
//! as an ordinary "reaction removed" event; the pending table recognises the
//! echo so the old candidate is not decremented twice.
//!
//! The tracker never talks to the platform itself. Its outcomes say which
//! reaction, if any, the caller has to remove.

use crate::candidate::{CandidateId, UserId};
use crate::config::FavoritesConfig;
use crate::store::{CandidateStore, StoreError};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Result of a favorite being added.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FavoriteOutcome {
    /// The voter reacted to their own candidate. Nothing changed; the
    /// reaction has to be removed on the platform.
    OwnCandidate,

    /// The favorite now points at the candidate.
    Favorited {
        /// The candidate's new score.
        score: i64,
        /// Previous favorite whose reaction has to be removed on the platform.
        revoked: Option<CandidateId>,
    },

    /// The voter already favorites this candidate (duplicate delivery).
    AlreadyFavorite,
}

/// Result of a favorite reaction being removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnfavoriteOutcome {
    /// The voter dropped their favorite.
    Unfavorited {
        /// The candidate's new score.
        score: i64,
    },

    /// Echo of a removal we requested; already accounted for.
    RevocationEcho,

    /// The voter held no favorite on this candidate.
    NotHeld,
}

/// Favorite index plus the pending self-removal table.
#[derive(Debug)]
pub struct FavoriteTracker {
    /// Voter to favorited candidate.
    index: HashMap<UserId, CandidateId>,
    /// Revocations awaiting their platform echo, with when they were issued.
    pending: HashMap<(UserId, CandidateId), Instant>,
    pending_ttl: Duration,
    pending_cap: usize,
}

impl Default for FavoriteTracker {
    fn default() -> Self {
        Self::new(FavoritesConfig::default())
    }
}

impl FavoriteTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new(config: FavoritesConfig) -> Self {
        Self {
            index: HashMap::new(),
            pending: HashMap::new(),
            pending_ttl: config.pending_ttl(),
            pending_cap: config.pending_cap.max(1),
        }
    }

    /// Record `voter` favoriting `candidate`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the candidate is unknown, or a storage error. No
    /// favorite state changes unless the score change was persisted.
    pub fn add_favorite(
        &mut self,
        store: &dyn CandidateStore,
        voter: UserId,
        candidate: CandidateId,
    ) -> Result<FavoriteOutcome, StoreError> {
        self.expire_pending();

        let record = store.get(candidate)?;
        if record.is_authored_by(voter) {
            info!("{voter} tried to favorite their own candidate {candidate}");
            return Ok(FavoriteOutcome::OwnCandidate);
        }

        let (score, revoked) = match self.index.get(&voter).copied() {
            Some(current) if current == candidate => {
                debug!("{voter} already favorites {candidate}");
                return Ok(FavoriteOutcome::AlreadyFavorite);
            }
            Some(previous) => {
                match store.apply_score_deltas(&[(previous, -1), (candidate, 1)]) {
                    Ok(scores) => match scores.as_slice() {
                        [_, score] => (*score, Some(previous)),
                        _ => return Err(StoreError::NotFound(candidate)),
                    },
                    Err(StoreError::NotFound(missing)) if missing == previous => {
                        warn!("Previous favorite {previous} of {voter} no longer exists");
                        self.index.remove(&voter);
                        (store.apply_score_delta(candidate, 1)?, None)
                    }
                    Err(e) => return Err(e),
                }
            }
            None => (store.apply_score_delta(candidate, 1)?, None),
        };

        if let Some(previous) = revoked {
            self.remember_revocation(voter, previous);
            info!("{voter} moved their favorite from {previous} to {candidate}");
        } else {
            info!("{candidate} favorited by {voter}, score now {score}");
        }

        self.index.insert(voter, candidate);
        if self.pending.remove(&(voter, candidate)).is_some() {
            debug!("Dropped pending revocation of {candidate} for {voter}: favorited again");
        }

        Ok(FavoriteOutcome::Favorited { score, revoked })
    }

    /// Record `voter`'s favorite reaction disappearing from `candidate`.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the score change could not be persisted;
    /// the favorite index is left untouched in that case.
    pub fn remove_favorite(
        &mut self,
        store: &dyn CandidateStore,
        voter: UserId,
        candidate: CandidateId,
    ) -> Result<UnfavoriteOutcome, StoreError> {
        self.expire_pending();

        if self.pending.remove(&(voter, candidate)).is_some() {
            debug!("Revocation of {voter}'s favorite on {candidate} echoed back");
            return Ok(UnfavoriteOutcome::RevocationEcho);
        }

        if self.index.get(&voter) != Some(&candidate) {
            debug!("{voter} held no favorite on {candidate}");
            return Ok(UnfavoriteOutcome::NotHeld);
        }

        let score = store.apply_score_delta(candidate, -1)?;
        self.index.remove(&voter);
        info!("{candidate} unfavorited by {voter}, score now {score}");
        Ok(UnfavoriteOutcome::Unfavorited { score })
    }

    /// Drop every favorite and pending revocation that refers to a deleted
    /// candidate.
    pub fn forget_candidate(&mut self, candidate: CandidateId) {
        self.index.retain(|_, favorite| *favorite != candidate);
        self.pending.retain(|(_, revoked), _| *revoked != candidate);
    }

    /// Drop all favorite state (cycle reset).
    pub fn clear(&mut self) {
        self.index.clear();
        self.pending.clear();
    }

    /// The candidate `voter` currently favorites.
    #[must_use]
    pub fn favorite_of(&self, voter: UserId) -> Option<CandidateId> {
        self.index.get(&voter).copied()
    }

    /// Number of voters holding a favorite.
    #[must_use]
    pub fn active_favorites(&self) -> usize {
        self.index.len()
    }

    /// Number of favorites on one candidate.
    #[must_use]
    pub fn favorites_on(&self, candidate: CandidateId) -> usize {
        self.index.values().filter(|c| **c == candidate).count()
    }

    /// Whether a revocation of `voter`'s favorite on `candidate` awaits its echo.
    #[must_use]
    pub fn is_pending(&self, voter: UserId, candidate: CandidateId) -> bool {
        self.pending.contains_key(&(voter, candidate))
    }

    /// Number of revocations awaiting their echo.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn remember_revocation(&mut self, voter: UserId, candidate: CandidateId) {
        if self.pending.len() >= self.pending_cap {
            let oldest = self
                .pending
                .iter()
                .min_by_key(|(_, issued)| **issued)
                .map(|(key, _)| *key);
            if let Some((old_voter, old_candidate)) = oldest {
                warn!("Pending revocations full; forgetting {old_voter} on {old_candidate}");
                self.pending.remove(&(old_voter, old_candidate));
            }
        }
        self.pending.insert((voter, candidate), Instant::now());
    }

    fn expire_pending(&mut self) {
        let now = Instant::now();
        let ttl = self.pending_ttl;
        self.pending.retain(|(voter, candidate), issued| {
            let alive = now.duration_since(*issued) < ttl;
            if !alive {
                warn!("Revocation of {voter}'s favorite on {candidate} never echoed back");
            }
            alive
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::{AttachmentBlob, CandidateRecord};
    use crate::store::SqliteCandidateStore;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    const AUTHOR_A: UserId = UserId::new(1);
    const AUTHOR_B: UserId = UserId::new(2);
    const VOTER: UserId = UserId::new(10);
    const A: CandidateId = CandidateId::new(100);
    const B: CandidateId = CandidateId::new(200);

    fn setup() -> Result<(TempDir, SqliteCandidateStore), Box<dyn std::error::Error>> {
        let temp_dir = TempDir::new()?;
        let store = SqliteCandidateStore::in_memory(temp_dir.path())?;
        store.create(A, AUTHOR_A, "a", &[])?;
        store.create(B, AUTHOR_B, "b", &[])?;
        Ok((temp_dir, store))
    }

    #[test]
    fn test_favorite_and_unfavorite() -> Result<(), Box<dyn std::error::Error>> {
        let (_temp_dir, store) = setup()?;
        let mut tracker = FavoriteTracker::default();

        let outcome = tracker.add_favorite(&store, VOTER, A)?;
        assert_eq!(outcome, FavoriteOutcome::Favorited { score: 1, revoked: None });
        assert_eq!(tracker.favorite_of(VOTER), Some(A));

        let outcome = tracker.remove_favorite(&store, VOTER, A)?;
        assert_eq!(outcome, UnfavoriteOutcome::Unfavorited { score: 0 });
        assert_eq!(tracker.favorite_of(VOTER), None);
        assert_eq!(store.get(A)?.score, 0);
        Ok(())
    }

    #[test]
    fn test_own_candidate_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
        let (_temp_dir, store) = setup()?;
        let mut tracker = FavoriteTracker::default();

        assert_eq!(tracker.add_favorite(&store, AUTHOR_A, A)?, FavoriteOutcome::OwnCandidate);
        assert_eq!(store.get(A)?.score, 0);
        assert_eq!(tracker.favorite_of(AUTHOR_A), None);

        // The platform echoes our reversal; nothing to undo.
        assert_eq!(tracker.remove_favorite(&store, AUTHOR_A, A)?, UnfavoriteOutcome::NotHeld);
        assert_eq!(store.get(A)?.score, 0);
        Ok(())
    }

    #[test]
    fn test_reassignment_moves_one_point() -> Result<(), Box<dyn std::error::Error>> {
        let (_temp_dir, store) = setup()?;
        let mut tracker = FavoriteTracker::default();

        tracker.add_favorite(&store, VOTER, A)?;
        let outcome = tracker.add_favorite(&store, VOTER, B)?;
        assert_eq!(outcome, FavoriteOutcome::Favorited { score: 1, revoked: Some(A) });
        assert!(tracker.is_pending(VOTER, A));
        assert_eq!(store.get(A)?.score, 0);
        assert_eq!(store.get(B)?.score, 1);

        // Echo of the revocation we asked for.
        let outcome = tracker.remove_favorite(&store, VOTER, A)?;
        assert_eq!(outcome, UnfavoriteOutcome::RevocationEcho);
        assert_eq!(store.get(A)?.score, 0);
        assert_eq!(tracker.favorite_of(VOTER), Some(B));
        assert_eq!(tracker.pending_len(), 0);
        Ok(())
    }

    #[test]
    fn test_refavorite_before_echo_clears_pending() -> Result<(), Box<dyn std::error::Error>> {
        let (_temp_dir, store) = setup()?;
        let mut tracker = FavoriteTracker::default();

        tracker.add_favorite(&store, VOTER, A)?;
        tracker.add_favorite(&store, VOTER, B)?;
        let outcome = tracker.add_favorite(&store, VOTER, A)?;

        assert_eq!(outcome, FavoriteOutcome::Favorited { score: 1, revoked: Some(B) });
        assert!(!tracker.is_pending(VOTER, A));
        assert!(tracker.is_pending(VOTER, B));
        assert_eq!(store.get(A)?.score, 1);
        assert_eq!(store.get(B)?.score, 0);
        Ok(())
    }

    #[test]
    fn test_duplicate_add_is_idempotent() -> Result<(), Box<dyn std::error::Error>> {
        let (_temp_dir, store) = setup()?;
        let mut tracker = FavoriteTracker::default();

        tracker.add_favorite(&store, VOTER, A)?;
        assert_eq!(tracker.add_favorite(&store, VOTER, A)?, FavoriteOutcome::AlreadyFavorite);
        assert_eq!(store.get(A)?.score, 1);
        Ok(())
    }

    #[test]
    fn test_missing_candidate() -> Result<(), Box<dyn std::error::Error>> {
        let (_temp_dir, store) = setup()?;
        let mut tracker = FavoriteTracker::default();

        let result = tracker.add_favorite(&store, VOTER, CandidateId::new(999));
        assert!(matches!(result, Err(StoreError::NotFound(_))));
        assert_eq!(tracker.active_favorites(), 0);
        Ok(())
    }

    #[test]
    fn test_reassignment_from_deleted_candidate() -> Result<(), Box<dyn std::error::Error>> {
        let (_temp_dir, store) = setup()?;
        let mut tracker = FavoriteTracker::default();

        tracker.add_favorite(&store, VOTER, A)?;
        // Deleted behind the tracker's back.
        store.delete(A)?;

        let outcome = tracker.add_favorite(&store, VOTER, B)?;
        assert_eq!(outcome, FavoriteOutcome::Favorited { score: 1, revoked: None });
        assert_eq!(tracker.pending_len(), 0);
        Ok(())
    }

    #[test]
    fn test_forget_candidate() -> Result<(), Box<dyn std::error::Error>> {
        let (_temp_dir, store) = setup()?;
        let mut tracker = FavoriteTracker::default();

        tracker.add_favorite(&store, VOTER, A)?;
        tracker.add_favorite(&store, UserId::new(11), A)?;
        tracker.add_favorite(&store, UserId::new(12), B)?;
        assert_eq!(tracker.favorites_on(A), 2);

        tracker.forget_candidate(A);
        assert_eq!(tracker.favorites_on(A), 0);
        assert_eq!(tracker.active_favorites(), 1);

        tracker.clear();
        assert_eq!(tracker.active_favorites(), 0);
        Ok(())
    }

    #[test]
    fn test_pending_cap_evicts_oldest() -> Result<(), Box<dyn std::error::Error>> {
        let (_temp_dir, store) = setup()?;
        let mut tracker = FavoriteTracker::new(FavoritesConfig {
            pending_ttl_secs: 300,
            pending_cap: 1,
        });

        tracker.add_favorite(&store, VOTER, A)?;
        tracker.add_favorite(&store, VOTER, B)?;
        tracker.add_favorite(&store, UserId::new(11), A)?;
        tracker.add_favorite(&store, UserId::new(11), B)?;

        assert_eq!(tracker.pending_len(), 1);
        assert!(tracker.is_pending(UserId::new(11), A));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_entries_expire() -> Result<(), Box<dyn std::error::Error>> {
        let (_temp_dir, store) = setup()?;
        let mut tracker = FavoriteTracker::new(FavoritesConfig {
            pending_ttl_secs: 60,
            pending_cap: 16,
        });

        tracker.add_favorite(&store, VOTER, A)?;
        tracker.add_favorite(&store, VOTER, B)?;
        assert!(tracker.is_pending(VOTER, A));

        tokio::time::advance(Duration::from_secs(61)).await;

        // Any later event sweeps the stale entry.
        let outcome = tracker.remove_favorite(&store, UserId::new(99), B)?;
        assert_eq!(outcome, UnfavoriteOutcome::NotHeld);
        assert!(!tracker.is_pending(VOTER, A));
        assert_eq!(tracker.pending_len(), 0);
        assert_eq!(tracker.favorite_of(VOTER), Some(B));
        Ok(())
    }

    #[test]
    fn test_storage_failure_leaves_index_untouched() -> Result<(), Box<dyn std::error::Error>> {
        let temp_dir = TempDir::new()?;
        let store = SqliteCandidateStore::in_memory(temp_dir.path().join("files"))?;
        store.create(A, AUTHOR_A, "a", &[])?;
        let mut tracker = FavoriteTracker::default();
        tracker.add_favorite(&store, VOTER, A)?;
        store.apply_score_delta(A, i64::MAX - 1)?;

        // The next point would overflow the score column.
        store.create(B, AUTHOR_B, "b", &[])?;
        store.apply_score_delta(B, i64::MAX)?;
        let result = tracker.add_favorite(&store, VOTER, B);

        assert!(matches!(result, Err(ref e) if e.is_storage_failure()));
        assert_eq!(tracker.favorite_of(VOTER), Some(A));
        assert_eq!(tracker.pending_len(), 0);
        assert_eq!(store.get(A)?.score, i64::MAX);
        Ok(())
    }

    /// Reads pass through; every score write fails.
    struct ReadOnlyStore<'a>(&'a SqliteCandidateStore);

    impl CandidateStore for ReadOnlyStore<'_> {
        fn create(
            &self,
            id: CandidateId,
            author_id: UserId,
            content: &str,
            attachments: &[AttachmentBlob],
        ) -> Result<CandidateRecord, StoreError> {
            self.0.create(id, author_id, content, attachments)
        }

        fn get(&self, id: CandidateId) -> Result<CandidateRecord, StoreError> {
            self.0.get(id)
        }

        fn update_content(&self, id: CandidateId, content: &str) -> Result<(), StoreError> {
            self.0.update_content(id, content)
        }

        fn apply_score_deltas(&self, _deltas: &[(CandidateId, i64)]) -> Result<Vec<i64>, StoreError> {
            Err(StoreError::Io(std::io::Error::other("disk full")))
        }

        fn delete(&self, id: CandidateId) -> Result<(), StoreError> {
            self.0.delete(id)
        }

        fn list_all(&self) -> Result<Vec<CandidateRecord>, StoreError> {
            self.0.list_all()
        }

        fn reset_all(&self) -> Result<usize, StoreError> {
            self.0.reset_all()
        }

        fn count(&self) -> Result<u64, StoreError> {
            self.0.count()
        }

        fn attachment_path(&self, id: CandidateId, name: &str) -> PathBuf {
            self.0.attachment_path(id, name)
        }

        fn export_attachments(
            &self,
            record: &CandidateRecord,
            outbox: &Path,
        ) -> Result<Vec<PathBuf>, StoreError> {
            self.0.export_attachments(record, outbox)
        }
    }

    #[test]
    fn test_failed_unfavorite_keeps_favorite() -> Result<(), Box<dyn std::error::Error>> {
        let (_temp_dir, store) = setup()?;
        let mut tracker = FavoriteTracker::default();
        tracker.add_favorite(&store, VOTER, A)?;

        let result = tracker.remove_favorite(&ReadOnlyStore(&store), VOTER, A);

        assert!(matches!(result, Err(ref e) if e.is_storage_failure()));
        assert_eq!(tracker.favorite_of(VOTER), Some(A));
        assert_eq!(tracker.active_favorites(), 1);
        assert_eq!(store.get(A)?.score, 1);

        // Redelivery once storage recovers still takes the point back.
        let outcome = tracker.remove_favorite(&store, VOTER, A)?;
        assert_eq!(outcome, UnfavoriteOutcome::Unfavorited { score: 0 });
        assert_eq!(tracker.favorite_of(VOTER), None);
        Ok(())
    }
}

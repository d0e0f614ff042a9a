//! Event routing.
//!
//! [`MotdEngine`] owns nothing itself. It holds the shared [`MotdState`]
//! (store, scoring, favorites) behind one lock, applies each platform event
//! to it, and then performs whatever platform side effect the event calls
//! for once the lock has been released.

use crate::candidate::{CandidateId, ChannelId, UserId};
use crate::events::{EventFilter, PlatformEvent};
use crate::favorites::{FavoriteOutcome, FavoriteTracker, UnfavoriteOutcome};
use crate::platform::ReactionControl;
use crate::scoring::{ReactionSign, ScoringEngine};
use crate::store::{CandidateStore, StoreError};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Everything a cycle or an event may read and mutate.
pub struct MotdState {
    /// Candidate records and attachments.
    pub store: Box<dyn CandidateStore>,
    /// Reaction weights.
    pub scoring: ScoringEngine,
    /// Favorite index and pending revocations.
    pub favorites: FavoriteTracker,
}

impl MotdState {
    /// Bundle the three parts of the engine state.
    #[must_use]
    pub fn new(store: Box<dyn CandidateStore>, scoring: ScoringEngine, favorites: FavoriteTracker) -> Self {
        Self {
            store,
            scoring,
            favorites,
        }
    }

    /// Wrap the state for sharing between the event loop and cycles.
    #[must_use]
    pub fn shared(self) -> SharedState {
        Arc::new(Mutex::new(self))
    }

    /// Delete one candidate and every favorite pointing at it.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the candidate is unknown, or a storage error.
    pub fn delete_candidate(&mut self, id: CandidateId) -> Result<(), StoreError> {
        let result = self.store.delete(id);
        if matches!(result, Ok(()) | Err(StoreError::NotFound(_))) {
            self.favorites.forget_candidate(id);
        }
        result
    }

    /// Clear every candidate and all favorite state.
    ///
    /// # Errors
    ///
    /// Returns a storage error; favorite state is kept in that case.
    pub fn reset(&mut self) -> Result<usize, StoreError> {
        let cleared = self.store.reset_all()?;
        self.favorites.clear();
        Ok(cleared)
    }
}

/// State shared between the event loop, cycles and admin commands.
pub type SharedState = Arc<Mutex<MotdState>>;

/// Reaction the platform has to take away after an event was applied.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Revocation {
    candidate: CandidateId,
    voter: UserId,
}

/// Applies platform events to the shared state.
#[derive(Clone)]
pub struct MotdEngine {
    state: SharedState,
    reactions: Arc<dyn ReactionControl>,
    filter: EventFilter,
    favorite_emoji: Arc<str>,
}

impl MotdEngine {
    /// Create an engine over `state`.
    #[must_use]
    pub fn new(
        state: SharedState,
        reactions: Arc<dyn ReactionControl>,
        filter: EventFilter,
        favorite_emoji: &str,
    ) -> Self {
        Self {
            state,
            reactions,
            filter,
            favorite_emoji: Arc::from(favorite_emoji),
        }
    }

    /// The shared state this engine mutates.
    #[must_use]
    pub fn state(&self) -> &SharedState {
        &self.state
    }

    /// Apply one platform event.
    ///
    /// Events about unknown candidates and duplicate creations are logged and
    /// ignored; they are benign races with deletion or redelivery.
    ///
    /// # Errors
    ///
    /// Returns storage failures only.
    pub async fn handle_event(&self, event: PlatformEvent) -> Result<(), StoreError> {
        if !self.filter.accepts(&event) {
            debug!("Filtered {} for {}", event.kind(), event.candidate());
            return Ok(());
        }

        match event {
            PlatformEvent::CandidateCreated {
                id,
                channel,
                author,
                content,
                attachments,
            } => {
                let created = {
                    let state = self.state.lock().await;
                    absorb(state.store.create(id, author, &content, &attachments))?
                };
                if let Some(record) = created {
                    info!(
                        "Candidate {id} by {author} saved with {} attachment(s)",
                        record.attachments.len()
                    );
                    self.seed_reactions(id, channel).await;
                }
            }

            PlatformEvent::CandidateEdited { id, content, .. } => {
                let Some(content) = content else {
                    debug!("Candidate {id} edit carried no content; ignored");
                    return Ok(());
                };
                let state = self.state.lock().await;
                if absorb(state.store.update_content(id, &content))?.is_some() {
                    info!("Candidate {id} content updated");
                }
            }

            PlatformEvent::CandidateDeleted { id, .. } => {
                let mut state = self.state.lock().await;
                if absorb(state.delete_candidate(id))?.is_some() {
                    info!("Candidate {id} deleted");
                }
            }

            PlatformEvent::ReactionAdded {
                id,
                channel,
                voter,
                emoji,
            } => {
                if *emoji == *self.favorite_emoji {
                    let revocation = {
                        let mut state = self.state.lock().await;
                        let MotdState {
                            store, favorites, ..
                        } = &mut *state;
                        absorb(favorites.add_favorite(store.as_ref(), voter, id))?
                            .and_then(|outcome| revocation_for(outcome, id, voter))
                    };
                    if let Some(revocation) = revocation {
                        self.revoke(revocation, channel).await;
                    }
                } else {
                    let state = self.state.lock().await;
                    absorb(state.scoring.apply_reaction(
                        state.store.as_ref(),
                        id,
                        &emoji,
                        ReactionSign::Added,
                    ))?;
                }
            }

            PlatformEvent::ReactionRemoved {
                id, voter, emoji, ..
            } => {
                let mut state = self.state.lock().await;
                if *emoji == *self.favorite_emoji {
                    let MotdState {
                        store, favorites, ..
                    } = &mut *state;
                    if let Some(UnfavoriteOutcome::NotHeld) =
                        absorb(favorites.remove_favorite(store.as_ref(), voter, id))?
                    {
                        debug!("Favorite removal by {voter} on {id} needed no change");
                    }
                } else {
                    absorb(state.scoring.apply_reaction(
                        state.store.as_ref(),
                        id,
                        &emoji,
                        ReactionSign::Removed,
                    ))?;
                }
            }
        }

        Ok(())
    }

    /// Put every tracked emoji and the favorite emoji on a new candidate.
    async fn seed_reactions(&self, id: CandidateId, channel: ChannelId) {
        let mut emoji: Vec<(String, i64)> = {
            let state = self.state.lock().await;
            state
                .scoring
                .tracked_emoji()
                .map(|e| (e.to_string(), state.scoring.weight(e).unwrap_or_default()))
                .collect()
        };
        emoji.sort_by(|(a, wa), (b, wb)| wb.cmp(wa).then_with(|| a.cmp(b)));

        let favorite = self.favorite_emoji.to_string();
        for emoji in emoji.into_iter().map(|(e, _)| e).chain(std::iter::once(favorite)) {
            if let Err(e) = self.reactions.add_reaction(id, channel, &emoji).await {
                warn!("Failed to add {emoji} to candidate {id}: {e}");
            }
        }
    }

    async fn revoke(&self, revocation: Revocation, channel: ChannelId) {
        let Revocation { candidate, voter } = revocation;
        if let Err(e) = self
            .reactions
            .remove_reaction(candidate, channel, voter, &self.favorite_emoji)
            .await
        {
            warn!("Failed to remove favorite of {voter} from {candidate}: {e}");
        }
    }
}

fn revocation_for(outcome: FavoriteOutcome, candidate: CandidateId, voter: UserId) -> Option<Revocation> {
    match outcome {
        FavoriteOutcome::OwnCandidate => Some(Revocation { candidate, voter }),
        FavoriteOutcome::Favorited {
            revoked: Some(previous),
            ..
        } => Some(Revocation {
            candidate: previous,
            voter,
        }),
        FavoriteOutcome::Favorited { revoked: None, .. } | FavoriteOutcome::AlreadyFavorite => None,
    }
}

/// Turn lookup misses into logged no-ops, keeping real storage failures.
fn absorb<T>(result: Result<T, StoreError>) -> Result<Option<T>, StoreError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(StoreError::NotFound(id)) => {
            warn!("Candidate {id} not found; event ignored");
            Ok(None)
        }
        Err(StoreError::AlreadyExists(id)) => {
            warn!("Candidate {id} already recorded; existing record kept");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

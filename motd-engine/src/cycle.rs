//! The daily selection cycle.
//!
//! A cycle moves through the following phases while holding the state lock,
//! so no event interleaves with it:
//!
//! ```text
//! Idle ──► Selecting ──► Publishing ──► Resetting ──► Idle
//!              │
//!              └── no candidates ──────────────────► Idle
//! ```
//!
//! The winner's attachments are copied into the outbox before publishing, so
//! the publisher can still read them after the reset has emptied the store.
//! A failed publish is logged and the reset still happens. Only one cycle
//! runs at a time; a second trigger while one is in flight is rejected.

use crate::candidate::{CandidateId, CandidateRecord, ChannelId, UserId};
use crate::engine::{MotdState, SharedState};
use crate::platform::{PublishRequest, Publisher};
use crate::selector::{SelectError, WinnerSelector};
use crate::store::StoreError;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, watch};
use tracing::{error, info};

/// Where a cycle currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CyclePhase {
    Idle,
    Selecting,
    Publishing,
    Resetting,
}

impl fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Selecting => write!(f, "selecting"),
            Self::Publishing => write!(f, "publishing"),
            Self::Resetting => write!(f, "resetting"),
        }
    }
}

/// What started a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleTrigger {
    Schedule,
    Manual,
}

impl fmt::Display for CycleTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Schedule => write!(f, "schedule"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

/// Cycle errors.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("A selection cycle is already running")]
    AlreadyRunning,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// How a cycle ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CycleReport {
    /// Nothing was posted since the last reset.
    NoCandidates,

    /// A winner was chosen and the candidate set was cleared.
    Completed {
        winner: CandidateId,
        author: UserId,
        score: i64,
        published: bool,
        cleared: usize,
    },
}

/// Runs selection cycles against the shared state.
pub struct CycleManager {
    state: SharedState,
    // Held for the duration of a cycle; `try_lock` failing means one is running.
    selector: Mutex<WinnerSelector>,
    publisher: Arc<dyn Publisher>,
    target_channel: ChannelId,
    outbox: PathBuf,
    phase: watch::Sender<CyclePhase>,
}

impl CycleManager {
    /// Create a manager publishing winners to `target_channel`, handing
    /// their attachments over through `outbox`.
    #[must_use]
    pub fn new(
        state: SharedState,
        selector: WinnerSelector,
        publisher: Arc<dyn Publisher>,
        target_channel: ChannelId,
        outbox: impl Into<PathBuf>,
    ) -> Self {
        let (phase, _) = watch::channel(CyclePhase::Idle);
        Self {
            state,
            selector: Mutex::new(selector),
            publisher,
            target_channel,
            outbox: outbox.into(),
            phase,
        }
    }

    /// The phase the manager is in right now.
    #[must_use]
    pub fn phase(&self) -> CyclePhase {
        *self.phase.borrow()
    }

    /// Watch phase transitions.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CyclePhase> {
        self.phase.subscribe()
    }

    /// Select, publish and reset.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyRunning` if another cycle is in flight, or a storage
    /// error if the candidates could not be read or cleared.
    pub async fn run_cycle(&self, trigger: CycleTrigger) -> Result<CycleReport, CycleError> {
        let mut selector = self
            .selector
            .try_lock()
            .map_err(|_| CycleError::AlreadyRunning)?;
        let mut state = self.state.lock().await;

        info!("Starting selection cycle ({trigger})");
        let result = self.run_locked(&mut state, &mut selector).await;
        self.set_phase(CyclePhase::Idle);

        match &result {
            Ok(report) => info!("Selection cycle finished: {report:?}"),
            Err(e) => error!("Selection cycle failed: {e}"),
        }
        result
    }

    async fn run_locked(
        &self,
        state: &mut MotdState,
        selector: &mut WinnerSelector,
    ) -> Result<CycleReport, CycleError> {
        self.set_phase(CyclePhase::Selecting);
        let candidates = state.store.list_all()?;
        let selection = match selector.select_winner(candidates) {
            Ok(selection) => selection,
            Err(SelectError::Empty) => {
                info!("No candidates this cycle");
                return Ok(CycleReport::NoCandidates);
            }
        };

        for (rank, entry) in selection.ranking.iter().enumerate() {
            info!(
                "#{} candidate {} score {} (draw {:.4})",
                rank + 1,
                entry.id,
                entry.score,
                entry.tiebreaker
            );
        }

        let winner = selection.winner;
        self.set_phase(CyclePhase::Publishing);
        let published = match state.store.export_attachments(&winner, &self.outbox) {
            Ok(attachments) => {
                let request = PublishRequest {
                    author: winner.author_id,
                    content: winner_text(&winner),
                    attachments,
                    channel: self.target_channel,
                };
                self.publish(&winner, request).await
            }
            Err(e) => {
                error!("Failed to hand over attachments of candidate {}: {e}", winner.id);
                false
            }
        };

        self.set_phase(CyclePhase::Resetting);
        let cleared = state.reset()?;

        Ok(CycleReport::Completed {
            winner: winner.id,
            author: winner.author_id,
            score: winner.score,
            published,
            cleared,
        })
    }

    async fn publish(&self, winner: &CandidateRecord, request: PublishRequest) -> bool {
        match self.publisher.publish(request).await {
            Ok(()) => {
                info!("Published candidate {} by {}", winner.id, winner.author_id);
                true
            }
            Err(e) => {
                error!("Failed to publish candidate {}: {e}", winner.id);
                false
            }
        }
    }

    fn set_phase(&self, phase: CyclePhase) {
        self.phase.send_replace(phase);
    }
}

/// The text posted for a winner: its content followed by the final score.
#[must_use]
pub fn winner_text(winner: &CandidateRecord) -> String {
    format!("{}\n> Score: {}", winner.content, winner.score)
}

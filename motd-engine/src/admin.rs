//! Administrative commands.
//!
//! Permission checks belong to whoever delivers the commands. Destructive
//! bulk deletion is two-phase: the first `delete_all` returns a token, and
//! only a second `delete_all` carrying that token before it expires clears
//! the store.

use crate::candidate::{CandidateId, UserId};
use crate::cycle::{CycleManager, CycleReport, CycleTrigger};
use crate::engine::SharedState;
use crate::store::StoreError;
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{error, info, warn};

const TOKEN_LEN: usize = 12;

/// A command from an administrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AdminCommand {
    /// Run a selection cycle now.
    RunCycle,
    /// Delete one candidate.
    Delete { id: CandidateId },
    /// Delete every candidate. Needs a confirmation token.
    DeleteAll {
        #[serde(default)]
        confirm: Option<String>,
    },
    /// Show the current candidates.
    List,
}

/// One line of a candidate listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateSummary {
    /// Source message id.
    pub id: CandidateId,
    /// Member who posted it.
    pub author: UserId,
    /// Current score, favorite points included.
    pub score: i64,
    /// Voters whose favorite is this candidate.
    pub favorites: usize,
    /// Number of stored attachments.
    pub attachments: usize,
}

/// Reply to an [`AdminCommand`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AdminReply {
    Cycle { report: CycleReport },
    Deleted { id: CandidateId },
    ConfirmationRequired { token: String, expires_in_secs: u64 },
    Cleared { count: usize },
    Candidates { candidates: Vec<CandidateSummary> },
    Error { message: String },
}

impl AdminReply {
    fn error(message: impl ToString) -> Self {
        Self::Error {
            message: message.to_string(),
        }
    }
}

/// Why a confirmation token was refused.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfirmError {
    #[error("No confirmation is pending")]
    NothingPending,

    #[error("Confirmation token expired")]
    Expired,

    #[error("Confirmation token does not match")]
    Mismatch,
}

#[derive(Debug)]
struct IssuedToken {
    token: String,
    expires_at: Instant,
}

/// Issues and checks single-use confirmation tokens.
#[derive(Debug)]
pub struct ConfirmationGate {
    ttl: Duration,
    issued: Option<IssuedToken>,
}

impl ConfirmationGate {
    /// Create a gate whose tokens live for `ttl`.
    #[must_use]
    pub const fn new(ttl: Duration) -> Self {
        Self { ttl, issued: None }
    }

    /// Issue a fresh token, replacing any outstanding one.
    pub fn issue(&mut self) -> String {
        let token: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(TOKEN_LEN)
            .map(char::from)
            .collect();
        self.issued = Some(IssuedToken {
            token: token.clone(),
            expires_at: Instant::now() + self.ttl,
        });
        token
    }

    /// Consume the outstanding token if `token` matches it.
    ///
    /// # Errors
    ///
    /// Fails if nothing was issued, the token expired (it is discarded), or
    /// the token is wrong (it stays valid).
    pub fn confirm(&mut self, token: &str) -> Result<(), ConfirmError> {
        let issued = self.issued.take().ok_or(ConfirmError::NothingPending)?;
        if Instant::now() >= issued.expires_at {
            return Err(ConfirmError::Expired);
        }
        if issued.token != token {
            self.issued = Some(issued);
            return Err(ConfirmError::Mismatch);
        }
        Ok(())
    }

    /// Token lifetime.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }
}

/// Executes admin commands against the shared state.
pub struct AdminConsole {
    state: SharedState,
    cycles: Arc<CycleManager>,
    gate: Mutex<ConfirmationGate>,
}

impl AdminConsole {
    /// Create a console acting on `state` and triggering cycles through
    /// `cycles`. Delete-all tokens expire after `confirm_ttl`.
    #[must_use]
    pub fn new(state: SharedState, cycles: Arc<CycleManager>, confirm_ttl: Duration) -> Self {
        Self {
            state,
            cycles,
            gate: Mutex::new(ConfirmationGate::new(confirm_ttl)),
        }
    }

    /// Run `command`. Failures come back as [`AdminReply::Error`].
    pub async fn execute(&self, command: AdminCommand) -> AdminReply {
        info!("Admin command: {command:?}");
        match command {
            AdminCommand::RunCycle => match self.cycles.run_cycle(CycleTrigger::Manual).await {
                Ok(report) => AdminReply::Cycle { report },
                Err(e) => AdminReply::error(e),
            },

            AdminCommand::Delete { id } => {
                let mut state = self.state.lock().await;
                match state.delete_candidate(id) {
                    Ok(()) => {
                        info!("Admin deleted candidate {id}");
                        AdminReply::Deleted { id }
                    }
                    Err(e @ StoreError::NotFound(_)) => {
                        warn!("Admin delete: {e}");
                        AdminReply::error(e)
                    }
                    Err(e) => {
                        error!("Admin delete of {id} failed: {e}");
                        AdminReply::error(e)
                    }
                }
            }

            AdminCommand::DeleteAll { confirm: None } => {
                let mut gate = self.gate.lock().await;
                let token = gate.issue();
                AdminReply::ConfirmationRequired {
                    token,
                    expires_in_secs: gate.ttl().as_secs(),
                }
            }

            AdminCommand::DeleteAll {
                confirm: Some(token),
            } => {
                if let Err(e) = self.gate.lock().await.confirm(&token) {
                    warn!("Admin delete-all refused: {e}");
                    return AdminReply::error(e);
                }
                let mut state = self.state.lock().await;
                match state.reset() {
                    Ok(count) => {
                        info!("Admin cleared {count} candidate(s)");
                        AdminReply::Cleared { count }
                    }
                    Err(e) => {
                        error!("Admin delete-all failed: {e}");
                        AdminReply::error(e)
                    }
                }
            }

            AdminCommand::List => {
                let state = self.state.lock().await;
                match state.store.list_all() {
                    Ok(records) => {
                        let mut candidates: Vec<CandidateSummary> = records
                            .into_iter()
                            .map(|record| CandidateSummary {
                                id: record.id,
                                author: record.author_id,
                                score: record.score,
                                favorites: state.favorites.favorites_on(record.id),
                                attachments: record.attachments.len(),
                            })
                            .collect();
                        candidates.sort_by(|a, b| b.score.cmp(&a.score).then(a.id.cmp(&b.id)));
                        AdminReply::Candidates { candidates }
                    }
                    Err(e) => AdminReply::error(e),
                }
            }
        }
    }
}

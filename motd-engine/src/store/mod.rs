//! Durable candidate storage.
//!
//! Candidates live in two places that are kept in step:
//! - a SQLite table holding one row per candidate (the full record)
//! - an attachment directory holding the files each candidate was posted with

pub mod attachments;
pub mod sqlite;

pub use attachments::AttachmentDir;
pub use sqlite::SqliteCandidateStore;

use crate::candidate::{AttachmentBlob, CandidateId, CandidateRecord, UserId};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Candidate store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Candidate not found: {0}")]
    NotFound(CandidateId),

    #[error("Candidate already exists: {0}")]
    AlreadyExists(CandidateId),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),
}

impl StoreError {
    /// Check whether this is a persistence failure rather than a lookup miss.
    #[must_use]
    pub fn is_storage_failure(&self) -> bool {
        !matches!(self, Self::NotFound(_) | Self::AlreadyExists(_))
    }
}

/// Transactional storage for candidate records and their attachments.
///
/// Every mutating call is all-or-nothing: a failed call leaves neither a
/// partial record nor orphaned attachment files behind.
pub trait CandidateStore: Send + Sync {
    /// Record a new candidate with a zero score, persisting its attachments.
    fn create(
        &self,
        id: CandidateId,
        author_id: UserId,
        content: &str,
        attachments: &[AttachmentBlob],
    ) -> Result<CandidateRecord, StoreError>;

    /// Fetch a candidate.
    fn get(&self, id: CandidateId) -> Result<CandidateRecord, StoreError>;

    /// Replace a candidate's text body.
    fn update_content(&self, id: CandidateId, content: &str) -> Result<(), StoreError>;

    /// Apply several score deltas in one transaction, returning the new
    /// scores in the same order. Fails with the first missing id and applies
    /// nothing in that case.
    fn apply_score_deltas(&self, deltas: &[(CandidateId, i64)]) -> Result<Vec<i64>, StoreError>;

    /// Add `delta` to a candidate's score and return the new score.
    fn apply_score_delta(&self, id: CandidateId, delta: i64) -> Result<i64, StoreError> {
        let scores = self.apply_score_deltas(&[(id, delta)])?;
        scores.first().copied().ok_or(StoreError::NotFound(id))
    }

    /// Remove a candidate and its attachments permanently.
    fn delete(&self, id: CandidateId) -> Result<(), StoreError>;

    /// Every stored candidate. Order carries no meaning.
    fn list_all(&self) -> Result<Vec<CandidateRecord>, StoreError>;

    /// Remove every candidate and attachment, leaving an empty store.
    /// Returns how many candidates were cleared.
    fn reset_all(&self) -> Result<usize, StoreError>;

    /// Number of stored candidates.
    fn count(&self) -> Result<u64, StoreError>;

    /// Location of a stored attachment.
    fn attachment_path(&self, id: CandidateId, name: &str) -> PathBuf;

    /// Copy a candidate's attachments out of the store into `outbox`, where
    /// they outlive [`reset_all`](Self::reset_all). Returns the copies in
    /// posting order.
    fn export_attachments(
        &self,
        record: &CandidateRecord,
        outbox: &Path,
    ) -> Result<Vec<PathBuf>, StoreError>;
}

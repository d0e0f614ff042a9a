//! SQLite-backed candidate store.
//!
//! One row per candidate; attachment names are kept as a JSON array next to
//! the record, the bytes themselves live in an [`AttachmentDir`].

use super::{AttachmentDir, CandidateStore, StoreError};
use crate::candidate::{AttachmentBlob, CandidateId, CandidateRecord, UserId};
use rusqlite::{Connection, OptionalExtension, Transaction, params};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::warn;

const SCHEMA: &str = r"
    CREATE TABLE IF NOT EXISTS candidates (
        id INTEGER PRIMARY KEY,
        author_id INTEGER NOT NULL,
        content TEXT NOT NULL,
        attachments_json TEXT NOT NULL,
        score INTEGER NOT NULL DEFAULT 0,
        created_at TEXT DEFAULT CURRENT_TIMESTAMP
    );

    CREATE INDEX IF NOT EXISTS idx_candidates_score ON candidates(score);
";

/// SQLite candidate store.
pub struct SqliteCandidateStore {
    /// Database connection.
    conn: Mutex<Connection>,
    /// Attachment files.
    attachments: AttachmentDir,
}

impl SqliteCandidateStore {
    /// Open (or create) a candidate database and attachment directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized, or
    /// the attachment directory cannot be created.
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(
        db_path: P,
        attachment_dir: Q,
    ) -> Result<Self, StoreError> {
        Self::with_connection(Connection::open(db_path)?, attachment_dir)
    }

    /// Create a store with an in-memory database (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialized.
    pub fn in_memory<Q: AsRef<Path>>(attachment_dir: Q) -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?, attachment_dir)
    }

    fn with_connection<Q: AsRef<Path>>(conn: Connection, attachment_dir: Q) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            attachments: AttachmentDir::new(attachment_dir)?,
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|e| StoreError::LockPoisoned(format!("conn lock: {e}")))
    }
}

#[allow(clippy::cast_possible_wrap)]
const fn to_sql(raw: u64) -> i64 {
    raw as i64
}

#[allow(clippy::cast_sign_loss)]
const fn from_sql(raw: i64) -> u64 {
    raw as u64
}

fn exists(tx: &Transaction<'_>, id: CandidateId) -> Result<bool, rusqlite::Error> {
    tx.query_row(
        "SELECT 1 FROM candidates WHERE id = ?",
        [to_sql(id.get())],
        |_| Ok(()),
    )
    .optional()
    .map(|found| found.is_some())
}

fn row_to_record(row: &rusqlite::Row<'_>) -> Result<CandidateRecord, rusqlite::Error> {
    let id: i64 = row.get(0)?;
    let author_id: i64 = row.get(1)?;
    let content: String = row.get(2)?;
    let attachments_json: String = row.get(3)?;
    let score: i64 = row.get(4)?;

    let attachments = serde_json::from_str(&attachments_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(CandidateRecord {
        id: CandidateId::new(from_sql(id)),
        author_id: UserId::new(from_sql(author_id)),
        content,
        attachments,
        score,
    })
}

impl CandidateStore for SqliteCandidateStore {
    fn create(
        &self,
        id: CandidateId,
        author_id: UserId,
        content: &str,
        attachments: &[AttachmentBlob],
    ) -> Result<CandidateRecord, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        // Checked before touching the files so a duplicate never clobbers
        // the existing candidate's attachments.
        if exists(&tx, id)? {
            return Err(StoreError::AlreadyExists(id));
        }

        let names = self.attachments.write_all(id, attachments)?;
        let record = CandidateRecord::new(id, author_id, content, names);

        let persisted = serde_json::to_string(&record.attachments)
            .map_err(StoreError::from)
            .and_then(|attachments_json| {
                tx.execute(
                    r"
                    INSERT INTO candidates (id, author_id, content, attachments_json, score)
                    VALUES (?, ?, ?, ?, 0)
                    ",
                    params![
                        to_sql(id.get()),
                        to_sql(author_id.get()),
                        record.content,
                        attachments_json,
                    ],
                )?;
                tx.commit()?;
                Ok(())
            });

        if let Err(e) = persisted {
            if let Err(cleanup) = self.attachments.remove(id) {
                warn!("Failed to remove attachments of unsaved candidate {id}: {cleanup}");
            }
            return Err(e);
        }

        Ok(record)
    }

    fn get(&self, id: CandidateId) -> Result<CandidateRecord, StoreError> {
        let conn = self.lock()?;
        conn.query_row(
            r"
            SELECT id, author_id, content, attachments_json, score
            FROM candidates
            WHERE id = ?
            ",
            [to_sql(id.get())],
            row_to_record,
        )
        .optional()?
        .ok_or(StoreError::NotFound(id))
    }

    fn update_content(&self, id: CandidateId, content: &str) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE candidates SET content = ? WHERE id = ?",
            params![content, to_sql(id.get())],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    fn apply_score_deltas(&self, deltas: &[(CandidateId, i64)]) -> Result<Vec<i64>, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let mut scores = Vec::with_capacity(deltas.len());
        for &(id, delta) in deltas {
            let score: Option<i64> = tx
                .query_row(
                    "UPDATE candidates SET score = score + ? WHERE id = ? RETURNING score",
                    params![delta, to_sql(id.get())],
                    |row| row.get(0),
                )
                .optional()?;
            // Returning early drops the transaction, rolling back earlier deltas.
            scores.push(score.ok_or(StoreError::NotFound(id))?);
        }

        tx.commit()?;
        Ok(scores)
    }

    fn delete(&self, id: CandidateId) -> Result<(), StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let deleted = tx.execute("DELETE FROM candidates WHERE id = ?", [to_sql(id.get())])?;
        if deleted == 0 {
            return Err(StoreError::NotFound(id));
        }

        let staged = self.attachments.stage_removal(id)?;
        if let Err(e) = tx.commit() {
            if let Err(restore) = staged.rollback() {
                warn!("Failed to restore attachments of candidate {id}: {restore}");
            }
            return Err(e.into());
        }

        if let Err(e) = staged.commit() {
            warn!("Candidate {id} deleted but its attachments could not be removed: {e}");
        }
        Ok(())
    }

    fn list_all(&self) -> Result<Vec<CandidateRecord>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r"
            SELECT id, author_id, content, attachments_json, score
            FROM candidates
            ORDER BY id ASC
            ",
        )?;

        let records = stmt.query_map([], row_to_record)?;

        records.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    fn reset_all(&self) -> Result<usize, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let cleared = tx.execute("DELETE FROM candidates", [])?;

        let staged = self.attachments.stage_clear()?;
        if let Err(e) = tx.commit() {
            if let Err(restore) = staged.rollback() {
                warn!("Failed to restore attachments after aborted reset: {restore}");
            }
            return Err(e.into());
        }

        if let Err(e) = staged.commit() {
            warn!("Store reset but old attachments could not be removed: {e}");
        }
        Ok(cleared)
    }

    fn count(&self) -> Result<u64, StoreError> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM candidates", [], |row| row.get(0))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    fn attachment_path(&self, id: CandidateId, name: &str) -> PathBuf {
        self.attachments.path(id, name)
    }

    fn export_attachments(
        &self,
        record: &CandidateRecord,
        outbox: &Path,
    ) -> Result<Vec<PathBuf>, StoreError> {
        Ok(self.attachments.export(record.id, &record.attachments, outbox)?)
    }
}

//! On-disk attachment files, one directory per candidate.
//!
//! Removals go through a rename into a staging name first so the caller can
//! still undo them until its database transaction commits.

use crate::candidate::{AttachmentBlob, CandidateId};
use std::io;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Root directory holding `<candidate id>/<attachment name>` files.
#[derive(Debug, Clone)]
pub struct AttachmentDir {
    root: PathBuf,
}

/// A directory moved aside by a removal, pending commit or rollback.
#[derive(Debug)]
#[must_use = "a staged removal must be committed or rolled back"]
pub struct StagedRemoval {
    original: PathBuf,
    staged: Option<PathBuf>,
}

impl StagedRemoval {
    /// Delete the staged files for good.
    pub fn commit(self) -> io::Result<()> {
        match self.staged {
            Some(staged) => remove_dir_if_present(&staged),
            None => Ok(()),
        }
    }

    /// Put the staged files back where they were, replacing anything
    /// created at the original location since.
    pub fn rollback(self) -> io::Result<()> {
        match self.staged {
            Some(staged) => {
                remove_dir_if_present(&self.original)?;
                std::fs::rename(staged, &self.original)
            }
            None => Ok(()),
        }
    }
}

impl AttachmentDir {
    /// Open (creating if needed) an attachment root.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn new<P: AsRef<Path>>(root: P) -> io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// The attachment root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding one candidate's attachments.
    #[must_use]
    pub fn candidate_dir(&self, id: CandidateId) -> PathBuf {
        self.root.join(id.to_string())
    }

    /// Path of one stored attachment.
    #[must_use]
    pub fn path(&self, id: CandidateId, name: &str) -> PathBuf {
        self.candidate_dir(id).join(name)
    }

    /// Write a candidate's attachments and return their stored names.
    ///
    /// Leftover files from an earlier, uncommitted write are replaced. On
    /// failure nothing is left behind.
    pub fn write_all(&self, id: CandidateId, blobs: &[AttachmentBlob]) -> io::Result<Vec<String>> {
        let dir = self.candidate_dir(id);
        remove_dir_if_present(&dir)?;
        std::fs::create_dir_all(&dir)?;

        let written = blobs
            .iter()
            .enumerate()
            .map(|(index, blob)| {
                let name = blob.stored_name(index);
                std::fs::write(dir.join(&name), &blob.bytes)?;
                Ok(name)
            })
            .collect::<io::Result<Vec<_>>>();

        if written.is_err() {
            if let Err(cleanup) = remove_dir_if_present(&dir) {
                warn!("Failed to clean up partial attachments of {id}: {cleanup}");
            }
        }
        written
    }

    /// Copy a candidate's attachments into `outbox/<id>/`, returning the
    /// copies in the order of `names`.
    ///
    /// The copies belong to whoever publishes them and survive a store
    /// reset. An earlier export of the same candidate is replaced. On
    /// failure nothing is left behind.
    pub fn export(&self, id: CandidateId, names: &[String], outbox: &Path) -> io::Result<Vec<PathBuf>> {
        let dest = outbox.join(id.to_string());
        remove_dir_if_present(&dest)?;
        std::fs::create_dir_all(&dest)?;

        let copied = names
            .iter()
            .map(|name| {
                let target = dest.join(name);
                std::fs::copy(self.path(id, name), &target)?;
                Ok(target)
            })
            .collect::<io::Result<Vec<_>>>();

        if copied.is_err() {
            if let Err(cleanup) = remove_dir_if_present(&dest) {
                warn!("Failed to clean up partial export of {id}: {cleanup}");
            }
        }
        copied
    }

    /// Remove a candidate's attachment directory right away.
    pub fn remove(&self, id: CandidateId) -> io::Result<()> {
        remove_dir_if_present(&self.candidate_dir(id))
    }

    /// Move a candidate's attachments aside so the removal can be undone.
    pub fn stage_removal(&self, id: CandidateId) -> io::Result<StagedRemoval> {
        let original = self.candidate_dir(id);
        stage(original, self.root.join(format!(".removed-{id}")))
    }

    /// Move every attachment aside and recreate an empty root.
    pub fn stage_clear(&self) -> io::Result<StagedRemoval> {
        let name = self
            .root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "attachments".to_string());
        let staged = self.root.with_file_name(format!(".{name}.cleared"));
        let removal = stage(self.root.clone(), staged)?;
        if let Err(e) = std::fs::create_dir_all(&self.root) {
            if let Err(restore) = removal.rollback() {
                warn!("Failed to restore attachments under {}: {restore}", self.root.display());
            }
            return Err(e);
        }
        Ok(removal)
    }
}

fn stage(original: PathBuf, staged: PathBuf) -> io::Result<StagedRemoval> {
    if !original.exists() {
        return Ok(StagedRemoval {
            original,
            staged: None,
        });
    }
    remove_dir_if_present(&staged)?;
    std::fs::rename(&original, &staged)?;
    Ok(StagedRemoval {
        original,
        staged: Some(staged),
    })
}

fn remove_dir_if_present(dir: &Path) -> io::Result<()> {
    match std::fs::remove_dir_all(dir) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

//! Undo journal for filesystem changes made during one import transaction.
//!
//! Database writes roll back with their SQLite transaction; the journal
//! gives pool and queue files the same all-or-nothing behaviour. Removed
//! files are parked in a scratch directory until the journal is committed.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, warn};

use crate::error::{ArchiveError, Result};
use crate::pool::place_file;

#[derive(Debug)]
enum Action {
    Placed {
        dst: PathBuf,
        moved_from: Option<PathBuf>,
    },
    Removed {
        original: PathBuf,
        parked: PathBuf,
    },
}

/// Records filesystem changes so they can be undone.
#[derive(Debug)]
pub struct Journal {
    scratch_parent: PathBuf,
    scratch: Option<TempDir>,
    actions: Vec<Action>,
}

impl Journal {
    /// Create a journal parking removed files below `scratch_parent`.
    ///
    /// The parent should be on the same filesystem as the files the
    /// journal will remove so parking is a rename.
    pub fn new(scratch_parent: impl Into<PathBuf>) -> Self {
        Self {
            scratch_parent: scratch_parent.into(),
            scratch: None,
            actions: Vec::new(),
        }
    }

    /// Number of recorded changes.
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// True when nothing was changed.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Place a file without overwriting, see [`place_file`].
    ///
    /// # Errors
    ///
    /// Propagates [`place_file`] errors; nothing is recorded on failure.
    pub fn place(&mut self, src: &Path, dst: &Path, retain: bool) -> Result<()> {
        place_file(src, dst, retain)?;
        self.actions.push(Action::Placed {
            dst: dst.to_path_buf(),
            moved_from: (!retain).then(|| src.to_path_buf()),
        });
        Ok(())
    }

    /// Place a file, parking any existing destination first.
    ///
    /// # Errors
    ///
    /// Propagates I/O and placement errors.
    pub fn replace(&mut self, src: &Path, dst: &Path, retain: bool) -> Result<()> {
        if dst.exists() {
            self.remove(dst)?;
        }
        self.place(src, dst, retain)
    }

    /// Remove a file, keeping a copy until commit. Missing files are ignored.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be parked.
    pub fn remove(&mut self, path: &Path) -> Result<()> {
        if !path.is_file() {
            return Ok(());
        }
        let parked = self.scratch_dir()?.join(self.actions.len().to_string());
        move_file(path, &parked)?;
        self.actions.push(Action::Removed {
            original: path.to_path_buf(),
            parked,
        });
        Ok(())
    }

    fn scratch_dir(&mut self) -> Result<PathBuf> {
        if let Some(dir) = &self.scratch {
            return Ok(dir.path().to_path_buf());
        }
        std::fs::create_dir_all(&self.scratch_parent)
            .map_err(|e| ArchiveError::io_at(&self.scratch_parent, e))?;
        let dir = tempfile::Builder::new()
            .prefix(".journal-")
            .tempdir_in(&self.scratch_parent)?;
        let path = dir.path().to_path_buf();
        self.scratch = Some(dir);
        Ok(path)
    }

    /// Keep every change and drop parked files.
    pub fn commit(self) {
        debug!(changes = self.actions.len(), "committing file journal");
    }

    /// Undo every change, newest first.
    ///
    /// All steps are attempted; the first failure is returned.
    ///
    /// # Errors
    ///
    /// Returns the first I/O error encountered while restoring.
    pub fn rollback(mut self) -> Result<()> {
        let mut first_error = None;
        while let Some(action) = self.actions.pop() {
            if let Err(e) = undo(&action) {
                warn!(?action, error = %e, "failed to undo file change");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

fn undo(action: &Action) -> Result<()> {
    match action {
        Action::Placed { dst, moved_from } => {
            if let Some(src) = moved_from {
                if !src.exists() {
                    move_file(dst, src)?;
                    return Ok(());
                }
            }
            std::fs::remove_file(dst).map_err(|e| ArchiveError::io_at(dst, e))
        }
        Action::Removed { original, parked } => move_file(parked, original),
    }
}

fn move_file(from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ArchiveError::io_at(parent, e))?;
    }
    if std::fs::rename(from, to).is_ok() {
        return Ok(());
    }
    std::fs::copy(from, to).map_err(|e| ArchiveError::io_at(to, e))?;
    std::fs::remove_file(from).map_err(|e| ArchiveError::io_at(from, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rollback_restores_moved_and_removed_files() {
        let dir = tempfile::tempdir().unwrap();
        let upload = dir.path().join("incoming/foo_1.0.dsc");
        let placed = dir.path().join("pool/f/foo/foo_1.0.dsc");
        let old = dir.path().join("queue/pool/f/foo/foo_0.9.dsc");
        std::fs::create_dir_all(upload.parent().unwrap()).unwrap();
        std::fs::create_dir_all(old.parent().unwrap()).unwrap();
        std::fs::write(&upload, b"new").unwrap();
        std::fs::write(&old, b"old").unwrap();

        let mut journal = Journal::new(dir.path().join("queue"));
        journal.place(&upload, &placed, false).unwrap();
        journal.remove(&old).unwrap();
        assert_eq!(journal.len(), 2);
        assert!(!upload.exists());
        assert!(!old.exists());

        journal.rollback().unwrap();
        assert_eq!(std::fs::read(&upload).unwrap(), b"new");
        assert_eq!(std::fs::read(&old).unwrap(), b"old");
        assert!(!placed.exists());
    }

    #[test]
    fn commit_keeps_changes() {
        let dir = tempfile::tempdir().unwrap();
        let upload = dir.path().join("foo.deb");
        let placed = dir.path().join("pool/foo.deb");
        std::fs::write(&upload, b"x").unwrap();

        let mut journal = Journal::new(dir.path());
        journal.place(&upload, &placed, true).unwrap();
        journal.commit();
        assert!(placed.exists());
        assert!(upload.exists());
    }

    #[test]
    fn replace_parks_existing_destination() {
        let dir = tempfile::tempdir().unwrap();
        let upload = dir.path().join("foo.deb");
        let queued = dir.path().join("new/foo.deb");
        std::fs::create_dir_all(queued.parent().unwrap()).unwrap();
        std::fs::write(&upload, b"fresh").unwrap();
        std::fs::write(&queued, b"stale").unwrap();

        let mut journal = Journal::new(dir.path());
        journal.replace(&upload, &queued, false).unwrap();
        assert_eq!(std::fs::read(&queued).unwrap(), b"fresh");

        journal.rollback().unwrap();
        assert_eq!(std::fs::read(&queued).unwrap(), b"stale");
        assert_eq!(std::fs::read(&upload).unwrap(), b"fresh");
    }
}

//! Named publish locks.
//!
//! Every operation that mutates the published state of a repository-suite
//! takes the suite's publish lock first. Locks are advisory file locks, so
//! they are shared between processes and released when the guard drops,
//! including on panics and early returns.

use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use fs4::FileExt;
use tracing::debug;

use crate::error::{ArchiveError, Result};

/// Lock name guarding the publication of one repository-suite.
pub fn publish_lock_name(repo: &str, suite: &str) -> String {
    format!("publish_{repo}-{suite}")
}

/// A held named lock; released on drop.
#[derive(Debug)]
pub struct LockGuard {
    name: String,
    _file: File,
}

impl LockGuard {
    /// Name of the held lock.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        debug!(lock = %self.name, "released lock");
    }
}

/// Directory of named lock files.
#[derive(Debug, Clone)]
pub struct LockDir {
    root: PathBuf,
}

impl LockDir {
    /// Use `root` for lock files, creating it on first use.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn open(&self, name: &str) -> Result<File> {
        std::fs::create_dir_all(&self.root).map_err(|e| ArchiveError::io_at(&self.root, e))?;
        let path = self.lock_path(name);
        OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| ArchiveError::io_at(&path, e))
    }

    fn lock_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.lock"))
    }

    /// Block until the named lock is held.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::Lock`] if locking fails for a reason other
    /// than contention.
    pub fn acquire(&self, name: &str) -> Result<LockGuard> {
        let file = self.open(name)?;
        debug!(lock = name, "waiting for lock");
        file.lock_exclusive().map_err(|e| ArchiveError::Lock {
            name: name.to_string(),
            message: e.to_string(),
        })?;
        Ok(LockGuard {
            name: name.to_string(),
            _file: file,
        })
    }

    /// Take the named lock if it is free.
    ///
    /// Returns `Ok(None)` when another holder has it.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::Lock`] if locking fails for a reason other
    /// than contention.
    pub fn try_acquire(&self, name: &str) -> Result<Option<LockGuard>> {
        let file = self.open(name)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(LockGuard {
                name: name.to_string(),
                _file: file,
            })),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(ArchiveError::Lock {
                name: name.to_string(),
                message: e.to_string(),
            }),
        }
    }

    /// Take the publish lock of a repository-suite, blocking or not.
    ///
    /// In non-blocking mode a busy lock is reported as [`ArchiveError::Lock`].
    ///
    /// # Errors
    ///
    /// See [`LockDir::acquire`] and [`LockDir::try_acquire`].
    pub fn lock_publish(&self, repo: &str, suite: &str, wait: bool) -> Result<LockGuard> {
        let name = publish_lock_name(repo, suite);
        if wait {
            return self.acquire(&name);
        }
        self.try_acquire(&name)?.ok_or_else(|| ArchiveError::Lock {
            message: "held by another process".to_string(),
            name,
        })
    }

    /// Directory holding the lock files.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_names_follow_repo_and_suite() {
        assert_eq!(publish_lock_name("master", "unstable"), "publish_master-unstable");
    }

    #[test]
    fn second_nonblocking_acquire_fails_until_release() {
        let dir = tempfile::tempdir().unwrap();
        let locks = LockDir::new(dir.path());

        let guard = locks.lock_publish("master", "unstable", false).unwrap();
        assert_eq!(guard.name(), "publish_master-unstable");
        assert!(locks.try_acquire("publish_master-unstable").unwrap().is_none());
        assert!(matches!(
            locks.lock_publish("master", "unstable", false),
            Err(ArchiveError::Lock { .. })
        ));
        // other suites are independent
        assert!(locks.lock_publish("master", "testing", false).is_ok());

        drop(guard);
        assert!(locks.lock_publish("master", "unstable", false).is_ok());
    }

    #[test]
    fn blocking_acquire_waits_for_holder() {
        let dir = tempfile::tempdir().unwrap();
        let locks = LockDir::new(dir.path());
        let guard = locks.acquire("publish_master-unstable").unwrap();

        let waiter = {
            let locks = locks.clone();
            std::thread::spawn(move || locks.acquire("publish_master-unstable").map(|_| ()))
        };
        std::thread::sleep(std::time::Duration::from_millis(50));
        assert!(!waiter.is_finished());
        drop(guard);
        waiter.join().unwrap().unwrap();
    }
}

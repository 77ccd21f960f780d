//! Command implementations and the state they share.

pub mod admin;
pub mod depcheck;
pub mod import;
pub mod new;
pub mod repo;
pub mod upload;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, Result};
use archivist_core::ArchiveError;
use archivist_core::config::ArchiveConfig;
use archivist_core::journal::Journal;
use archivist_core::lock::LockDir;
use archivist_core::signature::{GpgVerifier, SignatureVerifier, SignedContent};
use archivist_core::store::{ArchiveDb, Session};
use tracing::debug;

/// Configuration and shared handles for one invocation.
#[derive(Debug)]
pub struct Context {
    pub config: ArchiveConfig,
    pub locks: LockDir,
}

impl Context {
    /// Load configuration from `path`, or from the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => ArchiveConfig::load(path),
            None => ArchiveConfig::from_env(),
        }
        .context("Failed to load configuration")?;
        debug!(workspace = %config.workspace.display(), "configuration loaded");
        Ok(Self::new(config))
    }

    pub fn new(config: ArchiveConfig) -> Self {
        Self {
            locks: LockDir::new(config.lock_dir()),
            config,
        }
    }

    /// Open (and create, if needed) the archive database.
    pub fn open_db(&self) -> Result<ArchiveDb> {
        ArchiveDb::open_at(&self.config.database).with_context(|| {
            format!(
                "Failed to open archive database {}",
                self.config.database.display()
            )
        })
    }

    /// gpg-backed verifier; when gpg is missing, every verification fails.
    pub fn verifier(&self) -> Arc<dyn SignatureVerifier> {
        match GpgVerifier::new(&self.config.gpg_binary) {
            Ok(gpg) => Arc::new(gpg),
            Err(e) => {
                debug!("signature verification unavailable: {e}");
                Arc::new(Unavailable(e.to_string()))
            }
        }
    }
}

#[derive(Debug)]
struct Unavailable(String);

impl SignatureVerifier for Unavailable {
    fn verify(&self, _: &[u8], _: &[PathBuf], _: bool) -> archivist_core::Result<SignedContent> {
        Err(ArchiveError::Config(self.0.clone()))
    }
}

/// Commit `session` and `journal` on success, roll both back otherwise.
pub fn finish<T>(
    session: Session<'_>,
    journal: Journal,
    result: archivist_core::Result<T>,
) -> archivist_core::Result<T> {
    match result {
        Ok(value) => {
            if let Err(e) = session.commit() {
                journal.rollback()?;
                return Err(e);
            }
            journal.commit();
            Ok(value)
        }
        Err(e) => {
            journal.rollback()?;
            session.rollback()?;
            Err(e)
        }
    }
}

//! Accepting and rejecting uploads held in the NEW queue.

use std::path::{Path, PathBuf};

use archivist_schema::{DebType, DebVersion};
use tracing::{debug, info, warn};

use crate::checksum::verify_file;
use crate::error::Result;
use crate::importer::{BinaryOutcome, PackageImporter, missing_overrides, register_overrides};
use crate::journal::Journal;

/// What accepting a NEW entry did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AcceptOutcome {
    /// Overrides registered for the source's binaries.
    pub overrides_added: usize,
    /// Queued binaries published along with the source.
    pub binaries_published: usize,
}

/// Reviews NEW entries of one repository-suite.
#[derive(Debug)]
pub struct NewQueueProcessor<'s, 'conn> {
    importer: PackageImporter<'s, 'conn>,
}

impl<'s, 'conn> NewQueueProcessor<'s, 'conn> {
    /// Process NEW through `importer`; queued files are always moved.
    pub fn new(mut importer: PackageImporter<'s, 'conn>) -> Self {
        importer.set_keep_source_packages(false);
        Self { importer }
    }

    /// Hand over the filesystem journal for commit or rollback.
    pub fn into_journal(self) -> Journal {
        self.importer.into_journal()
    }

    /// Accept a queued source into the suite.
    ///
    /// Missing overrides are registered from the source's expected
    /// binaries and its files move from the queue into the pool. Queued
    /// binaries built from this source version are imported afterwards;
    /// those of other versions stay in the queue.
    ///
    /// # Errors
    ///
    /// [`crate::ArchiveError::NotConfigured`] when the source is not
    /// queued, plus ledger, checksum, placement and database failures.
    pub fn accept(&mut self, name: &str, version: &DebVersion) -> Result<AcceptOutcome> {
        let session = self.importer.session();
        let rss = self.importer.repo_suite().clone();
        let (id, spkg) = session.require_new_queue_entry(&rss, name, version)?;
        session.ensure_newer_source(rss.repo_id, name, version)?;

        let missing = missing_overrides(session, &rss, &spkg)?;
        let overrides_added = register_overrides(session, &rss, &missing)?;

        let queue_root = self.importer.queue_root().to_path_buf();
        let pool_root = self.importer.pool_root().to_path_buf();
        for file in &spkg.files {
            let queued = queue_root.join(&file.fname);
            verify_file(&queued, file)?;
            self.importer
                .journal_mut()
                .place(&queued, &pool_root.join(&file.fname), false)?;
        }
        self.importer.publish_source(id, &spkg)?;

        let queue_dir = queue_root.join(&spkg.directory);
        let mut binaries_published = 0;
        for deb in self.queued_binaries_of(&queue_dir, name, version)? {
            match self.importer.import_binary(&deb, Some(&spkg.component))? {
                BinaryOutcome::Published => binaries_published += 1,
                BinaryOutcome::QueuedWithSource => {
                    warn!(deb = %deb.display(), "binary stayed in NEW, its source is still queued");
                }
            }
        }
        remove_if_empty(&queue_dir);

        info!(
            "ACCEPTED: {}/{} -> {}/{}",
            spkg.name, spkg.version, rss, spkg.component
        );
        Ok(AcceptOutcome {
            overrides_added,
            binaries_published,
        })
    }

    /// Reject a queued source: its queued files, the binaries filed with
    /// it, its record and NEW entry are removed.
    ///
    /// # Errors
    ///
    /// [`crate::ArchiveError::NotConfigured`] when the source is not
    /// queued, plus I/O and database failures.
    pub fn reject(&mut self, name: &str, version: &DebVersion) -> Result<()> {
        let session = self.importer.session();
        let rss = self.importer.repo_suite().clone();
        let (id, spkg) = session.require_new_queue_entry(&rss, name, version)?;

        let queue_root = self.importer.queue_root().to_path_buf();
        for file in &spkg.files {
            let queued = queue_root.join(&file.fname);
            if queued.is_file() {
                self.importer.journal_mut().remove(&queued)?;
            }
        }
        let queue_dir = queue_root.join(&spkg.directory);
        for deb in self.queued_binaries_of(&queue_dir, name, version)? {
            self.importer.journal_mut().remove(&deb)?;
        }
        session.delete_source(id)?;
        remove_if_empty(&queue_dir);

        info!(
            "REJECTED: {}/{} (aimed at {}/{})",
            spkg.name, spkg.version, rss, spkg.component
        );
        Ok(())
    }

    /// Binaries in `dir` whose `Source` is `name` at `version`.
    fn queued_binaries_of(
        &self,
        dir: &Path,
        name: &str,
        version: &DebVersion,
    ) -> Result<Vec<PathBuf>> {
        let mut debs = Vec::new();
        for deb in queued_binaries(dir)? {
            let (source_name, source_version) = self.importer.binary_source(&deb)?;
            if source_name == name && source_version == *version {
                debs.push(deb);
            } else {
                debug!(
                    deb = %deb.display(),
                    "skipping binary of {source_name}/{source_version}"
                );
            }
        }
        Ok(debs)
    }
}

/// `.deb` and `.udeb` files filed in a queue directory, sorted.
fn queued_binaries(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut debs = Vec::new();
    for entry in walkdir::WalkDir::new(dir).max_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| std::io::Error::other(e.to_string()))?;
        let is_binary = entry
            .file_name()
            .to_str()
            .and_then(DebType::from_filename)
            .is_some();
        if entry.file_type().is_file() && is_binary {
            debs.push(entry.into_path());
        }
    }
    Ok(debs)
}

fn remove_if_empty(dir: &Path) {
    let empty = std::fs::read_dir(dir).is_ok_and(|mut entries| entries.next().is_none());
    if empty {
        let _ = std::fs::remove_dir(dir);
    }
}

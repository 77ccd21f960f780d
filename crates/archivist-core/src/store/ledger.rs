//! Version ledger: the highest version ever admitted per package.
//!
//! Rows are keyed by (repository, package, architecture); sources use the
//! architecture name [`SOURCE_ARCH`]. Versions only ever go up.

use archivist_schema::{DebVersion, SOURCE_ARCH};
use rusqlite::{OptionalExtension, params};
use tracing::debug;

use super::Session;
use crate::error::{ArchiveError, Result};

impl Session<'_> {
    /// Highest recorded version of a package on an architecture.
    ///
    /// # Errors
    ///
    /// Database failures, or a corrupt stored version.
    pub fn recorded_version(
        &self,
        repo_id: i64,
        package: &str,
        arch: &str,
    ) -> Result<Option<DebVersion>> {
        let raw: Option<String> = self
            .conn()
            .query_row(
                "SELECT highest_version FROM version_memory
                 WHERE repo_id = ?1 AND pkg_name = ?2 AND arch_name = ?3",
                params![repo_id, package, arch],
                |row| row.get(0),
            )
            .optional()?;
        Ok(raw.as_deref().map(DebVersion::parse).transpose()?)
    }

    /// Fail unless `version` is strictly newer than anything recorded.
    ///
    /// # Errors
    ///
    /// [`ArchiveError::VersionRegression`] for equal or lower versions.
    pub fn ensure_newer(
        &self,
        repo_id: i64,
        package: &str,
        arch: &str,
        version: &DebVersion,
    ) -> Result<()> {
        match self.recorded_version(repo_id, package, arch)? {
            Some(recorded) if *version <= recorded => Err(ArchiveError::VersionRegression {
                package: package.to_string(),
                proposed: version.to_string(),
                recorded: recorded.to_string(),
            }),
            _ => Ok(()),
        }
    }

    /// Fail unless `version` is newer than the recorded source version.
    ///
    /// # Errors
    ///
    /// See [`Session::ensure_newer`].
    pub fn ensure_newer_source(
        &self,
        repo_id: i64,
        package: &str,
        version: &DebVersion,
    ) -> Result<()> {
        self.ensure_newer(repo_id, package, SOURCE_ARCH, version)
    }

    /// Record `version` as published, never lowering the ledger.
    ///
    /// # Errors
    ///
    /// Database failures.
    pub fn mark_published(
        &self,
        repo_id: i64,
        package: &str,
        arch: &str,
        version: &DebVersion,
    ) -> Result<()> {
        if let Some(recorded) = self.recorded_version(repo_id, package, arch)? {
            if recorded >= *version {
                debug!(package, arch, %recorded, %version, "ledger already at or above version");
                return Ok(());
            }
        }
        self.conn().execute(
            "INSERT INTO version_memory (repo_id, pkg_name, arch_name, highest_version)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (repo_id, pkg_name, arch_name)
             DO UPDATE SET highest_version = excluded.highest_version",
            params![repo_id, package, arch, version.as_str()],
        )?;
        Ok(())
    }
}

//! Processing signed uploads.
//!
//! [`UploadHandler::process_changes`] is the entry point for everything
//! arriving in an incoming directory. Problems with the upload itself are
//! reported as a rejected [`UploadOutcome`] carrying a reason; only a
//! signature that cannot be trusted or a signer that is not a registered
//! uploader are raised as errors.
//!
//! All artifacts of one upload are imported in a single database session
//! and a single filesystem journal, so an upload is admitted completely or
//! not at all. The suite's publish lock is taken before that session
//! starts.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use archivist_schema::{SOURCE_ARCH, Uploader};
use tracing::{info, warn};

use crate::changes::{Changes, ChangesFile};
use crate::config::ArchiveConfig;
use crate::control::ControlRenderer;
use crate::error::{ArchiveError, Result};
use crate::importer::{BinaryOutcome, PackageImporter, SourceOutcome};
use crate::lock::LockDir;
use crate::signature::SignatureVerifier;
use crate::store::{ArchiveDb, RepoSuite};

/// Final state of an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStatus {
    /// Every artifact was published.
    Accepted,
    /// Stored, but waiting in the NEW queue for review.
    HeldInNew,
    /// Nothing was admitted.
    Rejected,
}

/// What happened to an upload, and who made it.
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    /// Final state.
    pub status: UploadStatus,
    /// Uploader resolved from the signing key.
    pub uploader: Uploader,
    /// Why the upload was rejected or held, prefixed with the uploader's e-mail.
    pub reason: Option<String>,
}

impl UploadOutcome {
    fn published(uploader: Uploader) -> Self {
        Self {
            status: UploadStatus::Accepted,
            uploader,
            reason: None,
        }
    }

    fn held(uploader: Uploader, reason: impl std::fmt::Display) -> Self {
        let reason = format!("{}: {reason}", uploader.email);
        info!("NEW: {reason}");
        Self {
            status: UploadStatus::HeldInNew,
            uploader,
            reason: Some(reason),
        }
    }

    fn rejected(uploader: Uploader, reason: impl std::fmt::Display) -> Self {
        let reason = format!("{}: {reason}", uploader.email);
        warn!("REJECTED: {reason}");
        Self {
            status: UploadStatus::Rejected,
            uploader,
            reason: Some(reason),
        }
    }

    /// Whether the upload was published right away.
    pub fn accepted(&self) -> bool {
        self.status == UploadStatus::Accepted
    }
}

/// Verifies and imports `.changes` uploads into one repository.
#[derive(Debug, Clone)]
pub struct UploadHandler {
    config: ArchiveConfig,
    verifier: Arc<dyn SignatureVerifier>,
    renderer: Arc<dyn ControlRenderer>,
    locks: LockDir,
    keyrings: Vec<PathBuf>,
    keep_source_packages: bool,
}

impl UploadHandler {
    /// Handler using the uploader keyrings and layout from `config`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the uploader keyring directory is unreadable.
    pub fn new(
        config: ArchiveConfig,
        verifier: Arc<dyn SignatureVerifier>,
        renderer: Arc<dyn ControlRenderer>,
    ) -> Result<Self> {
        Ok(Self {
            keyrings: config.uploader_keyrings()?,
            locks: LockDir::new(config.lock_dir()),
            keep_source_packages: config.keep_source_packages,
            config,
            verifier,
            renderer,
        })
    }

    /// Verify upload signatures against these keyrings instead.
    pub fn with_keyrings(mut self, keyrings: Vec<PathBuf>) -> Self {
        self.keyrings = keyrings;
        self
    }

    /// Keep uploaded artifacts in the incoming directory after import.
    pub fn set_keep_source_packages(&mut self, keep: bool) {
        self.keep_source_packages = keep;
    }

    /// Verify and import the upload described by the `.changes` file at `path`.
    ///
    /// # Errors
    ///
    /// [`ArchiveError::SignatureMissing`] and
    /// [`ArchiveError::SignatureInvalid`] when the manifest is not validly
    /// signed, [`ArchiveError::UnknownUploader`] when no uploader owns the
    /// signing key, and lock, database or rollback failures. Everything
    /// else is a rejection.
    pub fn process_changes(&self, db: &mut ArchiveDb, repo: &str, path: &Path) -> Result<UploadOutcome> {
        let display_name = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
        info!(changes = %path.display(), repo, "processing upload");

        let data = std::fs::read(path).map_err(|e| ArchiveError::io_at(path, e))?;
        let signed = self.verifier.verify(&data, &self.keyrings, true)?;

        let (uploader, changes, rss) = {
            let lookup = db.read_session()?;
            let mut uploader = None;
            for fingerprint in &signed.primary_fingerprints {
                uploader = lookup.uploader_by_fingerprint(fingerprint)?;
                if uploader.is_some() {
                    break;
                }
            }
            let Some(uploader) = uploader else {
                return Err(ArchiveError::UnknownUploader {
                    fingerprint: if signed.primary_fingerprints.is_empty() {
                        "(none)".to_string()
                    } else {
                        signed.primary_fingerprints.join(", ")
                    },
                    file: display_name,
                });
            };

            if signed.weak_signature {
                return Ok(UploadOutcome::rejected(
                    uploader,
                    format!(
                        "The GPG signature on {display_name} is weak, please sign the upload with a stronger key."
                    ),
                ));
            }

            let directory = path.parent().unwrap_or_else(|| Path::new("."));
            let changes = match signed.text().and_then(|text| Changes::parse(&text, directory)) {
                Ok(changes) => changes,
                Err(e) => {
                    return Ok(UploadOutcome::rejected(
                        uploader,
                        format!("This changes file was invalid: {e}."),
                    ));
                }
            };

            let [suite] = changes.distributions.as_slice() else {
                return Ok(UploadOutcome::rejected(
                    uploader,
                    format!(
                        "Invalid amount of distributions set in this changes file. \
                         We currently can only handle exactly one target (got {:?}).",
                        changes.distributions
                    ),
                ));
            };

            if changes.sourceful() && !uploader.allow_source_uploads {
                return Ok(UploadOutcome::rejected(
                    uploader,
                    "This uploader is not permitted to make sourceful uploads.",
                ));
            }
            if !uploader.may_upload(&changes.source_name) {
                return Ok(UploadOutcome::rejected(
                    uploader,
                    format!("This uploader may not upload source package '{}'.", changes.source_name),
                ));
            }

            let rss = match lookup.repo_suite(repo, suite)? {
                Some(rss) if rss.accept_uploads => rss,
                Some(rss) => {
                    return Ok(UploadOutcome::rejected(
                        uploader,
                        format!("Suite {rss} does not accept uploads."),
                    ));
                }
                None => {
                    return Ok(UploadOutcome::rejected(
                        uploader,
                        format!("Suite '{suite}' does not exist in repository '{repo}'."),
                    ));
                }
            };
            lookup.rollback()?;
            (uploader, changes, rss)
        };

        // publish lock first, then the database write lock
        let _lock = self.locks.lock_publish(&rss.repo, &rss.suite, true)?;
        let session = db.session()?;
        let rss = match session.repo_suite(&rss.repo, &rss.suite)? {
            Some(fresh) if fresh.accept_uploads => fresh,
            _ => {
                return Ok(UploadOutcome::rejected(
                    uploader,
                    format!("Suite {rss} does not accept uploads."),
                ));
            }
        };

        if changes.sourceful() {
            if let Some(recorded) =
                session.recorded_version(rss.repo_id, &changes.source_name, SOURCE_ARCH)?
            {
                if recorded >= changes.version {
                    return Ok(UploadOutcome::rejected(
                        uploader,
                        format!(
                            "We have already seen higher or equal version \"{recorded}\" of source \
                             package \"{}\" in repository \"{}\" before.",
                            changes.source_name, rss.repo
                        ),
                    ));
                }
            }
        }

        let files = match changes.files() {
            Ok(files) => files,
            Err(e) => {
                return Ok(UploadOutcome::rejected(
                    uploader,
                    format!("This changes file was invalid: {e}."),
                ));
            }
        };

        if !uploader.allow_binary_uploads && files.iter().any(ChangesFile::is_binary) {
            return Ok(UploadOutcome::rejected(
                uploader,
                "This uploader is not allowed to upload binaries. Please upload a source-only package!",
            ));
        }

        let mut importer =
            PackageImporter::new(&session, rss.clone(), self.renderer.as_ref(), &self.config)?;
        importer.set_keep_source_packages(self.keep_source_packages);
        let imported = import_artifacts(&mut importer, &rss, &changes, &files, &uploader);
        let journal = importer.into_journal();

        match imported {
            Ok(imported) => {
                if let Err(e) = session.commit() {
                    journal.rollback()?;
                    return Err(e);
                }
                journal.commit();
                match imported {
                    Imported::Published => {
                        info!(
                            "ACCEPTED: {}/{} uploaded by {} to {}",
                            changes.source_name, changes.version, uploader.email, rss
                        );
                        Ok(UploadOutcome::published(uploader))
                    }
                    Imported::Held(reason) => Ok(UploadOutcome::held(uploader, reason)),
                }
            }
            Err(reason) => {
                journal.rollback()?;
                session.rollback()?;
                Ok(UploadOutcome::rejected(uploader, reason))
            }
        }
    }
}

/// Where the artifacts of an admitted upload went.
#[derive(Debug)]
enum Imported {
    Published,
    /// Waiting in NEW, with a note naming what was held.
    Held(String),
}

/// Import the `.dsc` (first one only) and then every binary of an upload.
///
/// Returns the rejection reason of the first artifact that fails.
fn import_artifacts(
    importer: &mut PackageImporter<'_, '_>,
    rss: &RepoSuite,
    changes: &Changes,
    files: &[ChangesFile],
    uploader: &Uploader,
) -> std::result::Result<Imported, String> {
    let mut queued_source = None;

    if let Some(dsc) = files.iter().find(|f| f.is_dsc()) {
        let outcome = importer
            .import_source(
                &changes.directory().join(&dsc.fname),
                &dsc.component,
                rss.new_policy,
                uploader.always_review,
            )
            .map_err(|e| format!("Failed to import source package: {e}"))?;
        if outcome == SourceOutcome::Queued {
            queued_source = Some(format!("{}/{}", changes.source_name, changes.version));
        }
    }

    let mut filed = Vec::new();
    for deb in files.iter().filter(|f| f.is_binary()) {
        let path = changes.directory().join(&deb.fname);
        let outcome = importer
            .import_binary(&path, Some(&deb.component))
            .map_err(|e| format!("Failed to import binary package {}: {e}", deb.fname))?;
        if outcome == BinaryOutcome::QueuedWithSource {
            if queued_source.is_none() {
                let (name, version) = importer
                    .binary_source(&path)
                    .map_err(|e| format!("Failed to import binary package {}: {e}", deb.fname))?;
                queued_source = Some(format!("{name}/{version}"));
            }
            filed.push(deb.fname.as_str());
        }
    }

    let Some(source) = queued_source else {
        return Ok(Imported::Published);
    };
    let mut reason = format!("Source package {source} is pending in the NEW queue.");
    for fname in filed {
        reason.push_str(&format!(
            " Binary package {fname} was filed with it but is not registered until the source is accepted."
        ));
    }
    Ok(Imported::Held(reason))
}

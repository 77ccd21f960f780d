//! Importing source and binary packages into a repository-suite.
//!
//! The importer performs no permission checks; that is the upload
//! handler's job. It verifies checksums, enforces the version ledger,
//! routes between the pool and the NEW queue and places files through a
//! [`Journal`], so the caller can undo everything together with the
//! database session.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use archivist_schema::{
    Architecture, BinaryPackage, DebType, DebVersion, HashAlgorithm, NewPolicy, Override,
    PackageInfo, SOURCE_ARCH, SourcePackage, Stanza, hash_reader, split_relation_list,
};
use tracing::{debug, info};

use crate::checksum::verify_file;
use crate::config::ArchiveConfig;
use crate::control::{
    ControlRenderer, expected_binaries, merge_checksum_sections, parse_source_field,
    warn_binary_fallback,
};
use crate::error::{ArchiveError, Result};
use crate::journal::Journal;
use crate::pool::{Route, binary_pool_filename, pool_subdir, route_new_or_pool};
use crate::reader::{take_file_checksums, take_relations};
use crate::store::{RepoSuite, Session, SourceId};

/// Where an imported source ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceOutcome {
    /// Published into the suite.
    Published,
    /// Waiting in the NEW queue.
    Queued,
}

/// Where an imported binary ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOutcome {
    /// Published into the suite.
    Published,
    /// Filed next to its source in the NEW queue, not registered.
    QueuedWithSource,
}

/// Expected binaries of `spkg` that have no override in `rss` yet.
///
/// # Errors
///
/// Database failures.
pub fn missing_overrides(
    session: &Session<'_>,
    rss: &RepoSuite,
    spkg: &SourcePackage,
) -> Result<Vec<PackageInfo>> {
    let mut seen = BTreeSet::new();
    let mut missing = Vec::new();
    for info in &spkg.expected_binaries {
        if !seen.insert(info.name.as_str()) {
            continue;
        }
        if session.override_for(rss, &info.name)?.is_none() {
            missing.push(info.clone());
        }
    }
    Ok(missing)
}

/// Register overrides for `infos`, keeping any that already exist.
///
/// Returns the number of overrides added.
///
/// # Errors
///
/// Database failures.
pub fn register_overrides(
    session: &Session<'_>,
    rss: &RepoSuite,
    infos: &[PackageInfo],
) -> Result<usize> {
    let mut added = 0;
    for info in infos {
        if session.add_override(rss, &Override::from_info(info))? {
            info!(package = %info.name, section = %info.section, suite = %rss, "registered override");
            added += 1;
        }
    }
    Ok(added)
}

/// Imports packages into one repository-suite.
#[derive(Debug)]
pub struct PackageImporter<'s, 'conn> {
    session: &'s Session<'conn>,
    rss: RepoSuite,
    renderer: &'s dyn ControlRenderer,
    pool_root: PathBuf,
    queue_root: PathBuf,
    keep_source_packages: bool,
    journal: Journal,
}

impl<'s, 'conn> PackageImporter<'s, 'conn> {
    /// Importer for `rss` using the directory layout of `config`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the NEW queue directory cannot be created.
    pub fn new(
        session: &'s Session<'conn>,
        rss: RepoSuite,
        renderer: &'s dyn ControlRenderer,
        config: &ArchiveConfig,
    ) -> Result<Self> {
        let queue_root = config.new_queue_root(&rss.repo);
        std::fs::create_dir_all(&queue_root).map_err(|e| ArchiveError::io_at(&queue_root, e))?;
        Ok(Self {
            session,
            pool_root: config.pool_root(&rss.repo),
            journal: Journal::new(config.queue_root.clone()),
            keep_source_packages: config.keep_source_packages,
            queue_root,
            rss,
            renderer,
        })
    }

    /// Keep (copy) imported artifacts instead of moving them.
    pub fn set_keep_source_packages(&mut self, keep: bool) {
        self.keep_source_packages = keep;
    }

    /// The repository-suite imports go to.
    pub fn repo_suite(&self) -> &RepoSuite {
        &self.rss
    }

    /// Root of the published pool.
    pub fn pool_root(&self) -> &Path {
        &self.pool_root
    }

    /// Root of the NEW queue.
    pub fn queue_root(&self) -> &Path {
        &self.queue_root
    }

    /// The database session imports write to.
    pub fn session(&self) -> &'s Session<'conn> {
        self.session
    }

    pub(crate) fn journal_mut(&mut self) -> &mut Journal {
        &mut self.journal
    }

    /// Source name and version a `.deb` was built from.
    pub(crate) fn binary_source(&self, deb: &Path) -> Result<(String, DebVersion)> {
        let mut stanza = self.renderer.render_binary(deb)?.stanza;
        let (name, version) = take_name_version(&mut stanza, deb)?;
        parse_source_field(stanza.take("Source").as_deref(), &name, &version)
    }

    /// Hand over the filesystem journal for commit or rollback.
    pub fn into_journal(self) -> Journal {
        self.journal
    }

    /// Import a source package from a `.dsc` and the files beside it.
    ///
    /// `force_review` sends the upload through NEW unless the suite never
    /// uses NEW.
    ///
    /// # Errors
    ///
    /// [`ArchiveError::VersionRegression`], checksum errors,
    /// [`ArchiveError::MalformedIndex`] and
    /// [`ArchiveError::DestinationExists`], plus renderer, I/O and
    /// database failures.
    pub fn import_source(
        &mut self,
        dsc: &Path,
        component: &str,
        policy: NewPolicy,
        force_review: bool,
    ) -> Result<SourceOutcome> {
        info!(dsc = %dsc.display(), suite = %self.rss, "importing source");
        let dsc_dir = dsc.parent().unwrap_or_else(|| Path::new("."));
        let mut stanza = self.renderer.render_source(dsc)?;

        let (name, version) = take_name_version(&mut stanza, dsc)?;
        self.session.ensure_newer_source(self.rss.repo_id, &name, &version)?;

        // a re-upload of a package waiting in NEW updates the queued entry
        let queued = self.session.new_queue_entry(&self.rss, &name, &version)?;
        if queued.is_none() && self.session.find_source(self.rss.repo_id, &name, &version)?.is_some() {
            return Err(ArchiveError::PolicyViolation(format!(
                "source {name}/{version} is already known to repository {}",
                self.rss.repo
            )));
        }

        let mut spkg = self.source_from_stanza(stanza, name, version, component)?;

        if let Some((_, old)) = &queued {
            for file in &old.files {
                let path = self.queue_root.join(&file.fname);
                if path.is_file() {
                    self.journal.remove(&path)?;
                }
            }
        }

        for file in &mut spkg.files {
            verify_file(&dsc_dir.join(file.basename()), file)?;
            file.fname = format!("{}/{}", spkg.directory, file.basename());
        }

        let missing = missing_overrides(self.session, &self.rss, &spkg)?;
        let route = route_new_or_pool(!missing.is_empty(), policy, force_review);
        if route == Route::Pool && !missing.is_empty() {
            register_overrides(self.session, &self.rss, &missing)?;
        }

        let root = match route {
            Route::Pool => &self.pool_root,
            Route::NewQueue => &self.queue_root,
        };
        for file in &spkg.files {
            let src = dsc_dir.join(file.basename());
            self.journal
                .place(&src, &root.join(&file.fname), self.keep_source_packages)?;
        }

        let id = match &queued {
            Some((id, _)) => {
                self.session.update_source(*id, self.rss.repo_id, &spkg)?;
                *id
            }
            None => self.session.insert_source(self.rss.repo_id, &spkg)?,
        };

        match route {
            Route::NewQueue => {
                self.session.enqueue_new(id, &self.rss)?;
                info!(
                    "Source {}/{} for {} added to NEW queue",
                    spkg.name, spkg.version, self.rss
                );
                Ok(SourceOutcome::Queued)
            }
            Route::Pool => {
                self.publish_source(id, &spkg)?;
                Ok(SourceOutcome::Published)
            }
        }
    }

    /// Publish a stored source into the suite and update the ledger.
    pub(crate) fn publish_source(&self, id: SourceId, spkg: &SourcePackage) -> Result<()> {
        self.session.add_source_to_suite(id, &self.rss)?;
        if self.session.dequeue_new(id)? {
            debug!(package = %spkg.name, "dropped obsolete NEW entry");
        }
        self.session
            .mark_published(self.rss.repo_id, &spkg.name, SOURCE_ARCH, &spkg.version)?;
        self.session.set_changes_pending(&self.rss, true)?;
        info!("Added source {}/{} to {}", spkg.name, spkg.version, self.rss);
        Ok(())
    }

    fn source_from_stanza(
        &self,
        mut stanza: Stanza,
        name: String,
        version: DebVersion,
        component: &str,
    ) -> Result<SourcePackage> {
        let architectures = Architecture::parse_list(&stanza.take("Architecture").unwrap_or_default());
        let (expected, fallback) = expected_binaries(&stanza, &version, &architectures, component)?;
        if fallback {
            warn_binary_fallback(&name, &version, &self.rss.to_string());
        }
        let files = merge_checksum_sections(&stanza, None)?;
        for field in [
            "Package-List", "Binary", "Files", "Checksums-Sha1", "Checksums-Sha256",
            "Checksums-Sha512", "Directory",
        ] {
            stanza.take(field);
        }

        let spkg = SourcePackage {
            repo: self.rss.repo.clone(),
            component: component.to_string(),
            format_version: stanza.take("Format").unwrap_or_else(|| "1.0".to_string()),
            architectures,
            section: stanza.take("Section"),
            standards_version: stanza.take("Standards-Version"),
            maintainer: stanza.take("Maintainer").unwrap_or_default(),
            original_maintainer: stanza.take("Original-Maintainer"),
            uploaders: split_list(&mut stanza, "Uploaders"),
            homepage: stanza.take("Homepage"),
            vcs_browser: stanza.take("Vcs-Browser"),
            vcs_git: stanza.take("Vcs-Git"),
            build_depends: split_list(&mut stanza, "Build-Depends"),
            build_depends_indep: split_list(&mut stanza, "Build-Depends-Indep"),
            build_conflicts: split_list(&mut stanza, "Build-Conflicts"),
            build_conflicts_indep: split_list(&mut stanza, "Build-Conflicts-Indep"),
            directory: pool_subdir(&name),
            files,
            expected_binaries: expected,
            extra: stanza.into_extra(),
            name,
            version,
        };
        debug!(
            "Extra data fields for {}/{}: {:?}",
            spkg.name,
            spkg.version,
            spkg.extra.iter().map(|(k, _)| k).collect::<Vec<_>>()
        );
        Ok(spkg)
    }

    /// Import a `.deb`/`.udeb` whose source is published or queued.
    ///
    /// `component` defaults to the component of the package's override.
    ///
    /// # Errors
    ///
    /// [`ArchiveError::OrphanedBinary`], [`ArchiveError::MissingOverride`],
    /// [`ArchiveError::VersionRegression`], checksum errors and
    /// [`ArchiveError::DestinationExists`], plus renderer, I/O and
    /// database failures.
    pub fn import_binary(&mut self, deb: &Path, component: Option<&str>) -> Result<BinaryOutcome> {
        info!(deb = %deb.display(), suite = %self.rss, "importing binary");
        let deb_type = deb
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(DebType::from_filename)
            .unwrap_or(DebType::Deb);

        let control = self.renderer.render_binary(deb)?;
        let mut stanza = control.stanza;
        let (name, version) = take_name_version(&mut stanza, deb)?;
        let arch = Architecture::new(
            stanza
                .take("Architecture")
                .filter(|a| !a.trim().is_empty())
                .ok_or_else(|| {
                    ArchiveError::MalformedIndex(format!("{name}/{version} has no Architecture"))
                })?
                .trim(),
        );
        let (source_name, source_version) =
            parse_source_field(stanza.take("Source").as_deref(), &name, &version)?;

        let (source_id, queued) =
            match self.session.published_source(&self.rss, &source_name, &source_version)? {
                Some((id, _)) => (id, false),
                None => match self.session.new_queue_entry(&self.rss, &source_name, &source_version)? {
                    Some((id, _)) => (id, true),
                    None => {
                        return Err(ArchiveError::OrphanedBinary {
                            package: name,
                            version: version.to_string(),
                            source_name,
                            source_version: source_version.to_string(),
                        });
                    }
                },
            };

        let fname = format!(
            "{}/{}",
            pool_subdir(&source_name),
            binary_pool_filename(&name, &version, &arch, deb_type)
        );
        let file = take_file_checksums(&mut stanza, &fname)?;
        verify_file(deb, &file)?;

        if queued {
            // inert until the source leaves NEW
            let dest = self.queue_root.join(&fname);
            if deb != dest.as_path() {
                self.journal.replace(deb, &dest, self.keep_source_packages)?;
            }
            info!("Binary {name}/{version} for {} added to NEW queue", self.rss);
            return Ok(BinaryOutcome::QueuedWithSource);
        }

        self.session
            .ensure_newer(self.rss.repo_id, &name, arch.as_str(), &version)?;

        for field in ["Filename", "Priority", "Section", "Essential"] {
            stanza.take(field);
        }
        let Some(override_info) = self.session.override_for(&self.rss, &name)? else {
            return Err(ArchiveError::MissingOverride {
                package: name,
                version: version.to_string(),
                suite: self.rss.to_string(),
            });
        };

        let description = stanza.take("Description").unwrap_or_default();
        let description_md5 = match stanza.take("Description-md5") {
            Some(md5) => md5,
            None => hash_reader(description.as_bytes())?
                .get(HashAlgorithm::Md5)
                .to_string(),
        };
        let bpkg = BinaryPackage {
            architecture: arch,
            deb_type,
            repo: self.rss.repo.clone(),
            component: component.map_or_else(|| override_info.component.clone(), str::to_string),
            source_name,
            source_version,
            maintainer: stanza.take("Maintainer").unwrap_or_default(),
            original_maintainer: stanza.take("Original-Maintainer"),
            homepage: stanza.take("Homepage"),
            size_installed: stanza
                .take("Installed-Size")
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(0),
            description,
            description_md5: Some(description_md5),
            multi_arch: stanza.take("Multi-Arch"),
            relations: take_relations(&mut stanza),
            override_info: Some(override_info),
            file: Some(file),
            contents: control.contents,
            extra: stanza.into_extra(),
            name,
            version,
        };

        self.journal.place(
            deb,
            &self.pool_root.join(&fname),
            self.keep_source_packages,
        )?;
        self.session.insert_binary(&self.rss, source_id, &bpkg)?;
        self.session.mark_published(
            self.rss.repo_id,
            &bpkg.name,
            bpkg.architecture.as_str(),
            &bpkg.version,
        )?;
        self.session.set_changes_pending(&self.rss, true)?;
        info!(
            "Added binary {}/{} ({}) to {}",
            bpkg.name, bpkg.version, bpkg.architecture, self.rss
        );
        Ok(BinaryOutcome::Published)
    }
}

fn take_name_version(stanza: &mut Stanza, path: &Path) -> Result<(String, DebVersion)> {
    let name = stanza.take("Package").filter(|n| !n.trim().is_empty());
    let version = stanza.take("Version").filter(|v| !v.trim().is_empty());
    let (Some(name), Some(version)) = (name, version) else {
        return Err(ArchiveError::MalformedIndex(format!(
            "control data of {} lacks Package or Version",
            path.display()
        )));
    };
    Ok((name.trim().to_string(), DebVersion::parse(&version)?))
}

fn split_list(stanza: &mut Stanza, field: &str) -> Vec<String> {
    split_relation_list(&stanza.take(field).unwrap_or_default())
}

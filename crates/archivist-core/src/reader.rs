//! Reading package indices of a Debian-style repository.
//!
//! A [`RepositoryReader`] points at a repository tree, either a local
//! directory or a remote URL mirrored into a cache. Every index it hands
//! out has been checked against the suite's signed `InRelease` manifest.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use archivist_schema::{
    ArchiveFile, Architecture, BinaryPackage, DebType, DebVersion, HashAlgorithm, HexDigest,
    Override, PackagePriority, Relations, SourcePackage, Stanza, sha256_file, split_relation_list,
    stanza::parse_stanzas,
};
use tracing::{debug, info, warn};

use crate::config::ArchiveConfig;
use crate::control::{expected_binaries, merge_checksum_sections, parse_source_field};
use crate::error::{ArchiveError, Result};
use crate::io::compress::{INDEX_EXTENSIONS, read_index_text};
use crate::io::fetch::Fetcher;
use crate::signature::{SignatureVerifier, SignedContent, strip_clearsign};

/// One file entry of a release manifest's `SHA256` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    /// Path relative to the suite directory.
    pub path: String,
    /// Declared size.
    pub size: u64,
    /// Declared SHA256.
    pub sha256: HexDigest,
}

/// The verified file list of a suite's `InRelease`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseManifest {
    entries: BTreeMap<String, ManifestEntry>,
}

impl ReleaseManifest {
    /// Parse the payload of an `InRelease` file.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::MalformedIndex`] for bad syntax or `SHA256` lines.
    pub fn parse(text: &str) -> Result<Self> {
        let stanza = Stanza::parse_one(text)
            .map_err(|e| ArchiveError::MalformedIndex(format!("InRelease: {e}")))?;
        let mut entries = BTreeMap::new();
        for line in stanza.lines("SHA256") {
            let parts: Vec<&str> = line.split_whitespace().collect();
            let [digest, size, path] = parts.as_slice() else {
                return Err(ArchiveError::MalformedIndex(format!(
                    "bad SHA256 line in InRelease: '{line}'"
                )));
            };
            let entry = ManifestEntry {
                path: (*path).to_string(),
                size: size.parse().map_err(|_| {
                    ArchiveError::MalformedIndex(format!("bad size in InRelease line '{line}'"))
                })?,
                sha256: HexDigest::new(HashAlgorithm::Sha256, digest)
                    .map_err(|e| ArchiveError::MalformedIndex(e.to_string()))?,
            };
            entries.insert(entry.path.clone(), entry);
        }
        Ok(Self { entries })
    }

    /// Entry for a suite-relative path.
    pub fn get(&self, path: &str) -> Option<&ManifestEntry> {
        self.entries.get(path)
    }

    /// Number of listed files.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no file is listed.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A non-fatal oddity found while reading an index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Package the diagnostic is about.
    pub package: String,
    /// Its version.
    pub version: String,
    /// What was noticed.
    pub message: String,
}

/// Packages read from one index plus the diagnostics raised on the way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing<T> {
    /// Parsed packages in index order.
    pub packages: Vec<T>,
    /// Warnings the caller may want to surface.
    pub diagnostics: Vec<Diagnostic>,
}

impl<T> Default for Listing<T> {
    fn default() -> Self {
        Self {
            packages: Vec::new(),
            diagnostics: Vec::new(),
        }
    }
}

impl<T> Listing<T> {
    fn flag(&mut self, package: &str, version: &str, message: String) {
        warn!(package, version, "{message}");
        self.diagnostics.push(Diagnostic {
            package: package.to_string(),
            version: version.to_string(),
            message,
        });
    }
}

/// Anything with a package name and a Debian version.
pub trait Versioned {
    /// Package name.
    fn package_name(&self) -> &str;
    /// Package version.
    fn package_version(&self) -> &DebVersion;
}

impl Versioned for SourcePackage {
    fn package_name(&self) -> &str {
        &self.name
    }

    fn package_version(&self) -> &DebVersion {
        &self.version
    }
}

impl Versioned for BinaryPackage {
    fn package_name(&self) -> &str {
        &self.name
    }

    fn package_version(&self) -> &DebVersion {
        &self.version
    }
}

/// Reduce packages to the highest version per name.
pub fn newest_packages<T: Versioned>(packages: impl IntoIterator<Item = T>) -> BTreeMap<String, T> {
    let mut newest: BTreeMap<String, T> = BTreeMap::new();
    for pkg in packages {
        let replace = newest
            .get(pkg.package_name())
            .is_none_or(|current| pkg.package_version() > current.package_version());
        if replace {
            newest.insert(pkg.package_name().to_string(), pkg);
        }
    }
    newest
}

#[derive(Debug)]
enum Location {
    Local(PathBuf),
    Remote {
        url: String,
        cache: PathBuf,
        fetcher: Fetcher,
    },
}

/// Reads and verifies indices of one repository.
#[derive(Debug)]
pub struct RepositoryReader {
    name: String,
    location: Location,
    keyrings: Vec<PathBuf>,
    trusted: bool,
    strict_architecture: bool,
    verifier: Arc<dyn SignatureVerifier>,
    manifests: HashMap<String, ReleaseManifest>,
}

impl RepositoryReader {
    /// Reader for a repository tree on the local filesystem.
    pub fn local(
        root: impl Into<PathBuf>,
        name: impl Into<String>,
        keyrings: Vec<PathBuf>,
        verifier: Arc<dyn SignatureVerifier>,
    ) -> Self {
        Self::with_location(Location::Local(root.into()), name.into(), keyrings, verifier)
    }

    /// Reader for a remote repository, mirrored into `cache`.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::Http`] if the HTTP client cannot be built.
    pub fn remote(
        url: impl Into<String>,
        name: impl Into<String>,
        cache: impl Into<PathBuf>,
        keyrings: Vec<PathBuf>,
        verifier: Arc<dyn SignatureVerifier>,
    ) -> Result<Self> {
        let location = Location::Remote {
            url: url.into().trim_end_matches('/').to_string(),
            cache: cache.into(),
            fetcher: Fetcher::new()?,
        };
        Ok(Self::with_location(location, name.into(), keyrings, verifier))
    }

    /// Reader for a location string: `http(s)://` URLs are remote, anything
    /// else is a local path. Remote caches and the architecture strictness
    /// come from `config`.
    ///
    /// # Errors
    ///
    /// See [`RepositoryReader::remote`].
    pub fn open(
        location: &str,
        name: &str,
        config: &ArchiveConfig,
        keyrings: Vec<PathBuf>,
        verifier: Arc<dyn SignatureVerifier>,
    ) -> Result<Self> {
        let mut reader = if location.starts_with("http://") || location.starts_with("https://") {
            Self::remote(location, name, config.repo_cache_dir(name), keyrings, verifier)?
        } else {
            Self::local(location, name, keyrings, verifier)
        };
        reader.set_strict_architecture(config.strict_architecture);
        Ok(reader)
    }

    fn with_location(
        location: Location,
        name: String,
        keyrings: Vec<PathBuf>,
        verifier: Arc<dyn SignatureVerifier>,
    ) -> Self {
        Self {
            name,
            location,
            keyrings,
            trusted: false,
            strict_architecture: false,
            verifier,
            manifests: HashMap::new(),
        }
    }

    /// Trust the repository: without keyrings, `InRelease` signatures are
    /// then not required.
    pub fn set_trusted(&mut self, trusted: bool) {
        self.trusted = trusted;
    }

    /// Fail instead of warning when a `Packages` index lists a package for
    /// an architecture other than the requested one.
    pub fn set_strict_architecture(&mut self, strict: bool) {
        self.strict_architecture = strict;
    }

    /// Repository name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Directory files are served from: the tree itself, or the cache.
    pub fn base_dir(&self) -> &Path {
        match &self.location {
            Location::Local(root) => root,
            Location::Remote { cache, .. } => cache,
        }
    }

    /// Human readable location.
    pub fn location(&self) -> String {
        match &self.location {
            Location::Local(root) => root.display().to_string(),
            Location::Remote { url, .. } => url.clone(),
        }
    }

    /// Remove the download cache of a remote repository.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the cache exists but cannot be removed.
    pub fn cleanup(&self) -> Result<()> {
        if let Location::Remote { cache, .. } = &self.location {
            if cache.exists() {
                std::fs::remove_dir_all(cache).map_err(|e| ArchiveError::io_at(cache, e))?;
            }
        }
        Ok(())
    }

    fn fetch_raw(&self, rel: &str) -> Result<Option<PathBuf>> {
        match &self.location {
            Location::Local(root) => {
                let path = root.join(rel);
                Ok(path.is_file().then_some(path))
            }
            Location::Remote {
                url,
                cache,
                fetcher,
            } => {
                let dest = cache.join(rel);
                Ok(fetcher
                    .download(&format!("{url}/{rel}"), &dest)?
                    .map(|_| dest))
            }
        }
    }

    /// Load and verify the release manifest of `suite`.
    ///
    /// The signature is required unless the repository is trusted and no
    /// keyrings were configured. Results are cached per suite.
    ///
    /// # Errors
    ///
    /// [`ArchiveError::ManifestUnavailable`] if there is no `InRelease`,
    /// signature errors from the verifier, and
    /// [`ArchiveError::MalformedIndex`] for unparsable content.
    pub fn read_suite_manifest(&mut self, suite: &str) -> Result<&ReleaseManifest> {
        if !self.manifests.contains_key(suite) {
            let manifest = self.load_manifest(suite)?;
            self.manifests.insert(suite.to_string(), manifest);
        }
        self.manifests
            .get(suite)
            .ok_or_else(|| ArchiveError::ManifestUnavailable {
                location: self.location(),
                suite: suite.to_string(),
            })
    }

    fn load_manifest(&self, suite: &str) -> Result<ReleaseManifest> {
        let rel = format!("dists/{suite}/InRelease");
        let Some(path) = self.fetch_raw(&rel)? else {
            return Err(ArchiveError::ManifestUnavailable {
                location: self.location(),
                suite: suite.to_string(),
            });
        };
        let data = std::fs::read(&path).map_err(|e| ArchiveError::io_at(&path, e))?;

        let content = if self.trusted && self.keyrings.is_empty() {
            debug!(repo = %self.name, suite, "trusted repository without keyrings, skipping signature check");
            SignedContent::unverified(strip_clearsign(&String::from_utf8_lossy(&data)).into_bytes())
        } else {
            self.verifier.verify(&data, &self.keyrings, true)?
        };
        ReleaseManifest::parse(&content.text()?)
    }

    /// Fetch a suite-relative file and verify it against the manifest.
    ///
    /// Remote repositories reload the manifest on every call, since the
    /// mirror may have been updated in between.
    ///
    /// Returns `Ok(None)` when the file does not exist.
    ///
    /// # Errors
    ///
    /// [`ArchiveError::ChecksumMismatch`] when the file differs from the
    /// manifest, [`ArchiveError::NotInManifest`] when it is not listed, plus
    /// manifest errors.
    pub fn fetch_index(&mut self, suite: &str, rel: &str) -> Result<Option<PathBuf>> {
        if matches!(self.location, Location::Remote { .. }) {
            self.manifests.remove(suite);
        }
        let entry = self.read_suite_manifest(suite)?.get(rel).cloned();
        let Some(path) = self.fetch_raw(&format!("dists/{suite}/{rel}"))? else {
            return Ok(None);
        };
        let Some(entry) = entry else {
            return Err(ArchiveError::NotInManifest {
                path: rel.to_string(),
                suite: suite.to_string(),
            });
        };
        let actual = sha256_file(&path).map_err(|e| ArchiveError::io_at(&path, e))?;
        if actual != entry.sha256.as_str() {
            return Err(ArchiveError::ChecksumMismatch {
                file: rel.to_string(),
                algorithm: HashAlgorithm::Sha256.as_str(),
                expected: entry.sha256.to_string(),
                actual,
            });
        }
        Ok(Some(path))
    }

    /// Fetch the best compressed variant of an index the manifest lists.
    ///
    /// `base` is the suite-relative path without compression suffix.
    ///
    /// # Errors
    ///
    /// See [`RepositoryReader::fetch_index`].
    pub fn find_index(&mut self, suite: &str, base: &str) -> Result<Option<PathBuf>> {
        let listed: Vec<String> = {
            if matches!(self.location, Location::Remote { .. }) {
                self.manifests.remove(suite);
            }
            let manifest = self.read_suite_manifest(suite)?;
            INDEX_EXTENSIONS
                .iter()
                .map(|ext| format!("{base}{ext}"))
                .filter(|rel| manifest.get(rel).is_some())
                .collect()
        };
        if listed.is_empty() {
            // an unlisted index that exists anyway is an error, not an absence
            return self.fetch_index(suite, &format!("{base}.xz"));
        }
        for rel in listed {
            if let Some(path) = self.fetch_index(suite, &rel)? {
                return Ok(Some(path));
            }
        }
        Ok(None)
    }

    /// Source packages of `suite`/`component`.
    ///
    /// A missing index yields an empty listing. With
    /// `include_extra_source_only` unset, sources only kept around for
    /// `Built-Using` (`Extra-Source-Only: yes`) are skipped.
    ///
    /// # Errors
    ///
    /// Verification errors and [`ArchiveError::MalformedIndex`] for stanzas
    /// without `Package`/`Version`.
    pub fn list_source_packages(
        &mut self,
        suite: &str,
        component: &str,
        include_extra_source_only: bool,
    ) -> Result<Listing<SourcePackage>> {
        let Some(index) = self.find_index(suite, &format!("{component}/source/Sources"))? else {
            return Ok(Listing::default());
        };
        let text = read_index_text(&index)?;
        let mut listing = Listing::default();

        for mut stanza in parse_stanzas(&text)? {
            let (name, version) = take_name_version(&mut stanza, &index)?;
            let extra_source_only = stanza
                .take("Extra-Source-Only")
                .is_some_and(|v| v.trim() == "yes");
            if extra_source_only && !include_extra_source_only {
                continue;
            }

            let architectures = Architecture::parse_list(&stanza.take("Architecture").unwrap_or_default());
            let directory = stanza.take("Directory").unwrap_or_default();
            let files = merge_checksum_sections(&stanza, Some(&directory))?;
            let (expected, fallback) = expected_binaries(&stanza, &version, &architectures, component)?;
            if fallback {
                listing.flag(
                    &name,
                    version.as_str(),
                    format!("source package in {} has no Package-List, falling back to Binary", self.location()),
                );
            }
            for field in [
                "Package-List", "Binary", "Files", "Checksums-Sha1", "Checksums-Sha256",
                "Checksums-Sha512",
            ] {
                stanza.take(field);
            }

            let format_version = stanza.take("Format").unwrap_or_default();
            if files.is_empty() && format_version != "1.0" {
                listing.flag(
                    &name,
                    version.as_str(),
                    format!("source package seems to have no files (in {})", self.location()),
                );
            }

            let pkg = SourcePackage {
                repo: self.name.clone(),
                component: component.to_string(),
                format_version,
                architectures,
                section: stanza.take("Section"),
                standards_version: stanza.take("Standards-Version"),
                maintainer: stanza.take("Maintainer").unwrap_or_default(),
                original_maintainer: stanza.take("Original-Maintainer"),
                uploaders: split_relation_list(&stanza.take("Uploaders").unwrap_or_default()),
                homepage: stanza.take("Homepage"),
                vcs_browser: stanza.take("Vcs-Browser"),
                vcs_git: stanza.take("Vcs-Git"),
                build_depends: take_list(&mut stanza, "Build-Depends"),
                build_depends_indep: take_list(&mut stanza, "Build-Depends-Indep"),
                build_conflicts: take_list(&mut stanza, "Build-Conflicts"),
                build_conflicts_indep: take_list(&mut stanza, "Build-Conflicts-Indep"),
                directory,
                files,
                expected_binaries: expected,
                extra: stanza.into_extra(),
                name,
                version,
            };
            listing.packages.push(pkg);
        }
        info!(
            repo = %self.name, suite, component,
            count = listing.packages.len(),
            "read source packages"
        );
        Ok(listing)
    }

    /// Binary packages of `suite`/`component`/`arch`.
    ///
    /// When the architecture has no index of its own and `shadow_arch`
    /// differs, the shadow architecture's index is read instead; packages
    /// are still reported for `arch`.
    ///
    /// # Errors
    ///
    /// See [`RepositoryReader::list_source_packages`]; in strict
    /// architecture mode a mislabelled package is [`ArchiveError::MalformedIndex`].
    pub fn list_binary_packages(
        &mut self,
        suite: &str,
        component: &str,
        arch: &Architecture,
        shadow_arch: Option<&Architecture>,
    ) -> Result<Listing<BinaryPackage>> {
        let mut index = self.find_index(suite, &format!("{component}/binary-{arch}/Packages"))?;
        if index.is_none() {
            if let Some(shadow) = shadow_arch.filter(|s| *s != arch) {
                debug!(%arch, %shadow, "no index for architecture, reading shadow architecture");
                index = self.find_index(suite, &format!("{component}/binary-{shadow}/Packages"))?;
            }
        }
        let Some(index) = index else {
            return Ok(Listing::default());
        };
        self.read_binary_index(&index, component, arch, DebType::Deb)
    }

    /// Installer (`.udeb`) packages of `suite`/`component`/`arch`.
    ///
    /// # Errors
    ///
    /// See [`RepositoryReader::list_binary_packages`].
    pub fn list_installer_packages(
        &mut self,
        suite: &str,
        component: &str,
        arch: &Architecture,
    ) -> Result<Listing<BinaryPackage>> {
        let base = format!("{component}/debian-installer/binary-{arch}/Packages");
        let Some(index) = self.find_index(suite, &base)? else {
            return Ok(Listing::default());
        };
        self.read_binary_index(&index, component, arch, DebType::Udeb)
    }

    fn read_binary_index(
        &self,
        index: &Path,
        component: &str,
        arch: &Architecture,
        deb_type: DebType,
    ) -> Result<Listing<BinaryPackage>> {
        let text = read_index_text(index)?;
        let requested_all = arch.is_all();
        let mut listing = Listing::default();

        for mut stanza in parse_stanzas(&text)? {
            let (name, version) = take_name_version(&mut stanza, index)?;
            let declared = Architecture::new(stanza.take("Architecture").unwrap_or_default().trim());

            // arch:all packages are read separately
            if !requested_all && declared.is_all() {
                continue;
            }
            if declared != *arch {
                if requested_all {
                    continue;
                }
                let message = format!(
                    "package {}::{name}/{version} has unexpected architecture '{declared}' (expected '{arch}')",
                    self.name
                );
                if self.strict_architecture {
                    return Err(ArchiveError::MalformedIndex(message));
                }
                listing.flag(&name, version.as_str(), message);
            }

            let (source_name, source_version) =
                parse_source_field(stanza.take("Source").as_deref(), &name, &version)?;

            let filename = stanza.take("Filename").unwrap_or_default();
            let file = if filename.trim().is_empty() {
                listing.flag(
                    &name,
                    version.as_str(),
                    format!("binary package for {arch} seems to have no files"),
                );
                None
            } else {
                Some(take_file_checksums(&mut stanza, filename.trim())?)
            };
            let deb_type = file
                .as_ref()
                .and_then(|f| DebType::from_filename(&f.fname))
                .unwrap_or(deb_type);

            let override_info = Override {
                package: name.clone(),
                section: stanza.take("Section").unwrap_or_else(|| "misc".to_string()),
                priority: PackagePriority::parse_lenient(&stanza.take("Priority").unwrap_or_default()),
                essential: stanza.take("Essential").is_some_and(|e| e.trim() == "yes"),
                component: component.to_string(),
            };

            let pkg = BinaryPackage {
                architecture: arch.clone(),
                deb_type,
                repo: self.name.clone(),
                component: component.to_string(),
                source_name,
                source_version,
                maintainer: stanza.take("Maintainer").unwrap_or_default(),
                original_maintainer: stanza.take("Original-Maintainer"),
                homepage: stanza.take("Homepage"),
                size_installed: stanza
                    .take("Installed-Size")
                    .and_then(|s| s.trim().parse().ok())
                    .unwrap_or(0),
                description: stanza.take("Description").unwrap_or_default(),
                description_md5: stanza.take("Description-md5"),
                multi_arch: stanza.take("Multi-Arch"),
                relations: take_relations(&mut stanza),
                override_info: Some(override_info),
                file,
                contents: Vec::new(),
                extra: stanza.into_extra(),
                name,
                version,
            };
            listing.packages.push(pkg);
        }
        info!(
            repo = %self.name, index = %index.display(),
            count = listing.packages.len(),
            "read binary packages"
        );
        Ok(listing)
    }

    /// Fetch a pool file, checking its SHA256 when `verify` is set.
    ///
    /// # Errors
    ///
    /// An I/O `NotFound` error when the file does not exist,
    /// [`ArchiveError::ChecksumMismatch`] on a bad digest, and
    /// [`ArchiveError::InsufficientHashes`] when verification was requested
    /// for a record without SHA256.
    pub fn get_file(&self, file: &ArchiveFile, verify: bool) -> Result<PathBuf> {
        let path = self.get_file_insecure(&file.fname)?;
        if verify {
            let Some(expected) = &file.sha256 else {
                return Err(ArchiveError::InsufficientHashes {
                    file: file.fname.clone(),
                    checked: 0,
                    required: 1,
                });
            };
            let actual = sha256_file(&path).map_err(|e| ArchiveError::io_at(&path, e))?;
            if actual != expected.as_str() {
                return Err(ArchiveError::ChecksumMismatch {
                    file: file.fname.clone(),
                    algorithm: HashAlgorithm::Sha256.as_str(),
                    expected: expected.to_string(),
                    actual,
                });
            }
        }
        Ok(path)
    }

    /// Fetch a repository file by path without any verification.
    ///
    /// # Errors
    ///
    /// An I/O `NotFound` error when the file does not exist.
    pub fn get_file_insecure(&self, fname: &str) -> Result<PathBuf> {
        self.fetch_raw(fname)?.ok_or_else(|| {
            ArchiveError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{fname} not found in {}", self.location()),
            ))
        })
    }
}

fn take_name_version(stanza: &mut Stanza, index: &Path) -> Result<(String, DebVersion)> {
    let name = stanza.take("Package").filter(|n| !n.trim().is_empty());
    let version = stanza.take("Version").filter(|v| !v.trim().is_empty());
    let (Some(name), Some(version)) = (name, version) else {
        return Err(ArchiveError::MalformedIndex(format!(
            "stanza without Package and Version fields in {}",
            index.display()
        )));
    };
    Ok((name.trim().to_string(), DebVersion::parse(&version)?))
}

fn take_list(stanza: &mut Stanza, field: &str) -> Vec<String> {
    split_relation_list(&stanza.take(field).unwrap_or_default())
}

pub(crate) fn take_relations(stanza: &mut Stanza) -> Relations {
    Relations {
        depends: take_list(stanza, "Depends"),
        pre_depends: take_list(stanza, "Pre-Depends"),
        recommends: take_list(stanza, "Recommends"),
        suggests: take_list(stanza, "Suggests"),
        enhances: take_list(stanza, "Enhances"),
        conflicts: take_list(stanza, "Conflicts"),
        breaks: take_list(stanza, "Breaks"),
        replaces: take_list(stanza, "Replaces"),
        provides: take_list(stanza, "Provides"),
        built_using: take_list(stanza, "Built-Using"),
    }
}

/// Build the file record of a binary stanza from `Size`, `MD5sum`, `SHA1`,
/// `SHA256` and `SHA512`.
pub(crate) fn take_file_checksums(stanza: &mut Stanza, fname: &str) -> Result<ArchiveFile> {
    let mut file = ArchiveFile::new(fname);
    file.size = stanza.take("Size").and_then(|s| s.trim().parse().ok());
    for (field, algorithm) in [
        ("MD5sum", HashAlgorithm::Md5),
        ("SHA1", HashAlgorithm::Sha1),
        ("SHA256", HashAlgorithm::Sha256),
        ("SHA512", HashAlgorithm::Sha512),
    ] {
        if let Some(value) = stanza.take(field) {
            let digest = HexDigest::new(algorithm, &value)
                .map_err(|e| ArchiveError::MalformedIndex(format!("{fname}: {e}")))?;
            file.set_digest(algorithm, digest);
        }
    }
    Ok(file)
}

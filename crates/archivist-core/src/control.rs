//! Control data of source and binary artifacts.
//!
//! [`ControlRenderer`] turns a `.dsc` or `.deb` into the deb822 stanza an
//! index would carry for it. The helpers below interpret the fields that
//! need more than a plain lookup: checksum sections, `Package-List`, the
//! `Binary` fallback and the `Source` reference of binaries.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::process::Command;

use archivist_schema::{
    ArchiveFile, Architecture, DebType, DebVersion, HashAlgorithm, HexDigest, PackageInfo,
    PackagePriority, Stanza, hash_file, stanza::strip_clearsign,
};
use tracing::{debug, warn};

use crate::changes::SAFE_FILENAME;
use crate::error::{ArchiveError, Result};

/// Control stanza and file list of a binary artifact.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BinaryControl {
    /// `Packages`-style stanza, checksums included.
    pub stanza: Stanza,
    /// Paths shipped by the package.
    pub contents: Vec<String>,
}

/// Renders index stanzas for artifacts on disk.
pub trait ControlRenderer: std::fmt::Debug + Send + Sync {
    /// Render the `Sources` stanza of a `.dsc`, listing the `.dsc` itself
    /// and every file it references in all checksum sections.
    ///
    /// # Errors
    ///
    /// Fails if the artifact cannot be read or rendered.
    fn render_source(&self, dsc: &Path) -> Result<Stanza>;

    /// Render the `Packages` stanza and contents list of a `.deb`/`.udeb`.
    ///
    /// # Errors
    ///
    /// Fails if the artifact cannot be read or rendered.
    fn render_binary(&self, deb: &Path) -> Result<BinaryControl>;
}

/// Renderer backed by `apt-ftparchive`.
///
/// Sources are rendered natively when the tool is not installed.
#[derive(Debug, Clone, Default)]
pub struct AptFtparchive {
    binary: Option<PathBuf>,
}

impl AptFtparchive {
    /// Locate `apt-ftparchive` on `PATH`.
    pub fn new() -> Self {
        Self {
            binary: which::which("apt-ftparchive").ok(),
        }
    }

    fn run(&self, mode: &str, path: &Path) -> Result<String> {
        let Some(binary) = &self.binary else {
            return Err(ArchiveError::Renderer {
                path: path.to_path_buf(),
                message: "apt-ftparchive is not installed".to_string(),
            });
        };
        let output = Command::new(binary).args(["-q", mode]).arg(path).output()?;
        if !output.status.success() {
            return Err(ArchiveError::Renderer {
                path: path.to_path_buf(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        String::from_utf8(output.stdout).map_err(|e| ArchiveError::Renderer {
            path: path.to_path_buf(),
            message: format!("output is not UTF-8: {e}"),
        })
    }
}

impl ControlRenderer for AptFtparchive {
    fn render_source(&self, dsc: &Path) -> Result<Stanza> {
        if self.binary.is_none() {
            debug!(dsc = %dsc.display(), "apt-ftparchive unavailable, rendering natively");
            return render_dsc(dsc);
        }
        let text = self.run("sources", dsc)?;
        Ok(Stanza::parse_one(&text)?)
    }

    fn render_binary(&self, deb: &Path) -> Result<BinaryControl> {
        let stanza = Stanza::parse_one(&self.run("packages", deb)?)?;
        let contents = self
            .run("contents", deb)?
            .lines()
            .filter_map(|line| line.split('\t').next())
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect();
        Ok(BinaryControl { stanza, contents })
    }
}

/// Render a `.dsc` into a `Sources` stanza without external tools.
///
/// Signature armor is stripped (not verified), `Source` becomes
/// `Package`, and the `.dsc` is added to every checksum section. Digests
/// the `.dsc` does not declare are computed from the files beside it;
/// declared ones are kept so later verification can catch tampering.
///
/// # Errors
///
/// Fails on unreadable files or malformed control data.
pub fn render_dsc(dsc: &Path) -> Result<Stanza> {
    let raw = std::fs::read(dsc).map_err(|e| ArchiveError::io_at(dsc, e))?;
    let text = String::from_utf8(raw).map_err(|e| {
        ArchiveError::MalformedIndex(format!("{} is not UTF-8: {e}", dsc.display()))
    })?;
    let mut stanza = Stanza::parse_one(&strip_clearsign(&text))?;

    if let Some(source) = stanza.take("Source") {
        stanza.set("Package", source);
    }
    let dir = dsc.parent().unwrap_or_else(|| Path::new("."));
    let dsc_name = dsc
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ArchiveError::MalformedIndex(format!("bad dsc path {}", dsc.display())))?;

    let mut files = merge_checksum_sections(&stanza, None)?;
    files.retain(|f| f.fname != dsc_name);
    for file in &mut files {
        let missing: Vec<_> = HashAlgorithm::ALL
            .into_iter()
            .filter(|a| file.digest(*a).is_none())
            .collect();
        let local = dir.join(&file.fname);
        if missing.is_empty() || !local.is_file() {
            continue;
        }
        let hashes = hash_file(&local).map_err(|e| ArchiveError::io_at(&local, e))?;
        for algorithm in missing {
            file.set_digest(algorithm, hashes.get(algorithm).clone());
        }
    }
    let own = hash_file(dsc).map_err(|e| ArchiveError::io_at(dsc, e))?;
    files.insert(0, crate::checksum::declared_from(dsc_name, &own));

    for algorithm in HashAlgorithm::ALL {
        stanza.set(algorithm.section_name(), format_checksum_section(&files, algorithm));
    }
    Ok(stanza)
}

fn format_checksum_section(files: &[ArchiveFile], algorithm: HashAlgorithm) -> String {
    let mut out = String::new();
    for file in files {
        if let Some(digest) = file.digest(algorithm) {
            out.push('\n');
            out.push_str(&format!(
                "{digest} {} {}",
                file.size.unwrap_or_default(),
                file.fname
            ));
        }
    }
    out
}

/// Merge the `Files` and `Checksums-*` sections of a stanza.
///
/// Each line is `<digest> <size> <name>`; `Files` in `.changes` files
/// carries section and priority before the name, which is always the
/// last field. Names are made relative to `base_dir` when given. Every
/// present section must list the same set of files with the same sizes.
///
/// # Errors
///
/// Returns [`ArchiveError::MalformedIndex`] on bad lines, invalid digests,
/// unsafe file names or sections that disagree.
pub fn merge_checksum_sections(stanza: &Stanza, base_dir: Option<&str>) -> Result<Vec<ArchiveFile>> {
    let mut files: BTreeMap<String, ArchiveFile> = BTreeMap::new();
    let mut order: Vec<String> = Vec::new();
    let mut sections_seen = 0;

    for algorithm in HashAlgorithm::ALL {
        if !stanza.contains(algorithm.section_name()) {
            continue;
        }
        let mut listed = BTreeSet::new();
        for line in stanza.lines(algorithm.section_name()) {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 3 {
                return Err(ArchiveError::MalformedIndex(format!(
                    "bad {} line '{line}'",
                    algorithm.section_name()
                )));
            }
            let digest = HexDigest::new(algorithm, parts[0])
                .map_err(|e| ArchiveError::MalformedIndex(e.to_string()))?;
            let size: u64 = parts[1].parse().map_err(|_| {
                ArchiveError::MalformedIndex(format!("bad size in line '{line}'"))
            })?;
            let name = parts[parts.len() - 1];
            let basename = name.rsplit('/').next().unwrap_or(name).to_string();
            if !SAFE_FILENAME.is_match(&basename) {
                return Err(ArchiveError::MalformedIndex(format!(
                    "unsafe file name '{name}' in {}",
                    algorithm.section_name()
                )));
            }

            if !files.contains_key(&basename) {
                if sections_seen > 0 {
                    return Err(ArchiveError::MalformedIndex(format!(
                        "{basename} is listed in {} but not in earlier checksum sections",
                        algorithm.section_name()
                    )));
                }
                let fname = match base_dir {
                    Some(dir) if !dir.is_empty() => {
                        format!("{}/{basename}", dir.trim_end_matches('/'))
                    }
                    _ => basename.clone(),
                };
                order.push(basename.clone());
                files.insert(basename.clone(), ArchiveFile::new(fname));
            }
            let Some(entry) = files.get_mut(&basename) else {
                continue;
            };
            if entry.size.is_some_and(|s| s != size) {
                return Err(ArchiveError::MalformedIndex(format!(
                    "conflicting sizes declared for {basename}"
                )));
            }
            entry.size = Some(size);
            entry.set_digest(algorithm, digest);
            listed.insert(basename);
        }
        if sections_seen > 0 && listed.len() != files.len() {
            return Err(ArchiveError::MalformedIndex(format!(
                "{} does not list every file",
                algorithm.section_name()
            )));
        }
        sections_seen += 1;
    }

    Ok(order
        .into_iter()
        .filter_map(|name| files.remove(&name))
        .collect())
}

/// Parse the `Source` field of a binary stanza into a source name and version.
///
/// `name (version)` yields both; a bare name inherits the binary's
/// version; an absent or empty field means the binary is its own source.
///
/// # Errors
///
/// Returns [`ArchiveError::MalformedIndex`] for an unbalanced parenthesis
/// or an invalid version.
pub fn parse_source_field(
    field: Option<&str>,
    package: &str,
    version: &DebVersion,
) -> Result<(String, DebVersion)> {
    let Some(raw) = field.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok((package.to_string(), version.clone()));
    };
    match raw.split_once('(') {
        Some((name, rest)) => {
            let Some((ver, _)) = rest.split_once(')') else {
                return Err(ArchiveError::MalformedIndex(format!(
                    "unbalanced Source field '{raw}' of {package}"
                )));
            };
            Ok((name.trim().to_string(), DebVersion::parse(ver.trim())?))
        }
        None => Ok((raw.to_string(), version.clone())),
    }
}

/// Parse a `Package-List` field.
///
/// Lines are `name type section priority [key=value ...]`; `arch=` lists
/// override `default_archs`, a `component/section` overrides
/// `default_component`. Lines with fewer than four fields are skipped.
///
/// # Errors
///
/// Returns [`ArchiveError::MalformedIndex`] for unknown package types.
pub fn parse_package_list(
    raw: &str,
    default_version: &DebVersion,
    default_archs: &[Architecture],
    default_component: &str,
) -> Result<Vec<PackageInfo>> {
    let mut infos = Vec::new();
    for line in raw.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 4 {
            continue;
        }
        let deb_type: DebType = parts[1]
            .parse()
            .map_err(ArchiveError::MalformedIndex)?;
        let (component, section) = match parts[2].split_once('/') {
            Some((component, section)) => (component.to_string(), section.to_string()),
            None => (default_component.to_string(), parts[2].to_string()),
        };
        let mut architectures = default_archs.to_vec();
        let mut essential = false;
        for extra in &parts[4..] {
            if let Some(archs) = extra.strip_prefix("arch=") {
                architectures = archs.split(',').map(Architecture::new).collect();
            } else if *extra == "essential=yes" {
                essential = true;
            }
        }
        infos.push(PackageInfo {
            name: parts[0].to_string(),
            deb_type,
            version: default_version.clone(),
            component,
            section,
            priority: PackagePriority::parse_lenient(parts[3]),
            architectures,
            essential,
        });
    }
    Ok(infos)
}

/// Binaries a source stanza declares, from `Package-List` or the `Binary` fallback.
///
/// Returns the infos and whether the fallback was used; fallback stubs
/// take section, priority and essential from the source stanza itself.
///
/// # Errors
///
/// Propagates [`parse_package_list`] failures.
pub fn expected_binaries(
    stanza: &Stanza,
    version: &DebVersion,
    archs: &[Architecture],
    component: &str,
) -> Result<(Vec<PackageInfo>, bool)> {
    if let Some(raw) = stanza.get_nonempty("Package-List") {
        return Ok((parse_package_list(raw, version, archs, component)?, false));
    }
    let section = stanza.get_nonempty("Section").unwrap_or("misc").to_string();
    let priority = PackagePriority::parse_lenient(stanza.get("Priority").unwrap_or_default());
    let essential = stanza.get("Essential").is_some_and(|e| e.trim() == "yes");
    let stubs = stanza
        .get("Binary")
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| PackageInfo {
            name: name.to_string(),
            deb_type: DebType::Deb,
            version: version.clone(),
            component: component.to_string(),
            section: section.clone(),
            priority,
            architectures: archs.to_vec(),
            essential,
        })
        .collect();
    Ok((stubs, true))
}

/// Log the fallback diagnostic for a source without `Package-List`.
pub(crate) fn warn_binary_fallback(name: &str, version: &DebVersion, location: &str) {
    warn!(
        "Source package {name}/{version} in {location} has no Package-List, \
         falling back to parsing Binary"
    );
}

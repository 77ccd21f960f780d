//! Package, override and uploader records shared across the archive.

use serde::{Deserialize, Serialize};

use crate::arch::{Architecture, DebType};
use crate::hash::{HashAlgorithm, HexDigest};
use crate::stanza::ExtraFields;
use crate::version::DebVersion;

/// Errors raised while validating schema values.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// A digest has the wrong length or alphabet for its algorithm.
    #[error("Invalid {algorithm} digest '{value}'")]
    InvalidDigest {
        /// Algorithm the digest was declared for.
        algorithm: &'static str,
        /// The offending text.
        value: String,
    },

    /// A version string is not a valid Debian version.
    #[error("Invalid version '{value}': {reason}")]
    InvalidVersion {
        /// The offending text.
        value: String,
        /// What is wrong with it.
        reason: String,
    },

    /// deb822 data could not be parsed.
    #[error("Malformed control data: {0}")]
    MalformedStanza(String),

    /// An enum-like field holds an unknown value.
    #[error("Unknown {field} value '{value}'")]
    UnknownValue {
        /// Field being parsed.
        field: &'static str,
        /// The offending text.
        value: String,
    },
}

/// A file owned by exactly one source or binary package.
///
/// `fname` is relative to the root it lives under: the repository pool
/// root once published, or the NEW-queue root while under review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveFile {
    /// Relative path, e.g. `pool/f/foo/foo_1.0.dsc`.
    pub fname: String,
    /// Declared size in bytes, if known.
    pub size: Option<u64>,
    /// Declared MD5 digest.
    pub md5: Option<HexDigest>,
    /// Declared SHA1 digest.
    pub sha1: Option<HexDigest>,
    /// Declared SHA256 digest.
    pub sha256: Option<HexDigest>,
    /// Declared SHA512 digest.
    pub sha512: Option<HexDigest>,
}

impl ArchiveFile {
    /// A file record with no declared checksums yet.
    pub fn new(fname: impl Into<String>) -> Self {
        Self {
            fname: fname.into(),
            size: None,
            md5: None,
            sha1: None,
            sha256: None,
            sha512: None,
        }
    }

    /// Final path component of `fname`.
    pub fn basename(&self) -> &str {
        self.fname.rsplit('/').next().unwrap_or(&self.fname)
    }

    /// Declared digest for an algorithm.
    pub fn digest(&self, algorithm: HashAlgorithm) -> Option<&HexDigest> {
        match algorithm {
            HashAlgorithm::Md5 => self.md5.as_ref(),
            HashAlgorithm::Sha1 => self.sha1.as_ref(),
            HashAlgorithm::Sha256 => self.sha256.as_ref(),
            HashAlgorithm::Sha512 => self.sha512.as_ref(),
        }
    }

    /// Set the declared digest for an algorithm.
    pub fn set_digest(&mut self, algorithm: HashAlgorithm, digest: HexDigest) {
        match algorithm {
            HashAlgorithm::Md5 => self.md5 = Some(digest),
            HashAlgorithm::Sha1 => self.sha1 = Some(digest),
            HashAlgorithm::Sha256 => self.sha256 = Some(digest),
            HashAlgorithm::Sha512 => self.sha512 = Some(digest),
        }
    }
}

/// Debian package priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PackagePriority {
    /// `required`
    Required,
    /// `important`
    Important,
    /// `standard`
    Standard,
    /// `optional`, the default for anything unspecified.
    #[default]
    Optional,
    /// `extra`, deprecated alias kept for old archives.
    Extra,
}

impl PackagePriority {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Required => "required",
            Self::Important => "important",
            Self::Standard => "standard",
            Self::Optional => "optional",
            Self::Extra => "extra",
        }
    }

    /// Parse a priority, mapping unknown or empty values to `optional`.
    pub fn parse_lenient(s: &str) -> Self {
        s.parse().unwrap_or_default()
    }
}

impl std::fmt::Display for PackagePriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PackagePriority {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "required" => Ok(Self::Required),
            "important" => Ok(Self::Important),
            "standard" => Ok(Self::Standard),
            "optional" => Ok(Self::Optional),
            "extra" => Ok(Self::Extra),
            _ => Err(SchemaError::UnknownValue {
                field: "Priority",
                value: s.to_string(),
            }),
        }
    }
}

/// How uploads to a suite are routed between the pool and the NEW queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum NewPolicy {
    /// NEW only when overrides are missing.
    #[default]
    Default,
    /// Everything goes through NEW.
    AlwaysNew,
    /// Nothing goes through NEW; missing overrides are registered on the fly.
    NeverNew,
}

impl NewPolicy {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::AlwaysNew => "always-new",
            Self::NeverNew => "never-new",
        }
    }
}

impl std::fmt::Display for NewPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for NewPolicy {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "default" => Ok(Self::Default),
            "always-new" => Ok(Self::AlwaysNew),
            "never-new" => Ok(Self::NeverNew),
            _ => Err(SchemaError::UnknownValue {
                field: "new policy",
                value: s.to_string(),
            }),
        }
    }
}

/// A binary package a source declares it will build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageInfo {
    /// Binary package name.
    pub name: String,
    /// `.deb` or `.udeb`.
    pub deb_type: DebType,
    /// Expected version, usually the source version.
    pub version: DebVersion,
    /// Component the binary is expected in.
    pub component: String,
    /// Archive section.
    pub section: String,
    /// Priority.
    pub priority: PackagePriority,
    /// Architectures the binary is built for.
    pub architectures: Vec<Architecture>,
    /// Whether the package is marked essential.
    pub essential: bool,
}

/// Classification of a binary package within one repository-suite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Override {
    /// Binary package name.
    pub package: String,
    /// Archive section.
    pub section: String,
    /// Priority.
    pub priority: PackagePriority,
    /// Essential flag.
    pub essential: bool,
    /// Component the package is filed under.
    pub component: String,
}

impl Override {
    /// Build an override from the classification a source declares.
    pub fn from_info(info: &PackageInfo) -> Self {
        Self {
            package: info.name.clone(),
            section: info.section.clone(),
            priority: info.priority,
            essential: info.essential,
            component: info.component.clone(),
        }
    }
}

/// Dependency relationship fields of a binary package.
///
/// Each entry is one comma-separated clause, alternatives (`a | b`) kept
/// intact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relations {
    /// `Depends`
    pub depends: Vec<String>,
    /// `Pre-Depends`
    pub pre_depends: Vec<String>,
    /// `Recommends`
    pub recommends: Vec<String>,
    /// `Suggests`
    pub suggests: Vec<String>,
    /// `Enhances`
    pub enhances: Vec<String>,
    /// `Conflicts`
    pub conflicts: Vec<String>,
    /// `Breaks`
    pub breaks: Vec<String>,
    /// `Replaces`
    pub replaces: Vec<String>,
    /// `Provides`
    pub provides: Vec<String>,
    /// `Built-Using`
    pub built_using: Vec<String>,
}

/// Split a comma separated relationship field into trimmed clauses.
pub fn split_relation_list(field: &str) -> Vec<String> {
    field
        .split(',')
        .map(|s| s.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|s| !s.is_empty())
        .collect()
}

/// A source package as known to the archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcePackage {
    /// Source package name.
    pub name: String,
    /// Source version.
    pub version: DebVersion,
    /// Repository the package belongs to.
    pub repo: String,
    /// Component (`main`, `contrib`, ...).
    pub component: String,
    /// Source format, e.g. `3.0 (quilt)`.
    pub format_version: String,
    /// Architectures the source builds for.
    pub architectures: Vec<Architecture>,
    /// Archive section of the source.
    pub section: Option<String>,
    /// `Standards-Version`
    pub standards_version: Option<String>,
    /// `Maintainer`
    pub maintainer: String,
    /// `Original-Maintainer`, for sources adopted from another distribution.
    pub original_maintainer: Option<String>,
    /// `Uploaders`, one per entry.
    pub uploaders: Vec<String>,
    /// `Homepage`
    pub homepage: Option<String>,
    /// `Vcs-Browser`
    pub vcs_browser: Option<String>,
    /// `Vcs-Git`
    pub vcs_git: Option<String>,
    /// `Build-Depends`
    pub build_depends: Vec<String>,
    /// `Build-Depends-Indep`
    pub build_depends_indep: Vec<String>,
    /// `Build-Conflicts`
    pub build_conflicts: Vec<String>,
    /// `Build-Conflicts-Indep`
    pub build_conflicts_indep: Vec<String>,
    /// Pool directory the files live in.
    pub directory: String,
    /// Files making up the source, the `.dsc` included.
    pub files: Vec<ArchiveFile>,
    /// Binaries this source declares it builds.
    pub expected_binaries: Vec<PackageInfo>,
    /// Unmodeled control fields.
    pub extra: ExtraFields,
}

impl SourcePackage {
    /// The `.dsc` among the source's files.
    pub fn dsc_file(&self) -> Option<&ArchiveFile> {
        self.files.iter().find(|f| f.fname.ends_with(".dsc"))
    }
}

/// A binary package as known to the archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryPackage {
    /// Binary package name.
    pub name: String,
    /// Binary version.
    pub version: DebVersion,
    /// Architecture the binary was built for.
    pub architecture: Architecture,
    /// `.deb` or `.udeb`.
    pub deb_type: DebType,
    /// Repository the package belongs to.
    pub repo: String,
    /// Component.
    pub component: String,
    /// Name of the source the binary was built from.
    pub source_name: String,
    /// Version of the source the binary was built from.
    pub source_version: DebVersion,
    /// `Maintainer`
    pub maintainer: String,
    /// `Original-Maintainer`
    pub original_maintainer: Option<String>,
    /// `Homepage`
    pub homepage: Option<String>,
    /// `Installed-Size` in KiB.
    pub size_installed: u64,
    /// Package description, first line is the synopsis.
    pub description: String,
    /// `Description-md5` for translated descriptions.
    pub description_md5: Option<String>,
    /// `Multi-Arch`
    pub multi_arch: Option<String>,
    /// Relationship fields.
    pub relations: Relations,
    /// Classification (section, priority, essential).
    pub override_info: Option<Override>,
    /// The `.deb`/`.udeb` artifact.
    pub file: Option<ArchiveFile>,
    /// Paths shipped by the package.
    pub contents: Vec<String>,
    /// Unmodeled control fields.
    pub extra: ExtraFields,
}

/// An upload waiting for manual review before publication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewQueueEntry {
    /// Source package name.
    pub source_name: String,
    /// Source version.
    pub source_version: DebVersion,
    /// Suite the source will be published into when accepted.
    pub destination_suite: String,
    /// Component of the queued source.
    pub component: String,
}

/// A party permitted to upload to the archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Uploader {
    /// E-mail address, unique per uploader.
    pub email: String,
    /// Display name.
    pub name: Option<String>,
    /// OpenPGP fingerprints of the uploader's keys.
    pub pgp_fingerprints: Vec<String>,
    /// Whether sourceful uploads are permitted.
    pub allow_source_uploads: bool,
    /// Whether binary artifacts are permitted.
    pub allow_binary_uploads: bool,
    /// Whether every upload must pass through NEW.
    pub always_review: bool,
    /// Source names this uploader may touch, empty for all.
    pub allowed_packages: Vec<String>,
}

impl Uploader {
    /// An uploader with default permissions: sources and binaries allowed,
    /// no forced review.
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: None,
            pgp_fingerprints: Vec::new(),
            allow_source_uploads: true,
            allow_binary_uploads: true,
            always_review: false,
            allowed_packages: Vec::new(),
        }
    }

    /// Whether the uploader may touch the named source package.
    pub fn may_upload(&self, source_name: &str) -> bool {
        self.allowed_packages.is_empty() || self.allowed_packages.iter().any(|p| p == source_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relation_lists_are_normalized() {
        let deps = split_relation_list("libc6 (>= 2.34),\n  zlib1g | libz,, python3:any ");
        assert_eq!(deps, vec!["libc6 (>= 2.34)", "zlib1g | libz", "python3:any"]);
        assert!(split_relation_list("").is_empty());
    }

    #[test]
    fn priority_parsing() {
        assert_eq!("Required".parse::<PackagePriority>(), Ok(PackagePriority::Required));
        assert!("urgent".parse::<PackagePriority>().is_err());
        assert_eq!(PackagePriority::parse_lenient("urgent"), PackagePriority::Optional);
    }

    #[test]
    fn new_policy_names() {
        assert_eq!("never_new".parse::<NewPolicy>(), Ok(NewPolicy::NeverNew));
        assert_eq!(NewPolicy::AlwaysNew.to_string(), "always-new");
        assert!("sometimes".parse::<NewPolicy>().is_err());
    }

    #[test]
    fn archive_file_basename_and_digests() {
        let mut file = ArchiveFile::new("pool/f/foo/foo_1.0.dsc");
        assert_eq!(file.basename(), "foo_1.0.dsc");
        assert!(file.digest(HashAlgorithm::Sha256).is_none());
        let digest = HexDigest::new(HashAlgorithm::Md5, "b1946ac92492d2347c6235b4d2611184").unwrap();
        file.set_digest(HashAlgorithm::Md5, digest.clone());
        assert_eq!(file.digest(HashAlgorithm::Md5), Some(&digest));
    }

    #[test]
    fn uploader_package_allow_list() {
        let mut uploader = Uploader::new("jane@example.org");
        assert!(uploader.may_upload("anything"));
        uploader.allowed_packages = vec!["foo".to_string()];
        assert!(uploader.may_upload("foo"));
        assert!(!uploader.may_upload("bar"));
    }
}

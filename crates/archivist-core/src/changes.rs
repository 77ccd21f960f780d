//! Upload manifests (`.changes` files).

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use archivist_schema::{Architecture, DebVersion, HashAlgorithm, HexDigest, Stanza, hash_file};
use regex::Regex;

use crate::error::{ArchiveError, Result};

/// File names an upload may reference: no separators, no leading dot or dash.
pub(crate) static SAFE_FILENAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9_.~+-]*$").unwrap_or_else(|e| unreachable!("{e}"))
});

/// One entry of the `Files` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangesFile {
    /// Bare file name, located beside the manifest.
    pub fname: String,
    /// Declared size.
    pub size: u64,
    /// Declared MD5.
    pub md5: HexDigest,
    /// Component, `main` unless the section says `component/section`.
    pub component: String,
    /// Archive section.
    pub section: String,
    /// Priority as written.
    pub priority: String,
}

impl ChangesFile {
    /// Whether the file is a source control file.
    pub fn is_dsc(&self) -> bool {
        self.fname.ends_with(".dsc")
    }

    /// Whether the file is a binary artifact.
    pub fn is_binary(&self) -> bool {
        self.fname.ends_with(".deb") || self.fname.ends_with(".udeb")
    }
}

/// A parsed upload manifest.
#[derive(Debug, Clone)]
pub struct Changes {
    /// `Source`
    pub source_name: String,
    /// `Version`
    pub version: DebVersion,
    /// `Distribution`, split on whitespace.
    pub distributions: Vec<String>,
    /// `Architecture`
    pub architectures: Vec<Architecture>,
    /// `Changed-By`
    pub changed_by: Option<String>,
    stanza: Stanza,
    directory: PathBuf,
}

impl Changes {
    /// Parse the (already unwrapped) text of a manifest located in `directory`.
    ///
    /// # Errors
    ///
    /// [`ArchiveError::InvalidChanges`] when `Source`, `Version` or
    /// `Distribution` are missing or invalid.
    pub fn parse(text: &str, directory: impl Into<PathBuf>) -> Result<Self> {
        let stanza = Stanza::parse_one(text).map_err(|e| ArchiveError::InvalidChanges(e.to_string()))?;
        let field = |name: &str| {
            stanza
                .get_nonempty(name)
                .map(|v| v.trim().to_string())
                .ok_or_else(|| ArchiveError::InvalidChanges(format!("missing {name} field")))
        };
        let source_name = field("Source")?
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_string();
        let version = DebVersion::parse(&field("Version")?)
            .map_err(|e| ArchiveError::InvalidChanges(e.to_string()))?;
        let distributions = field("Distribution")?
            .split_whitespace()
            .map(str::to_string)
            .collect();

        Ok(Self {
            architectures: Architecture::parse_list(stanza.get("Architecture").unwrap_or_default()),
            changed_by: stanza.get_nonempty("Changed-By").map(str::to_string),
            source_name,
            version,
            distributions,
            stanza,
            directory: directory.into(),
        })
    }

    /// Whether the upload carries source (its architectures include `source`).
    pub fn sourceful(&self) -> bool {
        self.architectures.iter().any(|a| *a == "source")
    }

    /// Directory the manifest and its files live in.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Raw manifest fields.
    pub fn stanza(&self) -> &Stanza {
        &self.stanza
    }

    /// Entries of the `Files` section, each checked against the file beside
    /// the manifest.
    ///
    /// # Errors
    ///
    /// [`ArchiveError::InvalidChanges`] for short lines, unsafe names,
    /// missing files and size or MD5 mismatches.
    pub fn files(&self) -> Result<Vec<ChangesFile>> {
        let mut files = Vec::new();
        for line in self.stanza.lines("Files") {
            let parts: Vec<&str> = line.split_whitespace().collect();
            let [md5, size, section, priority, fname] = parts.as_slice() else {
                return Err(ArchiveError::InvalidChanges(format!(
                    "Files entry '{line}' does not have five fields"
                )));
            };
            if !SAFE_FILENAME.is_match(fname) {
                return Err(ArchiveError::InvalidChanges(format!("unsafe file name '{fname}'")));
            }
            let size: u64 = size
                .parse()
                .map_err(|_| ArchiveError::InvalidChanges(format!("bad size for {fname}")))?;
            let md5 = HexDigest::new(HashAlgorithm::Md5, md5)
                .map_err(|e| ArchiveError::InvalidChanges(e.to_string()))?;
            let (component, section) = match section.split_once('/') {
                Some((component, section)) => (component.to_string(), section.to_string()),
                None => ("main".to_string(), (*section).to_string()),
            };

            let path = self.directory.join(fname);
            if !path.is_file() {
                return Err(ArchiveError::InvalidChanges(format!("{fname} is missing from the upload")));
            }
            let actual = hash_file(&path).map_err(|e| ArchiveError::io_at(&path, e))?;
            if actual.size != size {
                return Err(ArchiveError::InvalidChanges(format!(
                    "{fname} has {} bytes, the manifest declares {size}",
                    actual.size
                )));
            }
            if *actual.get(HashAlgorithm::Md5) != md5 {
                return Err(ArchiveError::InvalidChanges(format!("MD5 mismatch for {fname}")));
            }

            files.push(ChangesFile {
                fname: (*fname).to_string(),
                size,
                md5,
                component,
                section,
                priority: (*priority).to_string(),
            });
        }
        if files.is_empty() {
            return Err(ArchiveError::InvalidChanges("no files listed".to_string()));
        }
        Ok(files)
    }
}

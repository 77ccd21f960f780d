//! Archive configuration.
//!
//! Loaded from a TOML file (`ARCHIVIST_CONFIG`), falling back to a default
//! layout under a workspace directory (`ARCHIVIST_WORKSPACE`, else the
//! user's data directory).
//!
//! ```toml
//! workspace = "/srv/archive"
//!
//! [archive]
//! keep_source_packages = false
//!
//! [reader]
//! strict_architecture = false
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{ArchiveError, Result};

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "ARCHIVIST_CONFIG";

/// Environment variable overriding the workspace directory.
pub const WORKSPACE_ENV: &str = "ARCHIVIST_WORKSPACE";

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    workspace: Option<PathBuf>,
    #[serde(default)]
    archive: ArchiveSection,
    #[serde(default)]
    reader: ReaderSection,
    #[serde(default)]
    gpg: GpgSection,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ArchiveSection {
    root: Option<PathBuf>,
    queue_root: Option<PathBuf>,
    cache_dir: Option<PathBuf>,
    uploaders_keyring_dir: Option<PathBuf>,
    database: Option<PathBuf>,
    #[serde(default)]
    keep_source_packages: bool,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ReaderSection {
    #[serde(default)]
    strict_architecture: bool,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct GpgSection {
    binary: Option<String>,
}

/// Resolved archive configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveConfig {
    /// Base directory for everything below.
    pub workspace: PathBuf,
    /// Directory holding one published pool tree per repository.
    pub archive_root: PathBuf,
    /// Directory holding per-repository review queues.
    pub queue_root: PathBuf,
    /// Cache for remote repository downloads.
    pub cache_dir: PathBuf,
    /// Directory of keyrings trusted for upload signatures.
    pub uploaders_keyring_dir: PathBuf,
    /// SQLite database path.
    pub database: PathBuf,
    /// Keep uploaded artifacts after importing them instead of moving them.
    pub keep_source_packages: bool,
    /// Treat architecture mismatches in `Packages` indices as errors.
    pub strict_architecture: bool,
    /// gpg executable name or path.
    pub gpg_binary: String,
}

impl ArchiveConfig {
    /// Default layout rooted at `workspace`.
    pub fn with_workspace(workspace: impl Into<PathBuf>) -> Self {
        Self::from_file(ConfigFile::default(), workspace.into())
    }

    /// Parse configuration text.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::Config`] if the TOML is invalid or no
    /// workspace can be determined.
    pub fn parse(text: &str) -> Result<Self> {
        let file: ConfigFile =
            toml::from_str(text).map_err(|e| ArchiveError::Config(e.to_string()))?;
        let workspace = match file.workspace.clone() {
            Some(ws) => ws,
            None => default_workspace()?,
        };
        Ok(Self::from_file(file, workspace))
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::Config`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            ArchiveError::Config(format!("Failed to read {}: {e}", path.display()))
        })?;
        Self::parse(&text)
    }

    /// Load from `ARCHIVIST_CONFIG` if set, else use the default layout.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::Config`] if the named file is unusable or no
    /// workspace directory can be determined.
    pub fn from_env() -> Result<Self> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Self::load(Path::new(&path));
        }
        Ok(Self::with_workspace(default_workspace()?))
    }

    fn from_file(file: ConfigFile, workspace: PathBuf) -> Self {
        let archive = file.archive;
        Self {
            archive_root: archive.root.unwrap_or_else(|| workspace.join("archive")),
            queue_root: archive
                .queue_root
                .unwrap_or_else(|| workspace.join("archive-queues")),
            cache_dir: archive.cache_dir.unwrap_or_else(|| workspace.join("cache")),
            uploaders_keyring_dir: archive
                .uploaders_keyring_dir
                .unwrap_or_else(|| workspace.join("keys").join("uploaders")),
            database: archive
                .database
                .unwrap_or_else(|| workspace.join("archive.db")),
            keep_source_packages: archive.keep_source_packages,
            strict_architecture: file.reader.strict_architecture,
            gpg_binary: file.gpg.binary.unwrap_or_else(|| "gpg".to_string()),
            workspace,
        }
    }

    /// Published pool root of a repository: `<archive_root>/<repo>`.
    pub fn pool_root(&self, repo: &str) -> PathBuf {
        self.archive_root.join(repo)
    }

    /// NEW-queue root of a repository: `<queue_root>/<repo>/new`.
    pub fn new_queue_root(&self, repo: &str) -> PathBuf {
        self.queue_root.join(repo).join("new")
    }

    /// Directory holding publish lock files.
    pub fn lock_dir(&self) -> PathBuf {
        self.workspace.join("locks")
    }

    /// Cache directory for a remote repository.
    pub fn repo_cache_dir(&self, repo: &str) -> PathBuf {
        self.cache_dir.join("repo_cache").join(repo)
    }

    /// Keyring files trusted for upload signatures, sorted by name.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the keyring directory exists but cannot be read.
    pub fn uploader_keyrings(&self) -> Result<Vec<PathBuf>> {
        if !self.uploaders_keyring_dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut keyrings = Vec::new();
        for entry in std::fs::read_dir(&self.uploaders_keyring_dir)? {
            let path = entry?.path();
            let is_keyring = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| matches!(e, "gpg" | "kbx" | "pgp" | "asc"));
            if is_keyring {
                keyrings.push(path);
            }
        }
        keyrings.sort();
        Ok(keyrings)
    }
}

fn default_workspace() -> Result<PathBuf> {
    if let Ok(val) = std::env::var(WORKSPACE_ENV) {
        return Ok(PathBuf::from(val));
    }
    dirs::data_dir()
        .map(|d| d.join("archivist"))
        .ok_or_else(|| {
            ArchiveError::Config(format!(
                "Could not determine a workspace directory. Set {WORKSPACE_ENV} to override."
            ))
        })
}

//! Error taxonomy for archive operations.

use std::path::PathBuf;

use archivist_schema::SchemaError;
use thiserror::Error;

/// Result alias used throughout the core crate.
pub type Result<T, E = ArchiveError> = std::result::Result<T, E>;

/// Every way an archive operation can fail.
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// A file's content does not match a declared digest.
    #[error("{algorithm} checksum mismatch for {file}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// File being verified.
        file: String,
        /// Algorithm that disagreed.
        algorithm: &'static str,
        /// Digest from the control data.
        expected: String,
        /// Digest of the bytes on disk.
        actual: String,
    },

    /// A file's size does not match the declared size.
    #[error("Size mismatch for {file}: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        /// File being verified.
        file: String,
        /// Declared size.
        expected: u64,
        /// Size on disk.
        actual: u64,
    },

    /// Too few digests were declared to admit a file.
    #[error("Not enough checksums declared for {file}: {checked} of {required} algorithms")]
    InsufficientHashes {
        /// File being verified.
        file: String,
        /// Number of digest checks that could be run.
        checked: usize,
        /// Number required.
        required: usize,
    },

    /// A signature was present but could not be trusted.
    #[error("Invalid signature: {0}")]
    SignatureInvalid(String),

    /// A signature was required but absent.
    #[error("Missing signature: {0}")]
    SignatureMissing(String),

    /// The suite's release manifest could not be obtained.
    #[error("Release manifest for suite '{suite}' not found in {location}")]
    ManifestUnavailable {
        /// Repository location.
        location: String,
        /// Suite that was requested.
        suite: String,
    },

    /// An index was requested that the release manifest does not list.
    #[error("'{path}' is not listed in the release manifest of suite '{suite}'")]
    NotInManifest {
        /// Suite-relative path.
        path: String,
        /// Suite whose manifest was consulted.
        suite: String,
    },

    /// Control data is structurally invalid.
    #[error("Malformed index data: {0}")]
    MalformedIndex(String),

    /// A version not newer than the recorded one was proposed.
    #[error(
        "Version regression for {package}: {proposed} is not newer than already published {recorded}"
    )]
    VersionRegression {
        /// Package name.
        package: String,
        /// Version being imported.
        proposed: String,
        /// Highest version already recorded.
        recorded: String,
    },

    /// A binary references a source the archive does not know.
    #[error("Binary {package}/{version} references unknown source {source_name}/{source_version}")]
    OrphanedBinary {
        /// Binary name.
        package: String,
        /// Binary version.
        version: String,
        /// Referenced source name.
        source_name: String,
        /// Referenced source version.
        source_version: String,
    },

    /// A binary has no override in the target suite.
    #[error("No override for {package}/{version} in {suite}; register one or route through NEW")]
    MissingOverride {
        /// Binary name.
        package: String,
        /// Binary version.
        version: String,
        /// Target suite.
        suite: String,
    },

    /// The target of a placement already exists.
    #[error("Refusing to overwrite existing archive file {}", .0.display())]
    DestinationExists(PathBuf),

    /// No uploader matches the signing key.
    #[error("Unable to find registered uploader for key {fingerprint} of {file}")]
    UnknownUploader {
        /// Fingerprint (or fingerprints) that signed the file.
        fingerprint: String,
        /// File that was signed.
        file: String,
    },

    /// An upload breaks archive policy.
    #[error("Policy violation: {0}")]
    PolicyViolation(String),

    /// A dependency report entry has an unexpected shape.
    #[error("Unrecognized dependency issue shape: {0}")]
    UnrecognizedDependencyIssueShape(String),

    /// An upload manifest is unusable.
    #[error("Invalid changes file: {0}")]
    InvalidChanges(String),

    /// A repository, suite or other configured entity does not exist.
    #[error("Not configured: {0}")]
    NotConfigured(String),

    /// A publish lock could not be taken.
    #[error("Could not lock {name}: {message}")]
    Lock {
        /// Lock name.
        name: String,
        /// What happened.
        message: String,
    },

    /// An external control-data renderer failed.
    #[error("Renderer failed for {}: {message}", .path.display())]
    Renderer {
        /// Artifact being rendered.
        path: PathBuf,
        /// Error output.
        message: String,
    },

    /// The external dependency checker could not produce a report.
    #[error("Dependency check failed for {arch}: {message}")]
    DependencyCheck {
        /// Architecture being checked.
        arch: String,
        /// Error output.
        message: String,
    },

    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A schema value failed validation.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Filesystem failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Database failure.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Network failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON (de)serialization failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ArchiveError {
    /// Wrap an I/O error with the path it concerns.
    pub fn io_at(path: &std::path::Path, err: std::io::Error) -> Self {
        Self::Io(std::io::Error::new(
            err.kind(),
            format!("{}: {err}", path.display()),
        ))
    }
}

//! archivist - Debian archive import and repository consistency engine
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
//!
//! Operator front end for `archivist-core`.
//!
//! # Overview
//!
//! Uploads arrive as signed `.changes` files and are either published into
//! a suite's pool or held in the NEW queue for review. The same commands
//! let operators import single artifacts, review NEW, configure suites and
//! uploaders, and inspect any local or remote repository.
//!
//! # Directory Layout
//!
//! ```text
//! <workspace>/
//! ├── archive/<repo>/pool/          # Published files
//! ├── archive-queues/<repo>/new/    # NEW queue
//! ├── keys/uploaders/               # Keyrings trusted for uploads
//! ├── locks/                        # Publish locks
//! ├── cache/repo_cache/<repo>/      # Remote repository downloads
//! └── archive.db                    # SQLite database
//! ```

pub mod cmd;
pub mod ui;

use std::path::PathBuf;

use archivist_schema::NewPolicy;
use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "archivist")]
#[command(author, version, about = "archivist - Debian archive import and repository consistency engine")]
pub struct Cli {
    /// Configuration file
    #[arg(long, global = true, env = "ARCHIVIST_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Verify and import a signed upload
    ProcessChanges {
        /// The .changes file
        file: PathBuf,
        /// Target repository
        #[arg(long, default_value = "master")]
        repo: String,
        /// Leave the uploaded files in place
        #[arg(long)]
        keep: bool,
    },
    /// Import a source package from a .dsc
    ImportSource {
        /// The .dsc file, with its files beside it
        dsc: PathBuf,
        #[arg(long, default_value = "master")]
        repo: String,
        #[arg(long)]
        suite: String,
        #[arg(long, default_value = "main")]
        component: String,
        /// NEW policy, defaults to the suite's
        #[arg(long)]
        policy: Option<NewPolicy>,
        /// Send the package through NEW
        #[arg(long)]
        review: bool,
        /// Leave the imported files in place
        #[arg(long)]
        keep: bool,
    },
    /// Import a binary package whose source is already known
    ImportBinary {
        /// The .deb or .udeb file
        deb: PathBuf,
        #[arg(long, default_value = "master")]
        repo: String,
        #[arg(long)]
        suite: String,
        /// Component, defaults to the one of the package's override
        #[arg(long)]
        component: Option<String>,
        /// Leave the imported file in place
        #[arg(long)]
        keep: bool,
    },
    /// Accept a source held in NEW
    AcceptNew {
        name: String,
        version: String,
        #[arg(long, default_value = "master")]
        repo: String,
        #[arg(long)]
        suite: String,
    },
    /// Reject a source held in NEW
    RejectNew {
        name: String,
        version: String,
        #[arg(long, default_value = "master")]
        repo: String,
        #[arg(long)]
        suite: String,
    },
    /// Show the NEW queue of a suite
    ListNew {
        #[arg(long, default_value = "master")]
        repo: String,
        #[arg(long)]
        suite: String,
    },
    /// List the source packages of a repository
    ListSources {
        #[command(flatten)]
        repository: RepositoryArgs,
        #[arg(long, default_value = "main")]
        component: String,
        /// Include sources only kept for Built-Using
        #[arg(long)]
        extra_source_only: bool,
        /// Only show the newest version of each package
        #[arg(long)]
        newest: bool,
    },
    /// List the binary packages of a repository
    ListBinaries {
        #[command(flatten)]
        repository: RepositoryArgs,
        #[arg(long, default_value = "main")]
        component: String,
        #[arg(long)]
        arch: String,
        /// Read this architecture's index when `arch` has none
        #[arg(long)]
        shadow_arch: Option<String>,
        /// List debian-installer packages instead
        #[arg(long)]
        installer: bool,
        /// Only show the newest version of each package
        #[arg(long)]
        newest: bool,
    },
    /// Report uninstallable binary packages of a suite
    CheckDepends {
        #[command(flatten)]
        repository: RepositoryArgs,
        /// Component to check, repeatable
        #[arg(long = "component", default_value = "main")]
        components: Vec<String>,
        /// Architecture to check, repeatable
        #[arg(long = "arch", required = true)]
        architectures: Vec<String>,
        /// Architecture whose index backs arch:all checks
        #[arg(long, default_value = "amd64")]
        primary_arch: String,
        /// Print the issues as JSON
        #[arg(long)]
        json: bool,
    },
    /// Create or update a suite of a repository
    AddRepoSuite {
        repo: String,
        suite: String,
        #[arg(long, default_value = "default")]
        policy: NewPolicy,
        /// Refuse uploads to this suite
        #[arg(long)]
        no_uploads: bool,
    },
    /// Register or update an uploader
    AddUploader {
        email: String,
        #[arg(long)]
        name: Option<String>,
        /// OpenPGP fingerprint, repeatable
        #[arg(long = "fingerprint", required = true)]
        fingerprints: Vec<String>,
        /// Refuse sourceful uploads
        #[arg(long)]
        no_source: bool,
        /// Refuse binary uploads
        #[arg(long)]
        no_binary: bool,
        /// Send every upload through NEW
        #[arg(long)]
        always_review: bool,
        /// Restrict uploads to these source packages, repeatable
        #[arg(long = "allow-package")]
        allowed_packages: Vec<String>,
    },
}

/// Where to read a repository from and how far to trust it.
#[derive(Debug, Clone, clap::Args)]
pub struct RepositoryArgs {
    /// Repository root: a local path or an http(s) URL
    pub location: String,
    #[arg(long)]
    pub suite: String,
    /// Name used for the download cache
    #[arg(long, default_value = "upstream")]
    pub name: String,
    /// Keyring to verify InRelease against, repeatable
    #[arg(long = "keyring")]
    pub keyrings: Vec<PathBuf>,
    /// Skip signature checks when no keyring is given
    #[arg(long)]
    pub trusted: bool,
}

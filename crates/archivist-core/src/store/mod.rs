//! SQLite archive database
//!
//! Tracks repositories, suites, uploaders, overrides, the package records
//! of every admitted or queued upload, and the version ledger.
//!
//! All access goes through a [`Session`]: one transaction that is committed
//! explicitly and rolled back when dropped.

mod archive;
mod ledger;
mod packages;

use std::path::Path;

use archivist_schema::NewPolicy;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use tracing::debug;

use crate::error::{ArchiveError, Result};

pub use packages::{BinaryId, SourceId};

/// Archive state database
#[derive(Debug)]
pub struct ArchiveDb {
    conn: Connection,
}

impl ArchiveDb {
    /// Open or create the database at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or the schema created.
    pub fn open_at(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ArchiveError::io_at(parent, e))?;
        }
        let conn = Connection::open(path)?;

        // WAL lets readers proceed while an import holds the write lock
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::init(conn)
    }

    /// In-memory database (for testing)
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys=ON; PRAGMA busy_timeout=30000;")?;
        let db = Self { conn };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS repositories (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL UNIQUE
            );

            CREATE TABLE IF NOT EXISTS suites (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL UNIQUE
            );

            CREATE TABLE IF NOT EXISTS repo_suites (
                id INTEGER PRIMARY KEY,
                repo_id INTEGER NOT NULL REFERENCES repositories(id),
                suite_id INTEGER NOT NULL REFERENCES suites(id),
                new_policy TEXT NOT NULL DEFAULT 'default',
                accept_uploads INTEGER NOT NULL DEFAULT 1,
                changes_pending INTEGER NOT NULL DEFAULT 0,
                UNIQUE (repo_id, suite_id)
            );

            CREATE TABLE IF NOT EXISTS uploaders (
                id INTEGER PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                name TEXT,
                allow_source_uploads INTEGER NOT NULL DEFAULT 1,
                allow_binary_uploads INTEGER NOT NULL DEFAULT 1,
                always_review INTEGER NOT NULL DEFAULT 0,
                allowed_packages TEXT NOT NULL DEFAULT '[]'
            );

            CREATE TABLE IF NOT EXISTS uploader_fingerprints (
                fingerprint TEXT PRIMARY KEY,
                uploader_id INTEGER NOT NULL REFERENCES uploaders(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS overrides (
                id INTEGER PRIMARY KEY,
                repo_suite_id INTEGER NOT NULL REFERENCES repo_suites(id) ON DELETE CASCADE,
                pkg_name TEXT NOT NULL,
                section TEXT NOT NULL,
                priority TEXT NOT NULL,
                essential INTEGER NOT NULL DEFAULT 0,
                component TEXT NOT NULL,
                UNIQUE (repo_suite_id, pkg_name)
            );

            CREATE TABLE IF NOT EXISTS source_packages (
                id INTEGER PRIMARY KEY,
                repo_id INTEGER NOT NULL REFERENCES repositories(id),
                name TEXT NOT NULL,
                version TEXT NOT NULL,
                component TEXT NOT NULL,
                data TEXT NOT NULL,
                UNIQUE (repo_id, name, version)
            );

            CREATE TABLE IF NOT EXISTS source_suites (
                source_id INTEGER NOT NULL REFERENCES source_packages(id) ON DELETE CASCADE,
                suite_id INTEGER NOT NULL REFERENCES suites(id),
                PRIMARY KEY (source_id, suite_id)
            );

            CREATE TABLE IF NOT EXISTS binary_packages (
                id INTEGER PRIMARY KEY,
                repo_id INTEGER NOT NULL REFERENCES repositories(id),
                source_id INTEGER NOT NULL REFERENCES source_packages(id),
                name TEXT NOT NULL,
                version TEXT NOT NULL,
                architecture TEXT NOT NULL,
                data TEXT NOT NULL,
                UNIQUE (repo_id, name, version, architecture)
            );

            CREATE TABLE IF NOT EXISTS binary_suites (
                binary_id INTEGER NOT NULL REFERENCES binary_packages(id) ON DELETE CASCADE,
                suite_id INTEGER NOT NULL REFERENCES suites(id),
                PRIMARY KEY (binary_id, suite_id)
            );

            CREATE TABLE IF NOT EXISTS archive_files (
                id INTEGER PRIMARY KEY,
                repo_id INTEGER NOT NULL REFERENCES repositories(id),
                fname TEXT NOT NULL,
                size INTEGER,
                md5 TEXT,
                sha1 TEXT,
                sha256 TEXT,
                sha512 TEXT,
                source_id INTEGER REFERENCES source_packages(id) ON DELETE CASCADE,
                binary_id INTEGER REFERENCES binary_packages(id) ON DELETE CASCADE,
                UNIQUE (repo_id, fname)
            );

            CREATE TABLE IF NOT EXISTS new_queue (
                id INTEGER PRIMARY KEY,
                source_id INTEGER NOT NULL UNIQUE REFERENCES source_packages(id) ON DELETE CASCADE,
                suite_id INTEGER NOT NULL REFERENCES suites(id)
            );

            CREATE TABLE IF NOT EXISTS version_memory (
                repo_id INTEGER NOT NULL REFERENCES repositories(id),
                pkg_name TEXT NOT NULL,
                arch_name TEXT NOT NULL,
                highest_version TEXT NOT NULL,
                PRIMARY KEY (repo_id, pkg_name, arch_name)
            );

            CREATE INDEX IF NOT EXISTS idx_binary_source ON binary_packages(source_id);
            CREATE INDEX IF NOT EXISTS idx_files_source ON archive_files(source_id);
            CREATE INDEX IF NOT EXISTS idx_files_binary ON archive_files(binary_id);
            ",
        )?;
        Ok(())
    }

    /// Start a write session.
    ///
    /// The transaction takes SQLite's write lock immediately so two
    /// importers never interleave.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction cannot be started.
    pub fn session(&mut self) -> Result<Session<'_>> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        Ok(Session { tx })
    }

    /// Start a session for lookups.
    ///
    /// The transaction is deferred: it holds no write lock unless it writes.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction cannot be started.
    pub fn read_session(&mut self) -> Result<Session<'_>> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Deferred)?;
        Ok(Session { tx })
    }
}

/// One database transaction.
///
/// Dropping a session without calling [`Session::commit`] rolls it back.
#[derive(Debug)]
pub struct Session<'conn> {
    tx: Transaction<'conn>,
}

impl Session<'_> {
    /// Make all changes of this session durable.
    ///
    /// # Errors
    ///
    /// Returns an error if SQLite refuses the commit.
    pub fn commit(self) -> Result<()> {
        self.tx.commit()?;
        debug!("session committed");
        Ok(())
    }

    /// Discard all changes of this session.
    ///
    /// # Errors
    ///
    /// Returns an error if SQLite refuses the rollback.
    pub fn rollback(self) -> Result<()> {
        self.tx.rollback()?;
        debug!("session rolled back");
        Ok(())
    }

    fn conn(&self) -> &Connection {
        &self.tx
    }
}

/// A suite of a repository with its admission settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoSuite {
    /// Row id of the repo-suite pairing.
    pub id: i64,
    /// Repository row id.
    pub repo_id: i64,
    /// Suite row id.
    pub suite_id: i64,
    /// Repository name.
    pub repo: String,
    /// Suite name.
    pub suite: String,
    /// How new packages are admitted.
    pub new_policy: NewPolicy,
    /// Whether uploads may target this suite.
    pub accept_uploads: bool,
    /// Set when published content changed and indices need regeneration.
    pub changes_pending: bool,
}

impl std::fmt::Display for RepoSuite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.repo, self.suite)
    }
}

/// Decode a JSON column.
fn from_json<T: serde::de::DeserializeOwned>(raw: &str) -> Result<T> {
    Ok(serde_json::from_str(raw)?)
}

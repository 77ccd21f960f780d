//! Repositories, suites, overrides and uploaders.

use archivist_schema::{NewPolicy, Override, PackagePriority, Uploader};
use rusqlite::{OptionalExtension, Row, params};

use super::{RepoSuite, Session, from_json};
use crate::error::{ArchiveError, Result};

const REPO_SUITE_COLUMNS: &str = "rs.id, rs.repo_id, rs.suite_id, r.name, s.name, \
     rs.new_policy, rs.accept_uploads, rs.changes_pending";

const REPO_SUITE_FROM: &str = "repo_suites rs \
     JOIN repositories r ON r.id = rs.repo_id \
     JOIN suites s ON s.id = rs.suite_id";

fn repo_suite_row(row: &Row<'_>) -> rusqlite::Result<(RepoSuite, String)> {
    Ok((
        RepoSuite {
            id: row.get(0)?,
            repo_id: row.get(1)?,
            suite_id: row.get(2)?,
            repo: row.get(3)?,
            suite: row.get(4)?,
            new_policy: NewPolicy::Default,
            accept_uploads: row.get(6)?,
            changes_pending: row.get(7)?,
        },
        row.get(5)?,
    ))
}

fn with_policy((mut rss, policy): (RepoSuite, String)) -> Result<RepoSuite> {
    rss.new_policy = policy.parse()?;
    Ok(rss)
}

impl Session<'_> {
    /// Id of the named repository, creating it if needed.
    ///
    /// # Errors
    ///
    /// Database failures.
    pub fn ensure_repository(&self, name: &str) -> Result<i64> {
        self.conn().execute(
            "INSERT OR IGNORE INTO repositories (name) VALUES (?1)",
            params![name],
        )?;
        Ok(self.conn().query_row(
            "SELECT id FROM repositories WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )?)
    }

    /// Id of the named suite, creating it if needed.
    ///
    /// # Errors
    ///
    /// Database failures.
    pub fn ensure_suite(&self, name: &str) -> Result<i64> {
        self.conn()
            .execute("INSERT OR IGNORE INTO suites (name) VALUES (?1)", params![name])?;
        Ok(self
            .conn()
            .query_row("SELECT id FROM suites WHERE name = ?1", params![name], |row| {
                row.get(0)
            })?)
    }

    /// Add a suite to a repository, or update its admission settings.
    ///
    /// # Errors
    ///
    /// Database failures.
    pub fn add_repo_suite(
        &self,
        repo: &str,
        suite: &str,
        new_policy: NewPolicy,
        accept_uploads: bool,
    ) -> Result<RepoSuite> {
        let repo_id = self.ensure_repository(repo)?;
        let suite_id = self.ensure_suite(suite)?;
        self.conn().execute(
            "INSERT INTO repo_suites (repo_id, suite_id, new_policy, accept_uploads)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (repo_id, suite_id)
             DO UPDATE SET new_policy = excluded.new_policy, accept_uploads = excluded.accept_uploads",
            params![repo_id, suite_id, new_policy.as_str(), accept_uploads],
        )?;
        self.require_repo_suite(repo, suite)
    }

    /// Look up a repository-suite by names.
    ///
    /// # Errors
    ///
    /// Database failures, or an unknown stored policy.
    pub fn repo_suite(&self, repo: &str, suite: &str) -> Result<Option<RepoSuite>> {
        let row = self
            .conn()
            .query_row(
                &format!(
                    "SELECT {REPO_SUITE_COLUMNS} FROM {REPO_SUITE_FROM} WHERE r.name = ?1 AND s.name = ?2"
                ),
                params![repo, suite],
                repo_suite_row,
            )
            .optional()?;
        row.map(with_policy).transpose()
    }

    /// Like [`Session::repo_suite`], failing when the pairing does not exist.
    ///
    /// # Errors
    ///
    /// [`ArchiveError::NotConfigured`] for unknown pairs.
    pub fn require_repo_suite(&self, repo: &str, suite: &str) -> Result<RepoSuite> {
        self.repo_suite(repo, suite)?.ok_or_else(|| {
            ArchiveError::NotConfigured(format!("suite '{suite}' in repository '{repo}'"))
        })
    }

    /// All repository-suites, optionally of one repository only.
    ///
    /// # Errors
    ///
    /// Database failures.
    pub fn repo_suites(&self, repo: Option<&str>) -> Result<Vec<RepoSuite>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {REPO_SUITE_COLUMNS} FROM {REPO_SUITE_FROM}
             WHERE ?1 IS NULL OR r.name = ?1 ORDER BY r.name, s.name"
        ))?;
        let rows = stmt
            .query_map(params![repo], repo_suite_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(with_policy).collect()
    }

    /// Flag (or clear) pending changes of a repository-suite.
    ///
    /// # Errors
    ///
    /// Database failures.
    pub fn set_changes_pending(&self, rss: &RepoSuite, pending: bool) -> Result<()> {
        self.conn().execute(
            "UPDATE repo_suites SET changes_pending = ?1 WHERE id = ?2",
            params![pending, rss.id],
        )?;
        Ok(())
    }

    /// Override of a package in a repository-suite.
    ///
    /// # Errors
    ///
    /// Database failures.
    pub fn override_for(&self, rss: &RepoSuite, package: &str) -> Result<Option<Override>> {
        let row = self
            .conn()
            .query_row(
                "SELECT pkg_name, section, priority, essential, component
                 FROM overrides WHERE repo_suite_id = ?1 AND pkg_name = ?2",
                params![rss.id, package],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, bool>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()?;
        Ok(row.map(|(package, section, priority, essential, component)| Override {
            package,
            section,
            priority: PackagePriority::parse_lenient(&priority),
            essential,
            component,
        }))
    }

    /// Insert an override unless one exists. Returns whether it was added.
    ///
    /// # Errors
    ///
    /// Database failures.
    pub fn add_override(&self, rss: &RepoSuite, ovr: &Override) -> Result<bool> {
        let section = if ovr.section.is_empty() { "misc" } else { &ovr.section };
        let added = self.conn().execute(
            "INSERT OR IGNORE INTO overrides
                (repo_suite_id, pkg_name, section, priority, essential, component)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                rss.id,
                ovr.package,
                section,
                ovr.priority.as_str(),
                ovr.essential,
                ovr.component
            ],
        )?;
        Ok(added > 0)
    }

    /// All overrides of a repository-suite, by package name.
    ///
    /// # Errors
    ///
    /// Database failures.
    pub fn overrides(&self, rss: &RepoSuite) -> Result<Vec<Override>> {
        let mut stmt = self.conn().prepare(
            "SELECT pkg_name, section, priority, essential, component
             FROM overrides WHERE repo_suite_id = ?1 ORDER BY pkg_name",
        )?;
        let rows = stmt.query_map(params![rss.id], |row| {
            Ok(Override {
                package: row.get(0)?,
                section: row.get(1)?,
                priority: PackagePriority::parse_lenient(&row.get::<_, String>(2)?),
                essential: row.get(3)?,
                component: row.get(4)?,
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    /// Register an uploader, replacing its permissions and fingerprints.
    ///
    /// # Errors
    ///
    /// Database failures; a fingerprint already bound to another uploader
    /// is a constraint violation.
    pub fn add_uploader(&self, uploader: &Uploader) -> Result<()> {
        self.conn().execute(
            "INSERT INTO uploaders
                (email, name, allow_source_uploads, allow_binary_uploads, always_review, allowed_packages)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (email) DO UPDATE SET
                name = excluded.name,
                allow_source_uploads = excluded.allow_source_uploads,
                allow_binary_uploads = excluded.allow_binary_uploads,
                always_review = excluded.always_review,
                allowed_packages = excluded.allowed_packages",
            params![
                uploader.email,
                uploader.name,
                uploader.allow_source_uploads,
                uploader.allow_binary_uploads,
                uploader.always_review,
                serde_json::to_string(&uploader.allowed_packages)?,
            ],
        )?;
        let id: i64 = self.conn().query_row(
            "SELECT id FROM uploaders WHERE email = ?1",
            params![uploader.email],
            |row| row.get(0),
        )?;
        self.conn().execute(
            "DELETE FROM uploader_fingerprints WHERE uploader_id = ?1",
            params![id],
        )?;
        for fpr in &uploader.pgp_fingerprints {
            self.conn().execute(
                "INSERT INTO uploader_fingerprints (fingerprint, uploader_id) VALUES (?1, ?2)",
                params![fpr.to_uppercase(), id],
            )?;
        }
        Ok(())
    }

    /// Uploader owning a key fingerprint.
    ///
    /// # Errors
    ///
    /// Database failures.
    pub fn uploader_by_fingerprint(&self, fingerprint: &str) -> Result<Option<Uploader>> {
        let email: Option<String> = self
            .conn()
            .query_row(
                "SELECT u.email FROM uploader_fingerprints f
                 JOIN uploaders u ON u.id = f.uploader_id WHERE f.fingerprint = ?1",
                params![fingerprint.to_uppercase()],
                |row| row.get(0),
            )
            .optional()?;
        match email {
            Some(email) => self.uploader(&email),
            None => Ok(None),
        }
    }

    /// Uploader by e-mail address.
    ///
    /// # Errors
    ///
    /// Database failures.
    pub fn uploader(&self, email: &str) -> Result<Option<Uploader>> {
        let row = self
            .conn()
            .query_row(
                "SELECT id, email, name, allow_source_uploads, allow_binary_uploads,
                        always_review, allowed_packages
                 FROM uploaders WHERE email = ?1",
                params![email],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        Uploader {
                            email: row.get(1)?,
                            name: row.get(2)?,
                            pgp_fingerprints: Vec::new(),
                            allow_source_uploads: row.get(3)?,
                            allow_binary_uploads: row.get(4)?,
                            always_review: row.get(5)?,
                            allowed_packages: Vec::new(),
                        },
                        row.get::<_, String>(6)?,
                    ))
                },
            )
            .optional()?;
        let Some((id, mut uploader, allowed)) = row else {
            return Ok(None);
        };
        uploader.allowed_packages = from_json(&allowed)?;

        let mut stmt = self.conn().prepare(
            "SELECT fingerprint FROM uploader_fingerprints WHERE uploader_id = ?1 ORDER BY fingerprint",
        )?;
        uploader.pgp_fingerprints = stmt
            .query_map(params![id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(Some(uploader))
    }
}

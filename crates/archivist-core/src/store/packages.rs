//! Source and binary package rows, their files and the NEW queue.

use archivist_schema::{
    ArchiveFile, Architecture, BinaryPackage, DebVersion, HashAlgorithm, HexDigest, NewQueueEntry,
    SourcePackage,
};
use rusqlite::{OptionalExtension, params};

use super::{RepoSuite, Session, from_json};
use crate::error::{ArchiveError, Result};

/// Row id of a source package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(pub i64);

/// Row id of a binary package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BinaryId(pub i64);

/// Column the owner of an archive file is stored in.
#[derive(Debug, Clone, Copy)]
enum FileOwner {
    Source(SourceId),
    Binary(BinaryId),
}

impl FileOwner {
    fn column(self) -> &'static str {
        match self {
            Self::Source(_) => "source_id",
            Self::Binary(_) => "binary_id",
        }
    }

    fn id(self) -> i64 {
        match self {
            Self::Source(SourceId(id)) => id,
            Self::Binary(BinaryId(id)) => id,
        }
    }
}

fn digest_column(
    algorithm: HashAlgorithm,
    value: Option<String>,
) -> Result<Option<HexDigest>> {
    value
        .map(|v| HexDigest::new(algorithm, &v))
        .transpose()
        .map_err(Into::into)
}

impl Session<'_> {
    fn insert_files(&self, repo_id: i64, owner: FileOwner, files: &[ArchiveFile]) -> Result<()> {
        let mut stmt = self.conn().prepare(&format!(
            "INSERT INTO archive_files
                (repo_id, fname, size, md5, sha1, sha256, sha512, {})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            owner.column()
        ))?;
        for file in files {
            stmt.execute(params![
                repo_id,
                file.fname,
                file.size.map(|s| s as i64),
                file.md5.as_ref().map(HexDigest::as_str),
                file.sha1.as_ref().map(HexDigest::as_str),
                file.sha256.as_ref().map(HexDigest::as_str),
                file.sha512.as_ref().map(HexDigest::as_str),
                owner.id(),
            ])?;
        }
        Ok(())
    }

    fn owned_files(&self, owner: FileOwner) -> Result<Vec<ArchiveFile>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT fname, size, md5, sha1, sha256, sha512
             FROM archive_files WHERE {} = ?1 ORDER BY id",
            owner.column()
        ))?;
        let rows = stmt
            .query_map(params![owner.id()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<i64>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, Option<String>>(5)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(fname, size, md5, sha1, sha256, sha512)| {
                Ok(ArchiveFile {
                    fname,
                    size: size.map(|s| s as u64),
                    md5: digest_column(HashAlgorithm::Md5, md5)?,
                    sha1: digest_column(HashAlgorithm::Sha1, sha1)?,
                    sha256: digest_column(HashAlgorithm::Sha256, sha256)?,
                    sha512: digest_column(HashAlgorithm::Sha512, sha512)?,
                })
            })
            .collect()
    }

    /// Whether some package of the repository already owns `fname`.
    ///
    /// # Errors
    ///
    /// Database failures.
    pub fn file_registered(&self, repo_id: i64, fname: &str) -> Result<bool> {
        Ok(self
            .conn()
            .query_row(
                "SELECT 1 FROM archive_files WHERE repo_id = ?1 AND fname = ?2",
                params![repo_id, fname],
                |_| Ok(()),
            )
            .optional()?
            .is_some())
    }

    fn load_source(&self, id: i64, data: &str) -> Result<(SourceId, SourcePackage)> {
        let id = SourceId(id);
        let mut spkg: SourcePackage = from_json(data)?;
        spkg.files = self.owned_files(FileOwner::Source(id))?;
        Ok((id, spkg))
    }

    /// Store a new source package together with its files.
    ///
    /// Files are kept in their own table, so the stored record itself
    /// carries none.
    ///
    /// # Errors
    ///
    /// Database failures, including an already registered file name.
    pub fn insert_source(&self, repo_id: i64, spkg: &SourcePackage) -> Result<SourceId> {
        let record = SourcePackage {
            files: Vec::new(),
            ..spkg.clone()
        };
        self.conn().execute(
            "INSERT INTO source_packages (repo_id, name, version, component, data)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                repo_id,
                spkg.name,
                spkg.version.as_str(),
                spkg.component,
                serde_json::to_string(&record)?
            ],
        )?;
        let id = SourceId(self.conn().last_insert_rowid());
        self.insert_files(repo_id, FileOwner::Source(id), &spkg.files)?;
        Ok(id)
    }

    /// Replace the stored record and file rows of a source package.
    ///
    /// # Errors
    ///
    /// Database failures.
    pub fn update_source(&self, id: SourceId, repo_id: i64, spkg: &SourcePackage) -> Result<()> {
        let record = SourcePackage {
            files: Vec::new(),
            ..spkg.clone()
        };
        self.conn().execute(
            "UPDATE source_packages SET component = ?1, data = ?2 WHERE id = ?3",
            params![spkg.component, serde_json::to_string(&record)?, id.0],
        )?;
        self.conn()
            .execute("DELETE FROM archive_files WHERE source_id = ?1", params![id.0])?;
        self.insert_files(repo_id, FileOwner::Source(id), &spkg.files)
    }

    /// Delete a source package, its file rows, suite memberships and NEW entry.
    ///
    /// # Errors
    ///
    /// Database failures; a source that still has binaries cannot be deleted.
    pub fn delete_source(&self, id: SourceId) -> Result<()> {
        self.conn()
            .execute("DELETE FROM source_packages WHERE id = ?1", params![id.0])?;
        Ok(())
    }

    /// Source package by (repository, name, version), wherever it lives.
    ///
    /// # Errors
    ///
    /// Database failures or undecodable records.
    pub fn find_source(
        &self,
        repo_id: i64,
        name: &str,
        version: &DebVersion,
    ) -> Result<Option<(SourceId, SourcePackage)>> {
        let row = self
            .conn()
            .query_row(
                "SELECT id, data FROM source_packages WHERE repo_id = ?1 AND name = ?2 AND version = ?3",
                params![repo_id, name, version.as_str()],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;
        row.map(|(id, data)| self.load_source(id, &data)).transpose()
    }

    /// Source package published in the suite of `rss`.
    ///
    /// # Errors
    ///
    /// Database failures or undecodable records.
    pub fn published_source(
        &self,
        rss: &RepoSuite,
        name: &str,
        version: &DebVersion,
    ) -> Result<Option<(SourceId, SourcePackage)>> {
        let row = self
            .conn()
            .query_row(
                "SELECT p.id, p.data FROM source_packages p
                 JOIN source_suites ss ON ss.source_id = p.id
                 WHERE p.repo_id = ?1 AND ss.suite_id = ?2 AND p.name = ?3 AND p.version = ?4",
                params![rss.repo_id, rss.suite_id, name, version.as_str()],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;
        row.map(|(id, data)| self.load_source(id, &data)).transpose()
    }

    /// Publish a source package into the suite of `rss`.
    ///
    /// # Errors
    ///
    /// Database failures.
    pub fn add_source_to_suite(&self, id: SourceId, rss: &RepoSuite) -> Result<()> {
        self.conn().execute(
            "INSERT OR IGNORE INTO source_suites (source_id, suite_id) VALUES (?1, ?2)",
            params![id.0, rss.suite_id],
        )?;
        Ok(())
    }

    /// All sources published in the suite of `rss`, by name and insertion.
    ///
    /// # Errors
    ///
    /// Database failures or undecodable records.
    pub fn sources_in_suite(&self, rss: &RepoSuite) -> Result<Vec<SourcePackage>> {
        let mut stmt = self.conn().prepare(
            "SELECT p.id, p.data FROM source_packages p
             JOIN source_suites ss ON ss.source_id = p.id
             WHERE p.repo_id = ?1 AND ss.suite_id = ?2 ORDER BY p.name, p.id",
        )?;
        let rows = stmt
            .query_map(params![rss.repo_id, rss.suite_id], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.iter()
            .map(|(id, data)| self.load_source(*id, data).map(|(_, spkg)| spkg))
            .collect()
    }

    /// Store a binary package built from `source` and publish it into the
    /// suite of `rss`.
    ///
    /// # Errors
    ///
    /// Database failures, including a duplicate (name, version, arch) or
    /// an already registered file name.
    pub fn insert_binary(
        &self,
        rss: &RepoSuite,
        source: SourceId,
        bpkg: &BinaryPackage,
    ) -> Result<BinaryId> {
        let record = BinaryPackage {
            file: None,
            ..bpkg.clone()
        };
        self.conn().execute(
            "INSERT INTO binary_packages (repo_id, source_id, name, version, architecture, data)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                rss.repo_id,
                source.0,
                bpkg.name,
                bpkg.version.as_str(),
                bpkg.architecture.as_str(),
                serde_json::to_string(&record)?
            ],
        )?;
        let id = BinaryId(self.conn().last_insert_rowid());
        if let Some(file) = &bpkg.file {
            self.insert_files(rss.repo_id, FileOwner::Binary(id), std::slice::from_ref(file))?;
        }
        self.conn().execute(
            "INSERT OR IGNORE INTO binary_suites (binary_id, suite_id) VALUES (?1, ?2)",
            params![id.0, rss.suite_id],
        )?;
        Ok(id)
    }

    fn load_binaries(&self, rows: Vec<(i64, String)>) -> Result<Vec<BinaryPackage>> {
        rows.into_iter()
            .map(|(id, data)| {
                let mut bpkg: BinaryPackage = from_json(&data)?;
                bpkg.file = self.owned_files(FileOwner::Binary(BinaryId(id)))?.into_iter().next();
                Ok(bpkg)
            })
            .collect()
    }

    /// Binary package by (repository, name, version, architecture).
    ///
    /// # Errors
    ///
    /// Database failures or undecodable records.
    pub fn find_binary(
        &self,
        repo_id: i64,
        name: &str,
        version: &DebVersion,
        arch: &Architecture,
    ) -> Result<Option<BinaryPackage>> {
        let row = self
            .conn()
            .query_row(
                "SELECT id, data FROM binary_packages
                 WHERE repo_id = ?1 AND name = ?2 AND version = ?3 AND architecture = ?4",
                params![repo_id, name, version.as_str(), arch.as_str()],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;
        Ok(self.load_binaries(row.into_iter().collect())?.pop())
    }

    /// All binaries published in the suite of `rss`.
    ///
    /// # Errors
    ///
    /// Database failures or undecodable records.
    pub fn binaries_in_suite(&self, rss: &RepoSuite) -> Result<Vec<BinaryPackage>> {
        let mut stmt = self.conn().prepare(
            "SELECT b.id, b.data FROM binary_packages b
             JOIN binary_suites bs ON bs.binary_id = b.id
             WHERE b.repo_id = ?1 AND bs.suite_id = ?2 ORDER BY b.name, b.architecture, b.id",
        )?;
        let rows = stmt
            .query_map(params![rss.repo_id, rss.suite_id], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        self.load_binaries(rows)
    }

    /// The NEW entry of a source aimed at the suite of `rss`.
    ///
    /// # Errors
    ///
    /// Database failures or undecodable records.
    pub fn new_queue_entry(
        &self,
        rss: &RepoSuite,
        name: &str,
        version: &DebVersion,
    ) -> Result<Option<(SourceId, SourcePackage)>> {
        let row = self
            .conn()
            .query_row(
                "SELECT p.id, p.data FROM new_queue q
                 JOIN source_packages p ON p.id = q.source_id
                 WHERE q.suite_id = ?1 AND p.repo_id = ?2 AND p.name = ?3 AND p.version = ?4",
                params![rss.suite_id, rss.repo_id, name, version.as_str()],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;
        row.map(|(id, data)| self.load_source(id, &data)).transpose()
    }

    /// Queue a source for review in the suite of `rss`, or retarget its entry.
    ///
    /// # Errors
    ///
    /// Database failures.
    pub fn enqueue_new(&self, source: SourceId, rss: &RepoSuite) -> Result<()> {
        self.conn().execute(
            "INSERT INTO new_queue (source_id, suite_id) VALUES (?1, ?2)
             ON CONFLICT (source_id) DO UPDATE SET suite_id = excluded.suite_id",
            params![source.0, rss.suite_id],
        )?;
        Ok(())
    }

    /// Drop the NEW entry of a source, if any.
    ///
    /// # Errors
    ///
    /// Database failures.
    pub fn dequeue_new(&self, source: SourceId) -> Result<bool> {
        let removed = self
            .conn()
            .execute("DELETE FROM new_queue WHERE source_id = ?1", params![source.0])?;
        Ok(removed > 0)
    }

    /// Pending NEW entries for the suite of `rss`.
    ///
    /// # Errors
    ///
    /// Database failures.
    pub fn list_new_queue(&self, rss: &RepoSuite) -> Result<Vec<NewQueueEntry>> {
        let mut stmt = self.conn().prepare(
            "SELECT p.name, p.version, p.component FROM new_queue q
             JOIN source_packages p ON p.id = q.source_id
             WHERE q.suite_id = ?1 AND p.repo_id = ?2 ORDER BY p.name, q.id",
        )?;
        let rows = stmt
            .query_map(params![rss.suite_id, rss.repo_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter()
            .map(|(source_name, version, component)| {
                Ok(NewQueueEntry {
                    source_name,
                    source_version: DebVersion::parse(&version)?,
                    destination_suite: rss.suite.clone(),
                    component,
                })
            })
            .collect()
    }

    /// Fail unless the given source is queued in NEW for `rss`.
    ///
    /// # Errors
    ///
    /// [`ArchiveError::NotConfigured`] when there is no such entry.
    pub fn require_new_queue_entry(
        &self,
        rss: &RepoSuite,
        name: &str,
        version: &DebVersion,
    ) -> Result<(SourceId, SourcePackage)> {
        self.new_queue_entry(rss, name, version)?.ok_or_else(|| {
            ArchiveError::NotConfigured(format!("{name}/{version} is not in the NEW queue of {rss}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ArchiveDb;
    use archivist_schema::{DebType, ExtraFields, NewPolicy, Relations};

    fn v(s: &str) -> DebVersion {
        DebVersion::parse(s).unwrap()
    }

    fn file(fname: &str) -> ArchiveFile {
        let mut file = ArchiveFile::new(fname);
        file.size = Some(3);
        file.sha256 = Some(HexDigest::new(HashAlgorithm::Sha256, &"ab".repeat(32)).unwrap());
        file
    }

    fn source(name: &str, version: &str) -> SourcePackage {
        SourcePackage {
            name: name.to_string(),
            version: v(version),
            repo: "master".to_string(),
            component: "main".to_string(),
            format_version: "3.0 (native)".to_string(),
            architectures: vec![Architecture::new("any")],
            section: None,
            standards_version: None,
            maintainer: "Jane Doe <jane@example.org>".to_string(),
            original_maintainer: None,
            uploaders: Vec::new(),
            homepage: None,
            vcs_browser: None,
            vcs_git: None,
            build_depends: vec!["debhelper-compat (= 13)".to_string()],
            build_depends_indep: Vec::new(),
            build_conflicts: Vec::new(),
            build_conflicts_indep: Vec::new(),
            directory: format!("pool/{}/{name}", &name[..1]),
            files: vec![file(&format!("pool/{}/{name}/{name}_{version}.dsc", &name[..1]))],
            expected_binaries: Vec::new(),
            extra: ExtraFields::default(),
        }
    }

    fn binary(name: &str, version: &str) -> BinaryPackage {
        BinaryPackage {
            name: name.to_string(),
            version: v(version),
            architecture: Architecture::new("amd64"),
            deb_type: DebType::Deb,
            repo: "master".to_string(),
            component: "main".to_string(),
            source_name: name.to_string(),
            source_version: v(version),
            maintainer: String::new(),
            original_maintainer: None,
            homepage: None,
            size_installed: 10,
            description: "test".to_string(),
            description_md5: None,
            multi_arch: None,
            relations: Relations::default(),
            override_info: None,
            file: Some(file(&format!("pool/f/{name}/{name}_{version}_amd64.deb"))),
            contents: vec!["usr/bin/foo".to_string()],
            extra: ExtraFields::default(),
        }
    }

    #[test]
    fn source_rows_keep_their_files() {
        let mut db = ArchiveDb::open_in_memory().unwrap();
        let session = db.session().unwrap();
        let rss = session.add_repo_suite("master", "unstable", NewPolicy::Default, true).unwrap();

        let spkg = source("foo", "1.0");
        let id = session.insert_source(rss.repo_id, &spkg).unwrap();
        let (found_id, found) = session.find_source(rss.repo_id, "foo", &v("1.0")).unwrap().unwrap();
        assert_eq!(found_id, id);
        assert_eq!(found, spkg);
        assert!(session.file_registered(rss.repo_id, "pool/f/foo/foo_1.0.dsc").unwrap());

        // not yet published
        assert!(session.published_source(&rss, "foo", &v("1.0")).unwrap().is_none());
        session.add_source_to_suite(id, &rss).unwrap();
        assert!(session.published_source(&rss, "foo", &v("1.0")).unwrap().is_some());
        assert_eq!(session.sources_in_suite(&rss).unwrap().len(), 1);

        let mut changed = spkg.clone();
        changed.files = vec![file("pool/f/foo/foo_1.0.tar.xz")];
        session.update_source(id, rss.repo_id, &changed).unwrap();
        assert!(!session.file_registered(rss.repo_id, "pool/f/foo/foo_1.0.dsc").unwrap());
        let (_, found) = session.find_source(rss.repo_id, "foo", &v("1.0")).unwrap().unwrap();
        assert_eq!(found.files, changed.files);

        session.delete_source(id).unwrap();
        assert!(session.find_source(rss.repo_id, "foo", &v("1.0")).unwrap().is_none());
        assert!(!session.file_registered(rss.repo_id, "pool/f/foo/foo_1.0.tar.xz").unwrap());
    }

    #[test]
    fn new_queue_entries() {
        let mut db = ArchiveDb::open_in_memory().unwrap();
        let session = db.session().unwrap();
        let rss = session.add_repo_suite("master", "unstable", NewPolicy::Default, true).unwrap();
        let other = session.add_repo_suite("master", "experimental", NewPolicy::Default, true).unwrap();

        let id = session.insert_source(rss.repo_id, &source("foo", "1.0")).unwrap();
        session.enqueue_new(id, &rss).unwrap();
        assert!(session.new_queue_entry(&rss, "foo", &v("1.0")).unwrap().is_some());
        assert!(session.new_queue_entry(&other, "foo", &v("1.0")).unwrap().is_none());

        let listed = session.list_new_queue(&rss).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].destination_suite, "unstable");
        assert_eq!(listed[0].component, "main");

        assert!(session.dequeue_new(id).unwrap());
        assert!(!session.dequeue_new(id).unwrap());
        assert!(matches!(
            session.require_new_queue_entry(&rss, "foo", &v("1.0")),
            Err(ArchiveError::NotConfigured(_))
        ));
    }

    #[test]
    fn binaries_are_published_with_their_file() {
        let mut db = ArchiveDb::open_in_memory().unwrap();
        let session = db.session().unwrap();
        let rss = session.add_repo_suite("master", "unstable", NewPolicy::Default, true).unwrap();
        let sid = session.insert_source(rss.repo_id, &source("foo", "1.0")).unwrap();

        let bpkg = binary("foo", "1.0");
        session.insert_binary(&rss, sid, &bpkg).unwrap();
        let found = session
            .find_binary(rss.repo_id, "foo", &v("1.0"), &Architecture::new("amd64"))
            .unwrap()
            .unwrap();
        assert_eq!(found, bpkg);
        assert_eq!(session.binaries_in_suite(&rss).unwrap(), vec![bpkg.clone()]);

        // identity is (repo, name, version, arch)
        assert!(session.insert_binary(&rss, sid, &bpkg).is_err());
    }
}

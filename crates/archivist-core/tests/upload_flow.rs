//! End-to-end upload processing against a scratch archive.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use archivist_core::config::ArchiveConfig;
use archivist_core::control::{BinaryControl, ControlRenderer, render_dsc};
use archivist_core::importer::{BinaryOutcome, PackageImporter};
use archivist_core::lock::LockDir;
use archivist_core::newqueue::NewQueueProcessor;
use archivist_core::signature::{SignatureVerifier, SignedContent, strip_clearsign};
use archivist_core::store::ArchiveDb;
use archivist_core::upload::{UploadHandler, UploadStatus};
use archivist_core::{ArchiveError, Result};
use archivist_schema::{
    DebVersion, HashAlgorithm, NewPolicy, Override, PackagePriority, SOURCE_ARCH, Stanza,
    Uploader, hash_file,
};
use tempfile::TempDir;

const FINGERPRINT: &str = "0123456789ABCDEF0123456789ABCDEF01234567";

/// Accepts everything, claiming a fixed signer.
#[derive(Debug)]
struct FakeVerifier {
    fingerprint: &'static str,
    weak: bool,
}

impl SignatureVerifier for FakeVerifier {
    fn verify(&self, data: &[u8], _: &[PathBuf], _: bool) -> Result<SignedContent> {
        let text = strip_clearsign(&String::from_utf8_lossy(data));
        Ok(SignedContent {
            contents: text.into_bytes(),
            valid: true,
            weak_signature: self.weak,
            expired: false,
            fingerprints: vec![self.fingerprint.to_string()],
            primary_fingerprints: vec![self.fingerprint.to_string()],
        })
    }
}

/// Renders `.dsc` files natively and derives binary control data from the
/// `<name>_<version>_<arch>.deb` file name.
#[derive(Debug)]
struct FakeRenderer;

impl ControlRenderer for FakeRenderer {
    fn render_source(&self, dsc: &Path) -> Result<Stanza> {
        render_dsc(dsc)
    }

    fn render_binary(&self, deb: &Path) -> Result<BinaryControl> {
        let stem = deb.file_stem().unwrap().to_str().unwrap();
        let parts: Vec<&str> = stem.split('_').collect();
        let hashes = hash_file(deb)?;

        let mut stanza = Stanza::new();
        stanza.set("Package", parts[0]);
        stanza.set("Version", parts[1]);
        stanza.set("Architecture", parts[2]);
        stanza.set("Maintainer", "Jane Doe <jane@example.org>");
        stanza.set("Installed-Size", "12");
        stanza.set("Depends", "libc6 (>= 2.36)");
        stanza.set("Description", "test package");
        stanza.set("Size", hashes.size.to_string());
        stanza.set("MD5sum", hashes.get(HashAlgorithm::Md5).to_string());
        stanza.set("SHA1", hashes.get(HashAlgorithm::Sha1).to_string());
        stanza.set("SHA256", hashes.get(HashAlgorithm::Sha256).to_string());
        stanza.set("SHA512", hashes.get(HashAlgorithm::Sha512).to_string());
        Ok(BinaryControl {
            stanza,
            contents: vec![format!("usr/bin/{}", parts[0])],
        })
    }
}

struct Archive {
    _dir: TempDir,
    config: ArchiveConfig,
    db: ArchiveDb,
    incoming: PathBuf,
}

impl Archive {
    fn new(policy: NewPolicy) -> Self {
        Self::create(policy, false)
    }

    /// Archive whose database lives in a file, so other connections see it.
    fn on_disk(policy: NewPolicy) -> Self {
        Self::create(policy, true)
    }

    fn create(policy: NewPolicy, on_disk: bool) -> Self {
        let dir = TempDir::new().unwrap();
        let config = ArchiveConfig::with_workspace(dir.path());
        let incoming = dir.path().join("incoming");
        std::fs::create_dir_all(&incoming).unwrap();

        let mut db = if on_disk {
            ArchiveDb::open_at(&config.database).unwrap()
        } else {
            ArchiveDb::open_in_memory().unwrap()
        };
        let session = db.session().unwrap();
        session.add_repo_suite("master", "unstable", policy, true).unwrap();
        session.add_repo_suite("master", "frozen", policy, false).unwrap();
        let mut uploader = Uploader::new("jane@example.org");
        uploader.pgp_fingerprints = vec![FINGERPRINT.to_string()];
        session.add_uploader(&uploader).unwrap();
        session.commit().unwrap();

        Self {
            _dir: dir,
            config,
            db,
            incoming,
        }
    }

    fn handler(&self, weak: bool) -> UploadHandler {
        UploadHandler::new(
            self.config.clone(),
            Arc::new(FakeVerifier {
                fingerprint: FINGERPRINT,
                weak,
            }),
            Arc::new(FakeRenderer),
        )
        .unwrap()
    }

    fn pool(&self) -> PathBuf {
        self.config.pool_root("master").join("pool/f/foo")
    }

    fn queue(&self) -> PathBuf {
        self.config.new_queue_root("master").join("pool/f/foo")
    }

    fn register_override(&mut self, package: &str) {
        let session = self.db.session().unwrap();
        let rss = session.require_repo_suite("master", "unstable").unwrap();
        session
            .add_override(
                &rss,
                &Override {
                    package: package.to_string(),
                    section: "devel".to_string(),
                    priority: PackagePriority::Optional,
                    essential: false,
                    component: "main".to_string(),
                },
            )
            .unwrap();
        session.commit().unwrap();
    }

    /// Write a source upload of `foo`, optionally with an amd64 binary
    /// named `deb_name`, and return the `.changes` path.
    fn write_upload(&self, version: &str, distribution: &str, deb_name: Option<&str>) -> PathBuf {
        let tarball = format!("foo_{version}.tar.xz");
        write(&self.incoming.join(&tarball), &format!("upstream {version}"));
        let dsc = format!("foo_{version}.dsc");
        write(
            &self.incoming.join(&dsc),
            &format!(
                "Format: 3.0 (native)\nSource: foo\nBinary: foo\nArchitecture: any\n\
                 Version: {version}\nMaintainer: Jane Doe <jane@example.org>\n\
                 Build-Depends: debhelper-compat (= 13)\nPackage-List:\n \
                 foo deb devel optional arch=any\nFiles:\n {}\n",
                files_line(&self.incoming.join(&tarball), None)
            ),
        );

        let mut files = vec![
            files_line(&self.incoming.join(&dsc), Some("devel optional")),
            files_line(&self.incoming.join(&tarball), Some("devel optional")),
        ];
        let mut arch = "source".to_string();
        if let Some(deb) = deb_name {
            write(&self.incoming.join(deb), &format!("binary payload of {deb}"));
            files.push(files_line(&self.incoming.join(deb), Some("devel optional")));
            arch.push_str(" amd64");
        }
        self.write_changes(version, distribution, &arch, &files)
    }

    fn write_changes(&self, version: &str, distribution: &str, arch: &str, files: &[String]) -> PathBuf {
        let path = self.incoming.join(format!("foo_{version}_{}.changes", arch.replace(' ', "+")));
        write(
            &path,
            &format!(
                "Format: 1.8\nSource: foo\nVersion: {version}\nDistribution: {distribution}\n\
                 Architecture: {arch}\nChanged-By: Jane Doe <jane@example.org>\nFiles:\n {}\n",
                files.join("\n ")
            ),
        );
        path
    }

    /// Run a NEW review action in its own session, committing on success.
    fn review<T>(&mut self, action: impl FnOnce(&mut NewQueueProcessor<'_, '_>) -> Result<T>) -> Result<T> {
        let session = self.db.session().unwrap();
        let rss = session.require_repo_suite("master", "unstable").unwrap();
        let importer = PackageImporter::new(&session, rss, &FakeRenderer, &self.config).unwrap();
        let mut processor = NewQueueProcessor::new(importer);
        let result = action(&mut processor);
        let journal = processor.into_journal();
        if result.is_ok() {
            session.commit().unwrap();
            journal.commit();
        } else {
            journal.rollback().unwrap();
            session.rollback().unwrap();
        }
        result
    }

    fn recorded(&mut self, package: &str, arch: &str) -> Option<DebVersion> {
        let session = self.db.session().unwrap();
        let rss = session.require_repo_suite("master", "unstable").unwrap();
        session.recorded_version(rss.repo_id, package, arch).unwrap()
    }
}

fn write(path: &Path, body: &str) {
    std::fs::write(path, body).unwrap();
}

/// `md5 size [section priority] name` for a file on disk.
fn files_line(path: &Path, classification: Option<&str>) -> String {
    let hashes = hash_file(path).unwrap();
    let name = path.file_name().unwrap().to_str().unwrap();
    match classification {
        Some(class) => format!("{} {} {class} {name}", hashes.get(HashAlgorithm::Md5), hashes.size),
        None => format!("{} {} {name}", hashes.get(HashAlgorithm::Md5), hashes.size),
    }
}

fn v(s: &str) -> DebVersion {
    DebVersion::parse(s).unwrap()
}

#[test]
fn upload_with_known_overrides_is_published() {
    let mut archive = Archive::new(NewPolicy::Default);
    archive.register_override("foo");
    let changes = archive.write_upload("1.0", "unstable", Some("foo_1.0_amd64.deb"));

    let outcome = archive
        .handler(false)
        .process_changes(&mut archive.db, "master", &changes)
        .unwrap();
    assert_eq!(outcome.status, UploadStatus::Accepted, "{:?}", outcome.reason);
    assert!(outcome.accepted());
    assert_eq!(outcome.uploader.email, "jane@example.org");

    for name in ["foo_1.0.dsc", "foo_1.0.tar.xz", "foo_1.0_amd64.deb"] {
        assert!(archive.pool().join(name).is_file(), "{name} missing from pool");
        assert!(!archive.incoming.join(name).exists(), "{name} left in incoming");
    }
    assert_eq!(archive.recorded("foo", SOURCE_ARCH), Some(v("1.0")));
    assert_eq!(archive.recorded("foo", "amd64"), Some(v("1.0")));

    let session = archive.db.session().unwrap();
    let rss = session.require_repo_suite("master", "unstable").unwrap();
    assert!(rss.changes_pending);
    let sources = session.sources_in_suite(&rss).unwrap();
    assert_eq!(sources.len(), 1);
    assert_eq!(sources[0].build_depends, ["debhelper-compat (= 13)"]);
    assert_eq!(sources[0].files.len(), 2);
    let binaries = session.binaries_in_suite(&rss).unwrap();
    assert_eq!(binaries.len(), 1);
    assert_eq!(binaries[0].relations.depends, ["libc6 (>= 2.36)"]);
    assert_eq!(
        binaries[0].file.as_ref().unwrap().fname,
        "pool/f/foo/foo_1.0_amd64.deb"
    );
}

#[test]
fn same_version_again_is_rejected() {
    let mut archive = Archive::new(NewPolicy::NeverNew);
    let changes = archive.write_upload("1.0", "unstable", None);
    let handler = archive.handler(false);
    assert!(handler.process_changes(&mut archive.db, "master", &changes).unwrap().accepted());

    let changes = archive.write_upload("1.0", "unstable", None);
    let outcome = handler.process_changes(&mut archive.db, "master", &changes).unwrap();
    assert_eq!(outcome.status, UploadStatus::Rejected);
    let reason = outcome.reason.unwrap();
    assert!(reason.starts_with("jane@example.org: "), "{reason}");
    assert!(reason.contains("higher or equal version \"1.0\""), "{reason}");

    let changes = archive.write_upload("0.9", "unstable", None);
    let outcome = handler.process_changes(&mut archive.db, "master", &changes).unwrap();
    assert_eq!(outcome.status, UploadStatus::Rejected);
    assert_eq!(archive.recorded("foo", SOURCE_ARCH), Some(v("1.0")));
}

#[test]
fn never_new_registers_missing_overrides() {
    let mut archive = Archive::new(NewPolicy::NeverNew);
    let changes = archive.write_upload("1.0", "unstable", Some("foo_1.0_amd64.deb"));

    let outcome = archive
        .handler(false)
        .process_changes(&mut archive.db, "master", &changes)
        .unwrap();
    assert!(outcome.accepted(), "{:?}", outcome.reason);

    let session = archive.db.session().unwrap();
    let rss = session.require_repo_suite("master", "unstable").unwrap();
    let ovr = session.override_for(&rss, "foo").unwrap().unwrap();
    assert_eq!(ovr.section, "devel");
}

#[test]
fn new_upload_is_held_then_accepted() {
    let mut archive = Archive::new(NewPolicy::Default);
    let changes = archive.write_upload("1.0", "unstable", Some("foo_1.0_amd64.deb"));
    let handler = archive.handler(false);

    let outcome = handler.process_changes(&mut archive.db, "master", &changes).unwrap();
    assert_eq!(outcome.status, UploadStatus::HeldInNew, "{:?}", outcome.reason);
    assert!(!outcome.accepted());
    let reason = outcome.reason.unwrap();
    assert!(reason.starts_with("jane@example.org: "), "{reason}");
    assert!(reason.contains("Source package foo/1.0 is pending in the NEW queue"), "{reason}");
    assert!(
        reason.contains("foo_1.0_amd64.deb was filed with it but is not registered"),
        "{reason}"
    );
    assert!(archive.queue().join("foo_1.0.dsc").is_file());
    assert!(archive.queue().join("foo_1.0_amd64.deb").is_file());
    assert!(!archive.pool().exists());
    assert_eq!(archive.recorded("foo", SOURCE_ARCH), None);

    {
        let session = archive.db.session().unwrap();
        let rss = session.require_repo_suite("master", "unstable").unwrap();
        let queue = session.list_new_queue(&rss).unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].source_name, "foo");
        assert!(session.sources_in_suite(&rss).unwrap().is_empty());

        let importer = PackageImporter::new(&session, rss, &FakeRenderer, &archive.config).unwrap();
        let mut review = NewQueueProcessor::new(importer);
        let accepted = review.accept("foo", &v("1.0")).unwrap();
        assert_eq!(accepted.overrides_added, 1);
        assert_eq!(accepted.binaries_published, 1);
        let journal = review.into_journal();
        session.commit().unwrap();
        journal.commit();
    }

    for name in ["foo_1.0.dsc", "foo_1.0.tar.xz", "foo_1.0_amd64.deb"] {
        assert!(archive.pool().join(name).is_file(), "{name} missing from pool");
    }
    assert!(!archive.queue().exists());
    assert_eq!(archive.recorded("foo", SOURCE_ARCH), Some(v("1.0")));
    assert_eq!(archive.recorded("foo", "amd64"), Some(v("1.0")));

    let session = archive.db.session().unwrap();
    let rss = session.require_repo_suite("master", "unstable").unwrap();
    assert!(session.list_new_queue(&rss).unwrap().is_empty());
    assert_eq!(session.binaries_in_suite(&rss).unwrap().len(), 1);
}

#[test]
fn new_upload_can_be_replaced_and_rejected() {
    let mut archive = Archive::new(NewPolicy::AlwaysNew);
    let handler = archive.handler(false);

    let changes = archive.write_upload("1.0", "unstable", None);
    let outcome = handler.process_changes(&mut archive.db, "master", &changes).unwrap();
    assert_eq!(outcome.status, UploadStatus::HeldInNew);

    // a fixed re-upload of the same version replaces the queued files
    let changes = archive.write_upload("1.0", "unstable", None);
    std::fs::write(archive.incoming.join("foo_1.0.tar.xz"), "fixed tarball").unwrap();
    let tarball = files_line(&archive.incoming.join("foo_1.0.tar.xz"), None);
    std::fs::write(
        archive.incoming.join("foo_1.0.dsc"),
        format!(
            "Format: 3.0 (native)\nSource: foo\nBinary: foo\nArchitecture: any\nVersion: 1.0\n\
             Maintainer: Jane Doe <jane@example.org>\nFiles:\n {tarball}\n"
        ),
    )
    .unwrap();
    let files = vec![
        files_line(&archive.incoming.join("foo_1.0.dsc"), Some("devel optional")),
        files_line(&archive.incoming.join("foo_1.0.tar.xz"), Some("devel optional")),
    ];
    std::fs::remove_file(changes).unwrap();
    let changes = archive.write_changes("1.0", "unstable", "source", &files);
    let outcome = handler.process_changes(&mut archive.db, "master", &changes).unwrap();
    assert_eq!(outcome.status, UploadStatus::HeldInNew, "{:?}", outcome.reason);
    assert_eq!(
        std::fs::read_to_string(archive.queue().join("foo_1.0.tar.xz")).unwrap(),
        "fixed tarball"
    );

    let session = archive.db.session().unwrap();
    let rss = session.require_repo_suite("master", "unstable").unwrap();
    assert_eq!(session.list_new_queue(&rss).unwrap().len(), 1);

    let importer = PackageImporter::new(&session, rss.clone(), &FakeRenderer, &archive.config).unwrap();
    let mut review = NewQueueProcessor::new(importer);
    review.reject("foo", &v("1.0")).unwrap();
    assert!(matches!(
        review.reject("foo", &v("1.0")),
        Err(ArchiveError::NotConfigured(_))
    ));
    let journal = review.into_journal();
    session.commit().unwrap();
    journal.commit();

    assert!(!archive.queue().exists());
    let session = archive.db.session().unwrap();
    assert!(session.list_new_queue(&rss).unwrap().is_empty());
    assert!(session.find_source(rss.repo_id, "foo", &v("1.0")).unwrap().is_none());
}

#[test]
fn rejecting_a_version_clears_its_queued_binaries() {
    let mut archive = Archive::new(NewPolicy::Default);
    let handler = archive.handler(false);

    let changes = archive.write_upload("1.0", "unstable", Some("foo_1.0_amd64.deb"));
    let outcome = handler.process_changes(&mut archive.db, "master", &changes).unwrap();
    assert_eq!(outcome.status, UploadStatus::HeldInNew, "{:?}", outcome.reason);
    archive.review(|review| review.reject("foo", &v("1.0"))).unwrap();
    assert!(!archive.queue().join("foo_1.0_amd64.deb").exists());

    let changes = archive.write_upload("1.1", "unstable", Some("foo_1.1_amd64.deb"));
    let outcome = handler.process_changes(&mut archive.db, "master", &changes).unwrap();
    assert_eq!(outcome.status, UploadStatus::HeldInNew, "{:?}", outcome.reason);

    let accepted = archive.review(|review| review.accept("foo", &v("1.1"))).unwrap();
    assert_eq!(accepted.binaries_published, 1);
    assert!(archive.pool().join("foo_1.1_amd64.deb").is_file());
    assert!(!archive.pool().join("foo_1.0_amd64.deb").exists());
    assert!(!archive.queue().exists());
    assert_eq!(archive.recorded("foo", "amd64"), Some(v("1.1")));
}

#[test]
fn accepting_one_version_leaves_other_queued_versions() {
    let mut archive = Archive::new(NewPolicy::Default);
    let handler = archive.handler(false);
    for version in ["1.0", "1.1"] {
        let deb = format!("foo_{version}_amd64.deb");
        let changes = archive.write_upload(version, "unstable", Some(&deb));
        let outcome = handler.process_changes(&mut archive.db, "master", &changes).unwrap();
        assert_eq!(outcome.status, UploadStatus::HeldInNew, "{:?}", outcome.reason);
    }

    let accepted = archive.review(|review| review.accept("foo", &v("1.0"))).unwrap();
    assert_eq!(accepted.binaries_published, 1);
    assert!(archive.pool().join("foo_1.0_amd64.deb").is_file());
    assert!(archive.queue().join("foo_1.1.dsc").is_file());
    assert!(archive.queue().join("foo_1.1_amd64.deb").is_file());
    assert_eq!(archive.recorded("foo", "amd64"), Some(v("1.0")));

    let accepted = archive.review(|review| review.accept("foo", &v("1.1"))).unwrap();
    assert_eq!(accepted.overrides_added, 0);
    assert_eq!(accepted.binaries_published, 1);
    assert!(archive.pool().join("foo_1.1_amd64.deb").is_file());
    assert!(!archive.queue().exists());
    assert_eq!(archive.recorded("foo", SOURCE_ARCH), Some(v("1.1")));
    assert_eq!(archive.recorded("foo", "amd64"), Some(v("1.1")));
}

#[test]
fn queued_binary_imported_from_the_queue_stays_in_place() {
    let mut archive = Archive::new(NewPolicy::AlwaysNew);
    let changes = archive.write_upload("1.0", "unstable", Some("foo_1.0_amd64.deb"));
    let outcome = archive.handler(false).process_changes(&mut archive.db, "master", &changes).unwrap();
    assert_eq!(outcome.status, UploadStatus::HeldInNew, "{:?}", outcome.reason);

    let queued = archive.queue().join("foo_1.0_amd64.deb");
    let session = archive.db.session().unwrap();
    let rss = session.require_repo_suite("master", "unstable").unwrap();
    let mut importer = PackageImporter::new(&session, rss, &FakeRenderer, &archive.config).unwrap();
    assert_eq!(
        importer.import_binary(&queued, None).unwrap(),
        BinaryOutcome::QueuedWithSource
    );
    let journal = importer.into_journal();
    session.commit().unwrap();
    journal.commit();
    assert!(queued.is_file());
}

#[test]
fn upload_waiting_for_the_publish_lock_leaves_the_database_writable() {
    let mut archive = Archive::on_disk(NewPolicy::NeverNew);
    let changes = archive.write_upload("1.0", "unstable", None);
    let lock = LockDir::new(archive.config.lock_dir())
        .lock_publish("master", "unstable", true)
        .unwrap();

    let config = archive.config.clone();
    let handler = archive.handler(false);
    let upload = std::thread::spawn(move || {
        let mut db = ArchiveDb::open_at(&config.database).unwrap();
        handler.process_changes(&mut db, "master", &changes).unwrap()
    });
    std::thread::sleep(Duration::from_millis(300));
    assert!(!upload.is_finished());

    // would hit the busy timeout if the upload held a write transaction
    archive.register_override("foo");

    drop(lock);
    let outcome = upload.join().unwrap();
    assert!(outcome.accepted(), "{:?}", outcome.reason);
    assert_eq!(archive.recorded("foo", SOURCE_ARCH), Some(v("1.0")));
}

#[test]
fn failing_binary_rolls_back_the_whole_upload() {
    let mut archive = Archive::new(NewPolicy::Default);
    archive.register_override("foo");
    // `bar` names no source, so it is its own source and unknown
    let changes = archive.write_upload("1.0", "unstable", Some("bar_1.0_amd64.deb"));

    let outcome = archive
        .handler(false)
        .process_changes(&mut archive.db, "master", &changes)
        .unwrap();
    assert_eq!(outcome.status, UploadStatus::Rejected);
    let reason = outcome.reason.unwrap();
    assert!(reason.contains("Failed to import binary package"), "{reason}");

    for name in ["foo_1.0.dsc", "foo_1.0.tar.xz", "bar_1.0_amd64.deb"] {
        assert!(archive.incoming.join(name).is_file(), "{name} not restored");
    }
    assert!(!archive.pool().join("foo_1.0.dsc").exists());
    assert_eq!(archive.recorded("foo", SOURCE_ARCH), None);

    let session = archive.db.session().unwrap();
    let rss = session.require_repo_suite("master", "unstable").unwrap();
    assert!(session.sources_in_suite(&rss).unwrap().is_empty());
    assert!(!rss.changes_pending);
}

#[test]
fn existing_pool_file_is_never_overwritten() {
    let mut archive = Archive::new(NewPolicy::NeverNew);
    std::fs::create_dir_all(archive.pool()).unwrap();
    std::fs::write(archive.pool().join("foo_1.0.tar.xz"), "someone else's tarball").unwrap();
    let changes = archive.write_upload("1.0", "unstable", None);

    let outcome = archive
        .handler(false)
        .process_changes(&mut archive.db, "master", &changes)
        .unwrap();
    assert_eq!(outcome.status, UploadStatus::Rejected);
    assert!(outcome.reason.unwrap().contains("Refusing to overwrite"));
    assert_eq!(
        std::fs::read_to_string(archive.pool().join("foo_1.0.tar.xz")).unwrap(),
        "someone else's tarball"
    );
    assert!(!archive.pool().join("foo_1.0.dsc").exists());
    assert!(archive.incoming.join("foo_1.0.dsc").is_file());
}

#[test]
fn policy_rejections() {
    let mut archive = Archive::new(NewPolicy::NeverNew);

    let changes = archive.write_upload("1.0", "unstable", None);
    let outcome = archive.handler(true).process_changes(&mut archive.db, "master", &changes).unwrap();
    assert!(outcome.reason.unwrap().contains("is weak"));

    let changes = archive.write_upload("1.0", "unstable stable", None);
    let outcome = archive.handler(false).process_changes(&mut archive.db, "master", &changes).unwrap();
    assert!(outcome.reason.unwrap().contains("exactly one target"));

    let changes = archive.write_upload("1.0", "experimental", None);
    let outcome = archive.handler(false).process_changes(&mut archive.db, "master", &changes).unwrap();
    assert!(outcome.reason.unwrap().contains("does not exist"));

    let changes = archive.write_upload("1.0", "frozen", None);
    let outcome = archive.handler(false).process_changes(&mut archive.db, "master", &changes).unwrap();
    assert!(outcome.reason.unwrap().contains("does not accept uploads"));

    {
        let session = archive.db.session().unwrap();
        let mut uploader = session.uploader("jane@example.org").unwrap().unwrap();
        uploader.allow_source_uploads = false;
        session.add_uploader(&uploader).unwrap();
        session.commit().unwrap();
    }
    let changes = archive.write_upload("1.0", "unstable", None);
    let outcome = archive.handler(false).process_changes(&mut archive.db, "master", &changes).unwrap();
    assert_eq!(outcome.status, UploadStatus::Rejected);
    assert!(outcome.reason.unwrap().contains("sourceful uploads"));

    // nothing above touched the archive
    assert_eq!(archive.recorded("foo", SOURCE_ARCH), None);
    assert!(!archive.pool().exists());
}

#[test]
fn binaries_from_source_only_uploaders_are_rejected() {
    let mut archive = Archive::new(NewPolicy::NeverNew);
    {
        let session = archive.db.session().unwrap();
        let mut uploader = session.uploader("jane@example.org").unwrap().unwrap();
        uploader.allow_binary_uploads = false;
        session.add_uploader(&uploader).unwrap();
        session.commit().unwrap();
    }
    let changes = archive.write_upload("1.0", "unstable", Some("foo_1.0_amd64.deb"));
    let outcome = archive.handler(false).process_changes(&mut archive.db, "master", &changes).unwrap();
    assert!(outcome.reason.unwrap().contains("not allowed to upload binaries"));
}

#[test]
fn corrupted_manifest_entries_are_rejected() {
    let mut archive = Archive::new(NewPolicy::NeverNew);
    let changes = archive.write_upload("1.0", "unstable", None);
    std::fs::write(archive.incoming.join("foo_1.0.tar.xz"), "tampered").unwrap();

    let outcome = archive.handler(false).process_changes(&mut archive.db, "master", &changes).unwrap();
    assert_eq!(outcome.status, UploadStatus::Rejected);
    assert!(outcome.reason.unwrap().contains("This changes file was invalid"));
}

#[test]
fn unknown_signer_is_an_error() {
    let mut archive = Archive::new(NewPolicy::Default);
    let changes = archive.write_upload("1.0", "unstable", None);
    let handler = UploadHandler::new(
        archive.config.clone(),
        Arc::new(FakeVerifier {
            fingerprint: "FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFF",
            weak: false,
        }),
        Arc::new(FakeRenderer),
    )
    .unwrap();

    assert!(matches!(
        handler.process_changes(&mut archive.db, "master", &changes),
        Err(ArchiveError::UnknownUploader { .. })
    ));
}

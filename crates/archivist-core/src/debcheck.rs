//! Dependency installability checks.
//!
//! The analysis itself is delegated to an external solver through
//! [`InstallabilityChecker`]; this module gathers the index files a check
//! needs and turns the solver's report into [`DependencyIssue`] records.

use std::path::PathBuf;
use std::process::Command;

use archivist_schema::Architecture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{ArchiveError, Result};
use crate::lock::LockDir;
use crate::reader::RepositoryReader;

/// Index files handed to a checker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSet {
    /// Indices whose packages are checked.
    pub foreground: Vec<PathBuf>,
    /// Indices that may only satisfy dependencies.
    pub background: Vec<PathBuf>,
    /// Architecture the solver treats as native.
    pub native_arch: Architecture,
}

/// External dependency solver.
pub trait InstallabilityChecker: std::fmt::Debug + Send + Sync {
    /// Check every foreground package of `indices` for `arch` and return
    /// the solver's structured report.
    ///
    /// # Errors
    ///
    /// [`ArchiveError::DependencyCheck`] when no report could be produced.
    fn check_installability(&self, indices: &IndexSet, arch: &Architecture) -> Result<Value>;
}

/// Checker backed by `dose-debcheck`.
#[derive(Debug, Clone, Default)]
pub struct DoseDebcheck {
    binary: Option<PathBuf>,
}

impl DoseDebcheck {
    /// Locate `dose-debcheck` on `PATH`.
    pub fn new() -> Self {
        Self {
            binary: which::which("dose-debcheck").ok(),
        }
    }
}

impl InstallabilityChecker for DoseDebcheck {
    fn check_installability(&self, indices: &IndexSet, arch: &Architecture) -> Result<Value> {
        let fail = |message: String| ArchiveError::DependencyCheck {
            arch: arch.to_string(),
            message,
        };
        let binary = self
            .binary
            .as_ref()
            .ok_or_else(|| fail("dose-debcheck is not installed".to_string()))?;

        let mut cmd = Command::new(binary);
        cmd.args(["--quiet", "--latest=1", "-e", "-f", "--summary"])
            .arg(format!("--deb-native-arch={}", indices.native_arch));
        for bg in &indices.background {
            cmd.arg(format!("--bg={}", bg.display()));
        }
        for fg in &indices.foreground {
            cmd.arg(format!("--fg={}", fg.display()));
        }
        debug!(?cmd, "running dependency check");
        let output = cmd.output()?;

        // dose exits non-zero whenever it finds problems, so judge by the output
        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.starts_with("output-version") {
            return Err(fail(format!(
                "{stdout}\n{}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        serde_yaml::from_str(&stdout).map_err(|e| fail(format!("unreadable report: {e}")))
    }
}

/// Whether a package is a source or a binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageKind {
    /// Source package.
    Source,
    /// Binary package.
    Binary,
}

/// A package named in a dependency report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageIssue {
    /// Source or binary.
    pub kind: PackageKind,
    /// Package name.
    pub name: String,
    /// Package version.
    pub version: String,
    /// Architectures the entry applies to.
    pub architectures: Vec<String>,
    /// Dependency that led to this package in a chain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depends: Option<String>,
    /// Dependency that cannot be satisfied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unsat_dependency: Option<String>,
    /// Conflict that cannot be satisfied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unsat_conflict: Option<String>,
}

/// Two packages that cannot be installed together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageConflict {
    /// First side.
    pub pkg1: PackageIssue,
    /// Second side.
    pub pkg2: PackageIssue,
    /// How the checked package pulls in `pkg1`.
    pub depchain1: Vec<PackageIssue>,
    /// How the checked package pulls in `pkg2`.
    pub depchain2: Vec<PackageIssue>,
}

/// An uninstallable package and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyIssue {
    /// The affected package.
    pub package: PackageIssue,
    /// Unsatisfiable dependencies.
    pub missing: Vec<PackageIssue>,
    /// Conflicts in the dependency chain.
    pub conflicts: Vec<PackageConflict>,
}

/// Turn a dose-style report into issues for `arch`.
///
/// Entries for `all` are skipped unless `arch` is `all` itself.
/// `kind_override` replaces the kind of every reported package.
///
/// # Errors
///
/// [`ArchiveError::UnrecognizedDependencyIssueShape`] for entries or
/// reasons of an unexpected form.
pub fn parse_dependency_report(
    report: &Value,
    arch: &str,
    kind_override: Option<PackageKind>,
) -> Result<Vec<DependencyIssue>> {
    let entries = match report.get("report") {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(entries)) => entries,
        Some(other) => return Err(unrecognized(other)),
    };

    let mut issues = Vec::new();
    for entry in entries {
        if arch != "all" && entry.get("architecture").and_then(scalar).as_deref() == Some("all") {
            continue;
        }
        let mut package = package_issue(entry, arch)?;
        if let Some(kind) = kind_override {
            package.kind = kind;
        }

        let mut missing = Vec::new();
        let mut conflicts = Vec::new();
        let reasons: &[Value] = match entry.get("reasons") {
            None | Some(Value::Null) => &[],
            Some(Value::Array(reasons)) => reasons,
            Some(other) => return Err(unrecognized(other)),
        };
        for reason in reasons {
            if let Some(m) = reason.get("missing") {
                let pkg = m.get("pkg").ok_or_else(|| unrecognized(reason))?;
                let mut issue = package_issue(pkg, arch)?;
                issue.unsat_dependency = pkg.get("unsat-dependency").and_then(scalar);
                missing.push(issue);
            } else if let Some(c) = reason.get("conflict") {
                conflicts.push(conflict(c, arch)?);
            } else {
                return Err(unrecognized(reason));
            }
        }

        issues.push(DependencyIssue {
            package,
            missing,
            conflicts,
        });
    }
    Ok(issues)
}

fn conflict(value: &Value, arch: &str) -> Result<PackageConflict> {
    let side = |key: &str| -> Result<PackageIssue> {
        let pkg = value.get(key).ok_or_else(|| unrecognized(value))?;
        let mut issue = package_issue(pkg, arch)?;
        issue.unsat_conflict = pkg.get("unsat-conflict").and_then(scalar);
        Ok(issue)
    };
    let chain = |key: &str| -> Result<Vec<PackageIssue>> {
        let Some(chains) = value.get(key) else {
            return Ok(Vec::new());
        };
        let Some(first) = chains.as_array().and_then(|c| c.first()) else {
            return Err(unrecognized(chains));
        };
        let Some(links) = first.get("depchain").and_then(Value::as_array) else {
            return Err(unrecognized(first));
        };
        links
            .iter()
            .map(|link| {
                let mut issue = package_issue(link, arch)?;
                issue.depends = link.get("depends").and_then(scalar);
                Ok(issue)
            })
            .collect()
    };
    Ok(PackageConflict {
        pkg1: side("pkg1")?,
        pkg2: side("pkg2")?,
        depchain1: chain("depchain1")?,
        depchain2: chain("depchain2")?,
    })
}

/// Name, version, kind and architectures of a report entry.
///
/// Binaries list their own architectures (minus `any`) plus the checked
/// one; sources only the checked one, and `all` if they build for it.
fn package_issue(value: &Value, arch: &str) -> Result<PackageIssue> {
    let field = |key: &str| value.get(key).and_then(scalar).ok_or_else(|| unrecognized(value));
    let kind = if value.get("type").and_then(Value::as_str) == Some("src") {
        PackageKind::Source
    } else {
        PackageKind::Binary
    };
    let raw_archs = value.get("architecture").and_then(scalar).unwrap_or_default();
    let raw_archs: Vec<&str> = raw_archs.split(',').map(str::trim).collect();

    let architectures = match kind {
        PackageKind::Binary => {
            let mut archs: Vec<String> = raw_archs
                .iter()
                .filter(|a| !a.is_empty() && **a != "any")
                .map(|a| (*a).to_string())
                .collect();
            if !archs.iter().any(|a| a == arch) {
                archs.push(arch.to_string());
            }
            archs
        }
        PackageKind::Source if raw_archs.contains(&"all") => vec![arch.to_string(), "all".to_string()],
        PackageKind::Source => vec![arch.to_string()],
    };

    Ok(PackageIssue {
        kind,
        name: field("package")?,
        version: field("version")?,
        architectures,
        depends: None,
        unsat_dependency: None,
        unsat_conflict: None,
    })
}

/// YAML scalars may come back as numbers (`version: 1.0`).
fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn unrecognized(value: &Value) -> ArchiveError {
    ArchiveError::UnrecognizedDependencyIssueShape(value.to_string())
}

/// Check the binary installability of a suite on every architecture.
///
/// The index files are collected and checked while the suite's publish
/// lock is held, so the solver never sees a half-published suite.
/// `primary_arch` is the native architecture used when checking `all`.
///
/// # Errors
///
/// [`ArchiveError::DependencyCheck`] when an architecture has no indices
/// or the checker fails, plus lock, reader and report errors.
pub fn collect_dependency_issues(
    checker: &dyn InstallabilityChecker,
    locks: &LockDir,
    reader: &mut RepositoryReader,
    suite: &str,
    components: &[String],
    architectures: &[Architecture],
    primary_arch: &Architecture,
) -> Result<Vec<DependencyIssue>> {
    let mut reports = Vec::new();
    {
        let _lock = locks.lock_publish(reader.name(), suite, true)?;
        for arch in architectures {
            let indices = suite_indices(reader, suite, components, arch, primary_arch)?;
            if indices.foreground.is_empty() {
                return Err(ArchiveError::DependencyCheck {
                    arch: arch.to_string(),
                    message: format!("unable to get any indices for {suite}"),
                });
            }
            reports.push((arch, checker.check_installability(&indices, arch)?));
        }
    }

    let mut issues = Vec::new();
    for (arch, report) in reports {
        let found = parse_dependency_report(&report, arch.as_str(), Some(PackageKind::Binary))?;
        info!(suite, %arch, issues = found.len(), "dependency check finished");
        issues.extend(found);
    }
    Ok(issues)
}

/// `Packages` indices of `arch` in the foreground, `all` (or, for `all`
/// itself, the primary architecture) in the background.
fn suite_indices(
    reader: &mut RepositoryReader,
    suite: &str,
    components: &[String],
    arch: &Architecture,
    primary_arch: &Architecture,
) -> Result<IndexSet> {
    let background_arch = if arch.is_all() { primary_arch.clone() } else { Architecture::all() };
    let mut indices = IndexSet {
        foreground: Vec::new(),
        background: Vec::new(),
        native_arch: if arch.is_all() { primary_arch.clone() } else { arch.clone() },
    };
    for component in components {
        if let Some(path) = reader.find_index(suite, &format!("{component}/binary-{arch}/Packages"))? {
            indices.foreground.push(path);
        }
        if let Some(path) =
            reader.find_index(suite, &format!("{component}/binary-{background_arch}/Packages"))?
        {
            indices.background.push(path);
        }
    }
    Ok(indices)
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, Mutex};

    use archivist_schema::sha256_file;
    use serde_json::json;

    use super::*;
    use crate::signature::{SignatureVerifier, SignedContent};

    #[derive(Debug)]
    struct Unused;

    impl SignatureVerifier for Unused {
        fn verify(&self, _: &[u8], _: &[PathBuf], _: bool) -> Result<SignedContent> {
            unreachable!("trusted readers without keyrings never verify")
        }
    }

    #[derive(Debug, Default)]
    struct Recorder {
        seen: Mutex<Vec<(String, IndexSet)>>,
    }

    impl InstallabilityChecker for Recorder {
        fn check_installability(&self, indices: &IndexSet, arch: &Architecture) -> Result<Value> {
            self.seen
                .lock()
                .unwrap()
                .push((arch.to_string(), indices.clone()));
            Ok(json!({
                "output-version": "1.2",
                "report": [{
                    "package": "foo",
                    "version": "1.0",
                    "architecture": arch.as_str(),
                    "status": "broken",
                    "reasons": [{"missing": {"pkg": {
                        "package": "foo",
                        "version": "1.0",
                        "architecture": arch.as_str(),
                        "unsat-dependency": "libbar (>= 2)"
                    }}}]
                }]
            }))
        }
    }

    fn write_suite(root: &Path, suite: &str, files: &[&str]) {
        let dist = root.join("dists").join(suite);
        let mut release = String::from("Suite: unstable\nSHA256:\n");
        for rel in files {
            let body = "Package: foo\nVersion: 1.0\n";
            let path = dist.join(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, body).unwrap();
            let digest = sha256_file(&path).unwrap();
            release.push_str(&format!(" {digest} {} {rel}\n", body.len()));
        }
        std::fs::create_dir_all(&dist).unwrap();
        std::fs::write(dist.join("InRelease"), release).unwrap();
    }

    #[test]
    fn missing_and_conflict_reasons() {
        let report = json!({
            "output-version": "1.2",
            "report": [{
                "package": "foo",
                "version": 1.0,
                "architecture": "amd64",
                "reasons": [
                    {"missing": {"pkg": {
                        "package": "foo", "version": "1.0", "architecture": "any",
                        "unsat-dependency": "libbar"
                    }}},
                    {"conflict": {
                        "pkg1": {"package": "a", "version": "1", "architecture": "amd64",
                                 "unsat-conflict": "b"},
                        "pkg2": {"package": "b", "version": "2", "architecture": "all"},
                        "depchain1": [{"depchain": [
                            {"package": "foo", "version": "1.0", "architecture": "amd64",
                             "depends": "a"}
                        ]}]
                    }}
                ]
            }]
        });
        let issues = parse_dependency_report(&report, "amd64", None).unwrap();
        assert_eq!(issues.len(), 1);
        let issue = &issues[0];
        assert_eq!(issue.package.version, "1.0");
        assert_eq!(issue.package.kind, PackageKind::Binary);

        assert_eq!(issue.missing[0].architectures, ["amd64"]);
        assert_eq!(issue.missing[0].unsat_dependency.as_deref(), Some("libbar"));

        let conflict = &issue.conflicts[0];
        assert_eq!(conflict.pkg1.unsat_conflict.as_deref(), Some("b"));
        assert_eq!(conflict.pkg2.architectures, ["all", "amd64"]);
        assert_eq!(conflict.depchain1[0].depends.as_deref(), Some("a"));
        assert!(conflict.depchain2.is_empty());
    }

    #[test]
    fn arch_all_entries_and_sources() {
        let report = json!({"report": [
            {"package": "doc", "version": "1", "architecture": "all", "reasons": []},
            {"package": "src", "version": "2", "architecture": "any,all", "type": "src",
             "reasons": []}
        ]});
        let issues = parse_dependency_report(&report, "arm64", None).unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].package.kind, PackageKind::Source);
        assert_eq!(issues[0].package.architectures, ["arm64", "all"]);

        assert_eq!(parse_dependency_report(&report, "all", None).unwrap().len(), 2);

        let forced = parse_dependency_report(&report, "arm64", Some(PackageKind::Binary)).unwrap();
        assert_eq!(forced[0].package.kind, PackageKind::Binary);

        assert!(parse_dependency_report(&json!({"report": null}), "amd64", None).unwrap().is_empty());
    }

    #[test]
    fn unknown_reason_shape_is_an_error() {
        let report = json!({"report": [{
            "package": "foo", "version": "1", "architecture": "amd64",
            "reasons": [{"broken-by-gremlins": {}}]
        }]});
        assert!(matches!(
            parse_dependency_report(&report, "amd64", None),
            Err(ArchiveError::UnrecognizedDependencyIssueShape(_))
        ));
        assert!(parse_dependency_report(&json!({"report": 3}), "amd64", None).is_err());
    }

    #[test]
    fn collects_indices_per_architecture() {
        let dir = tempfile::tempdir().unwrap();
        write_suite(
            dir.path(),
            "unstable",
            &[
                "main/binary-amd64/Packages",
                "main/binary-all/Packages",
                "contrib/binary-amd64/Packages",
            ],
        );
        let mut reader = RepositoryReader::local(dir.path(), "master", Vec::new(), Arc::new(Unused));
        reader.set_trusted(true);
        let locks = LockDir::new(dir.path().join("locks"));
        let checker = Recorder::default();

        let issues = collect_dependency_issues(
            &checker,
            &locks,
            &mut reader,
            "unstable",
            &["main".to_string(), "contrib".to_string()],
            &[Architecture::new("amd64"), Architecture::all()],
            &Architecture::new("amd64"),
        )
        .unwrap();
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].missing[0].unsat_dependency.as_deref(), Some("libbar (>= 2)"));

        let seen = checker.seen.lock().unwrap();
        let (_, amd64) = &seen[0];
        assert_eq!(amd64.foreground.len(), 2);
        assert_eq!(amd64.background.len(), 1);
        let (arch, all) = &seen[1];
        assert_eq!(arch, "all");
        assert_eq!(all.native_arch, Architecture::new("amd64"));
        assert_eq!(all.foreground.len(), 1);
        assert_eq!(all.background.len(), 2);

        // the publish lock was released afterwards
        assert!(locks.lock_publish("master", "unstable", false).is_ok());
    }

    #[test]
    fn suite_without_indices_fails() {
        let dir = tempfile::tempdir().unwrap();
        write_suite(dir.path(), "unstable", &[]);
        let mut reader = RepositoryReader::local(dir.path(), "master", Vec::new(), Arc::new(Unused));
        reader.set_trusted(true);
        let err = collect_dependency_issues(
            &Recorder::default(),
            &LockDir::new(dir.path().join("locks")),
            &mut reader,
            "unstable",
            &["main".to_string()],
            &[Architecture::new("amd64")],
            &Architecture::new("amd64"),
        )
        .unwrap_err();
        assert!(matches!(err, ArchiveError::DependencyCheck { .. }));
    }
}

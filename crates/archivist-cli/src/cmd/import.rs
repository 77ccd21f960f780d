//! import-source and import-binary commands
//!
//! Both bypass uploader permissions and signatures; they are meant for
//! operators seeding or repairing an archive.

use std::path::Path;

use anyhow::{Context as _, Result};
use archivist_core::control::AptFtparchive;
use archivist_core::importer::{BinaryOutcome, PackageImporter, SourceOutcome};
use archivist_schema::NewPolicy;

use super::{Context, finish};
use crate::ui::Output;

/// Repository-suite an import goes to.
#[derive(Debug, Clone, Copy)]
pub struct Target<'a> {
    pub repo: &'a str,
    pub suite: &'a str,
    /// Copy artifacts instead of moving them.
    pub keep: bool,
}

impl<'a> Target<'a> {
    pub fn new(repo: &'a str, suite: &'a str, keep: bool) -> Self {
        Self { repo, suite, keep }
    }
}

pub fn import_source(
    ctx: &Context,
    target: &Target<'_>,
    dsc: &Path,
    component: &str,
    policy: Option<NewPolicy>,
    review: bool,
) -> Result<()> {
    let mut db = ctx.open_db()?;
    let renderer = AptFtparchive::new();
    let _lock = ctx.locks.lock_publish(target.repo, target.suite, true)?;

    let session = db.session()?;
    let rss = session.require_repo_suite(target.repo, target.suite)?;
    let policy = policy.unwrap_or(rss.new_policy);
    let mut importer = PackageImporter::new(&session, rss, &renderer, &ctx.config)?;
    if target.keep {
        importer.set_keep_source_packages(true);
    }
    let result = importer.import_source(dsc, component, policy, review);
    let journal = importer.into_journal();
    let outcome = finish(session, journal, result)
        .with_context(|| format!("Failed to import {}", dsc.display()))?;

    let output = Output::new();
    let name = dsc.display().to_string();
    match outcome {
        SourceOutcome::Published => {
            output.success(&format!("{name} published to {}/{}", target.repo, target.suite));
        }
        SourceOutcome::Queued => {
            output.held(&format!("{name} is waiting in NEW for {}/{}", target.repo, target.suite));
        }
    }
    Ok(())
}

pub fn import_binary(
    ctx: &Context,
    target: &Target<'_>,
    deb: &Path,
    component: Option<&str>,
) -> Result<()> {
    let mut db = ctx.open_db()?;
    let renderer = AptFtparchive::new();
    let _lock = ctx.locks.lock_publish(target.repo, target.suite, true)?;

    let session = db.session()?;
    let rss = session.require_repo_suite(target.repo, target.suite)?;
    let mut importer = PackageImporter::new(&session, rss, &renderer, &ctx.config)?;
    if target.keep {
        importer.set_keep_source_packages(true);
    }
    let result = importer.import_binary(deb, component);
    let journal = importer.into_journal();
    let outcome = finish(session, journal, result)
        .with_context(|| format!("Failed to import {}", deb.display()))?;

    let output = Output::new();
    let name = deb.display().to_string();
    match outcome {
        BinaryOutcome::Published => {
            output.success(&format!("{name} published to {}/{}", target.repo, target.suite));
        }
        BinaryOutcome::QueuedWithSource => {
            output.held(&format!("{name} filed in NEW next to its source"));
        }
    }
    Ok(())
}

//! NEW queue review commands

use anyhow::{Context as _, Result};
use archivist_core::control::AptFtparchive;
use archivist_core::importer::PackageImporter;
use archivist_core::newqueue::NewQueueProcessor;
use archivist_schema::DebVersion;

use super::{Context, finish};
use crate::ui::{Output, table};

/// Accept `name`/`version` from the NEW queue of `repo`/`suite`.
pub fn accept(ctx: &Context, repo: &str, suite: &str, name: &str, version: &str) -> Result<()> {
    let version = DebVersion::parse(version)?;
    let mut db = ctx.open_db()?;
    let renderer = AptFtparchive::new();
    let _lock = ctx.locks.lock_publish(repo, suite, true)?;

    let session = db.session()?;
    let rss = session.require_repo_suite(repo, suite)?;
    let mut processor =
        NewQueueProcessor::new(PackageImporter::new(&session, rss, &renderer, &ctx.config)?);
    let result = processor.accept(name, &version);
    let journal = processor.into_journal();
    let outcome = finish(session, journal, result)
        .with_context(|| format!("Failed to accept {name}/{version}"))?;

    let output = Output::new();
    output.success(&format!("{name}/{version} accepted into {repo}/{suite}"));
    if outcome.overrides_added > 0 {
        output.info(&format!("{} override(s) registered", outcome.overrides_added));
    }
    if outcome.binaries_published > 0 {
        output.info(&format!("{} queued binary package(s) published", outcome.binaries_published));
    }
    Ok(())
}

/// Reject `name`/`version` from the NEW queue of `repo`/`suite`.
pub fn reject(ctx: &Context, repo: &str, suite: &str, name: &str, version: &str) -> Result<()> {
    let version = DebVersion::parse(version)?;
    let mut db = ctx.open_db()?;
    let renderer = AptFtparchive::new();
    let _lock = ctx.locks.lock_publish(repo, suite, true)?;

    let session = db.session()?;
    let rss = session.require_repo_suite(repo, suite)?;
    let mut processor =
        NewQueueProcessor::new(PackageImporter::new(&session, rss, &renderer, &ctx.config)?);
    let result = processor.reject(name, &version);
    let journal = processor.into_journal();
    finish(session, journal, result)
        .with_context(|| format!("Failed to reject {name}/{version}"))?;

    Output::new().success(&format!("{name}/{version} rejected from NEW of {repo}/{suite}"));
    Ok(())
}

/// Show what is waiting in NEW for `repo`/`suite`.
pub fn list(ctx: &Context, repo: &str, suite: &str) -> Result<()> {
    let mut db = ctx.open_db()?;
    let session = db.session()?;
    let rss = session.require_repo_suite(repo, suite)?;
    let entries = session.list_new_queue(&rss)?;
    session.rollback()?;

    let output = Output::new();
    if entries.is_empty() {
        output.info(&format!("The NEW queue of {rss} is empty."));
        return Ok(());
    }
    output.section(&format!("NEW queue of {rss}"));
    println!("{}", table::new_queue(&entries));
    Ok(())
}

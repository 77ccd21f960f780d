//! Repository and uploader administration

use anyhow::Result;
use archivist_schema::{NewPolicy, Uploader};

use super::Context;
use crate::ui::Output;

pub fn add_repo_suite(
    ctx: &Context,
    repo: &str,
    suite: &str,
    policy: NewPolicy,
    accept_uploads: bool,
) -> Result<()> {
    let mut db = ctx.open_db()?;
    let session = db.session()?;
    let rss = session.add_repo_suite(repo, suite, policy, accept_uploads)?;
    session.commit()?;

    let uploads = if rss.accept_uploads {
        "accepts uploads"
    } else {
        "closed for uploads"
    };
    Output::new().success(&format!("{rss}: {} policy, {uploads}", rss.new_policy));
    Ok(())
}

pub fn add_uploader(ctx: &Context, uploader: &Uploader) -> Result<()> {
    let mut db = ctx.open_db()?;
    let session = db.session()?;
    session.add_uploader(uploader)?;
    session.commit()?;

    let output = Output::new();
    output.success(&format!("uploader {} registered", uploader.email));
    for fpr in &uploader.pgp_fingerprints {
        output.info(&format!("key {fpr}"));
    }
    if !uploader.allowed_packages.is_empty() {
        output.info(&format!("limited to {}", uploader.allowed_packages.join(", ")));
    }
    Ok(())
}

//! process-changes command

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context as _, Result, bail};
use archivist_core::control::AptFtparchive;
use archivist_core::upload::{UploadHandler, UploadStatus};

use super::Context;
use crate::ui::Output;

/// Verify and import one `.changes` upload into `repo`.
pub fn process_changes(ctx: &Context, repo: &str, changes: &Path, keep: bool) -> Result<()> {
    let mut db = ctx.open_db()?;
    let verifier = ctx.verifier();
    let mut handler = UploadHandler::new(ctx.config.clone(), verifier, Arc::new(AptFtparchive::new()))
        .context("Failed to set up upload handler")?;
    if keep {
        handler.set_keep_source_packages(true);
    }

    let outcome = handler
        .process_changes(&mut db, repo, changes)
        .with_context(|| format!("Failed to process {}", changes.display()))?;

    let output = Output::new();
    let name = changes.display().to_string();
    match outcome.status {
        UploadStatus::Accepted => {
            output.success(&format!("{name}: accepted from {}", outcome.uploader.email));
        }
        UploadStatus::HeldInNew => {
            output.held(&format!(
                "{name}: held in NEW for review (from {})",
                outcome.uploader.email
            ));
            if let Some(reason) = &outcome.reason {
                output.info(reason);
            }
        }
        UploadStatus::Rejected => {
            let reason = outcome.reason.unwrap_or_default();
            output.error(&format!("{name}: rejected"));
            bail!(reason);
        }
    }
    Ok(())
}

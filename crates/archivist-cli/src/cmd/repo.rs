//! Listing the contents of local or remote repositories

use anyhow::{Context as _, Result};
use archivist_core::reader::{Listing, RepositoryReader, newest_packages};
use archivist_schema::Architecture;

use super::Context;
use crate::RepositoryArgs;
use crate::ui::{Output, table};

/// Open a reader for `args`; remote repositories are cached under the workspace.
pub fn open_reader(ctx: &Context, args: &RepositoryArgs) -> Result<RepositoryReader> {
    let mut reader = RepositoryReader::open(
        &args.location,
        &args.name,
        &ctx.config,
        args.keyrings.clone(),
        ctx.verifier(),
    )
    .with_context(|| format!("Failed to open repository {}", args.location))?;
    reader.set_trusted(args.trusted);
    Ok(reader)
}

pub fn list_sources(
    ctx: &Context,
    args: &RepositoryArgs,
    component: &str,
    include_extra_source_only: bool,
    newest: bool,
) -> Result<()> {
    let mut reader = open_reader(ctx, args)?;
    let listing = reader
        .list_source_packages(&args.suite, component, include_extra_source_only)
        .with_context(|| format!("Failed to read sources of {}/{component}", args.suite))?;

    let output = Output::new();
    if listing.packages.is_empty() {
        output.info(&format!("No source packages in {}/{component}.", args.suite));
        return Ok(());
    }
    output.section(&format!("Sources of {} {}/{component}", reader.location(), args.suite));
    let Listing {
        packages,
        diagnostics,
    } = listing;
    if newest {
        println!("{}", table::sources(newest_packages(packages).values()));
    } else {
        println!("{}", table::sources(&packages));
    }
    show_diagnostics(&output, &diagnostics);
    Ok(())
}

/// Which binary index to read.
#[derive(Debug, Clone)]
pub struct ArchSelection {
    pub arch: String,
    pub shadow_arch: Option<String>,
    /// Read `debian-installer` indices instead.
    pub installer: bool,
}

pub fn list_binaries(
    ctx: &Context,
    args: &RepositoryArgs,
    component: &str,
    selection: &ArchSelection,
    newest: bool,
) -> Result<()> {
    let mut reader = open_reader(ctx, args)?;
    let arch = Architecture::new(selection.arch.as_str());
    let listing = if selection.installer {
        reader.list_installer_packages(&args.suite, component, &arch)
    } else {
        let shadow = selection.shadow_arch.as_deref().map(Architecture::new);
        reader.list_binary_packages(&args.suite, component, &arch, shadow.as_ref())
    };
    let listing = listing
        .with_context(|| format!("Failed to read {arch} packages of {}/{component}", args.suite))?;

    let output = Output::new();
    if listing.packages.is_empty() {
        output.info(&format!("No {arch} packages in {}/{component}.", args.suite));
        return Ok(());
    }
    output.section(&format!(
        "Packages of {} {}/{component} ({arch})",
        reader.location(),
        args.suite
    ));
    let Listing {
        packages,
        diagnostics,
    } = listing;
    if newest {
        println!("{}", table::binaries(newest_packages(packages).values()));
    } else {
        println!("{}", table::binaries(&packages));
    }
    show_diagnostics(&output, &diagnostics);
    Ok(())
}

fn show_diagnostics(output: &Output, diagnostics: &[archivist_core::reader::Diagnostic]) {
    if diagnostics.is_empty() {
        return;
    }
    output.warn(&format!("{} note(s) while reading the index:", diagnostics.len()));
    println!("{}", table::diagnostics(diagnostics));
}

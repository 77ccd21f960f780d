//! check-depends command

use anyhow::{Context as _, Result};
use archivist_core::debcheck::{DoseDebcheck, collect_dependency_issues};
use archivist_schema::Architecture;

use super::Context;
use super::repo::open_reader;
use crate::RepositoryArgs;
use crate::ui::{Output, table};

pub fn check_depends(
    ctx: &Context,
    args: &RepositoryArgs,
    components: &[String],
    architectures: &[String],
    primary_arch: &str,
    json: bool,
) -> Result<()> {
    let mut reader = open_reader(ctx, args)?;
    let architectures: Vec<Architecture> =
        architectures.iter().map(|a| Architecture::new(a.as_str())).collect();
    let issues = collect_dependency_issues(
        &DoseDebcheck::new(),
        &ctx.locks,
        &mut reader,
        &args.suite,
        components,
        &architectures,
        &Architecture::new(primary_arch),
    )
    .with_context(|| format!("Failed to check dependencies of {}", args.suite))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&issues)?);
        return Ok(());
    }
    let output = Output::new();
    if issues.is_empty() {
        output.success(&format!("All packages in {} are installable.", args.suite));
        return Ok(());
    }
    output.section(&format!("{} uninstallable package(s) in {}", issues.len(), args.suite));
    println!("{}", table::dependency_issues(&issues));
    Ok(())
}

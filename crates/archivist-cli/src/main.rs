//! archivist - Debian archive import and repository consistency engine

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use archivist_cli::cmd::{self, Context};
use archivist_cli::{Cli, Commands};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let ctx = Context::load(cli.config.as_deref())?;

    match cli.command {
        Commands::ProcessChanges { file, repo, keep } => {
            cmd::upload::process_changes(&ctx, &repo, &file, keep)
        }
        Commands::ImportSource {
            dsc,
            repo,
            suite,
            component,
            policy,
            review,
            keep,
        } => cmd::import::import_source(
            &ctx,
            &cmd::import::Target::new(&repo, &suite, keep),
            &dsc,
            &component,
            policy,
            review,
        ),
        Commands::ImportBinary {
            deb,
            repo,
            suite,
            component,
            keep,
        } => cmd::import::import_binary(
            &ctx,
            &cmd::import::Target::new(&repo, &suite, keep),
            &deb,
            component.as_deref(),
        ),
        Commands::AcceptNew {
            name,
            version,
            repo,
            suite,
        } => cmd::new::accept(&ctx, &repo, &suite, &name, &version),
        Commands::RejectNew {
            name,
            version,
            repo,
            suite,
        } => cmd::new::reject(&ctx, &repo, &suite, &name, &version),
        Commands::ListNew { repo, suite } => cmd::new::list(&ctx, &repo, &suite),
        Commands::ListSources {
            repository,
            component,
            extra_source_only,
            newest,
        } => cmd::repo::list_sources(&ctx, &repository, &component, extra_source_only, newest),
        Commands::ListBinaries {
            repository,
            component,
            arch,
            shadow_arch,
            installer,
            newest,
        } => cmd::repo::list_binaries(
            &ctx,
            &repository,
            &component,
            &cmd::repo::ArchSelection {
                arch,
                shadow_arch,
                installer,
            },
            newest,
        ),
        Commands::CheckDepends {
            repository,
            components,
            architectures,
            primary_arch,
            json,
        } => cmd::depcheck::check_depends(
            &ctx,
            &repository,
            &components,
            &architectures,
            &primary_arch,
            json,
        ),
        Commands::AddRepoSuite {
            repo,
            suite,
            policy,
            no_uploads,
        } => cmd::admin::add_repo_suite(&ctx, &repo, &suite, policy, !no_uploads),
        Commands::AddUploader {
            email,
            name,
            fingerprints,
            no_source,
            no_binary,
            always_review,
            allowed_packages,
        } => {
            let mut uploader = archivist_schema::Uploader::new(email);
            uploader.name = name;
            uploader.pgp_fingerprints = fingerprints;
            uploader.allow_source_uploads = !no_source;
            uploader.allow_binary_uploads = !no_binary;
            uploader.always_review = always_review;
            uploader.allowed_packages = allowed_packages;
            cmd::admin::add_uploader(&ctx, &uploader)
        }
    }
}

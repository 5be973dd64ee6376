// src/main.rs

use anyhow::{bail, Context, Result};
use clap::Parser;
use postbuild::cli::{Cli, Commands};
use postbuild::report::OutputReportSummary;
use postbuild::resolve::{PathResolver, ResolvedDependency};
use postbuild::{FileManifest, PostConfig, PostProcessor, SystemLinkEditor};
use std::path::Path;
use std::time::Duration;
use tracing::info;

fn load_manifest(manifest: Option<&Path>, prefix: &Path) -> Result<FileManifest> {
    match manifest {
        Some(path) => FileManifest::load(path)
            .with_context(|| format!("failed to load manifest {}", path.display())),
        None => {
            info!("No manifest given, scanning {}", prefix.display());
            FileManifest::scan(prefix)
                .with_context(|| format!("failed to scan {}", prefix.display()))
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            configs,
            manifests,
            timeout,
        } => {
            if !manifests.is_empty() && manifests.len() != configs.len() {
                bail!(
                    "got {} --manifest for {} --config; give one per output or none",
                    manifests.len(),
                    configs.len()
                );
            }

            let mut outputs = Vec::with_capacity(configs.len());
            for (index, path) in configs.iter().enumerate() {
                let mut config = PostConfig::load(path)
                    .with_context(|| format!("failed to load config {}", path.display()))?;
                if config.output.is_empty() {
                    config.output = path
                        .file_stem()
                        .map(|s| s.to_string_lossy().into_owned())
                        .unwrap_or_default();
                }
                if let Some(secs) = timeout {
                    config = config.with_timeout(Duration::from_secs(secs));
                }

                let manifest = load_manifest(manifests.get(index).map(|p| p.as_path()), &config.prefix)?;
                outputs.push((config, manifest));
            }

            let reports = PostProcessor::run_outputs_with(&outputs, |config| {
                SystemLinkEditor::new(config.relocation.timeout())
            });

            let summaries: Vec<_> = reports.iter().map(OutputReportSummary).collect();
            println!("{}", serde_json::to_string_pretty(&summaries)?);

            if reports.iter().any(|r| !r.success()) {
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Resolve {
            reference,
            prefix,
            manifest,
            build_prefix,
            explicit,
        } => {
            let manifest = load_manifest(manifest.as_deref(), &prefix)?;
            let resolver =
                PathResolver::new(&prefix, &manifest).with_build_prefix(build_prefix.as_deref());

            match resolver.resolve_with(&reference, explicit.as_deref())? {
                ResolvedDependency::Internal(path) => println!("internal: {}", path.display()),
                ResolvedDependency::External => println!("external"),
                ResolvedDependency::Unresolved => println!("unresolved"),
            }
            Ok(())
        }
        Commands::CheckVersion {
            name,
            version,
            manifest,
        } => {
            let manifest = FileManifest::load(&manifest)
                .with_context(|| format!("failed to load manifest {}", manifest.display()))?;
            postbuild::checks::check_version(&name, &version, manifest.entries())?;
            println!("{} {}: ok", name, version);
            Ok(())
        }
    }
}

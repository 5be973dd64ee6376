// src/post/stages.rs

//! The standard post-build stages

use super::{PostStage, StageContext};
use crate::checks::shebang::{ShebangFix, ShebangFixer};
use crate::checks::symlinks::{collect_symlinks, make_relative, validate};
use crate::checks::{break_hardlinks, check_version, validate_menus};
use crate::error::{Error, Result};
use crate::relocate::RelocationPlanner;
use crate::report::{Finding, FindingKind};
use crate::resolve::PathResolver;
use tracing::debug;

/// Replace hardlinked manifest files with independent copies
pub struct HardlinkStage;

impl PostStage for HardlinkStage {
    fn name(&self) -> &str {
        "hardlinks"
    }

    fn run(&self, ctx: &mut StageContext<'_>) -> Result<()> {
        let prefix = ctx.prefix().to_path_buf();
        let mut replaced = 0;
        for entry in ctx.manifest {
            replaced += break_hardlinks(&prefix.join(entry), &prefix)?;
        }
        ctx.report.add_rewrites(replaced);
        Ok(())
    }
}

/// Rewrite build-prefix interpreter lines
pub struct ShebangStage;

impl PostStage for ShebangStage {
    fn name(&self) -> &str {
        "shebangs"
    }

    fn run(&self, ctx: &mut StageContext<'_>) -> Result<()> {
        let config = ctx.config;
        let fixer = ShebangFixer::new(&config.prefix)
            .with_build_prefix(config.build_prefix.clone())
            .with_final_prefix(config.final_prefix.clone())
            .with_interpreter(config.shebang.interpreter.clone())
            .with_long_replacement(config.shebang.replace_long);

        for entry in ctx.manifest {
            match fixer.fix(entry)? {
                ShebangFix::Unchanged => {}
                ShebangFix::Rewritten(_) => ctx.report.add_rewrites(1),
                ShebangFix::Shortened(line) => {
                    ctx.report.add_rewrites(1);
                    ctx.report.push(Finding::new(
                        FindingKind::LongShebang,
                        format!("Shebang of '{}' was too long, replaced with '{}'", entry.display(), line),
                        vec![entry.clone()],
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Normalise in-prefix symlinks and reject links into the build area
pub struct SymlinkStage;

impl PostStage for SymlinkStage {
    fn name(&self) -> &str {
        "symlinks"
    }

    fn run(&self, ctx: &mut StageContext<'_>) -> Result<()> {
        let config = ctx.config;
        let links = collect_symlinks(&config.prefix, ctx.manifest)?;

        if config.symlinks.make_relative {
            for link in &links {
                if make_relative(link, &config.prefix)? {
                    ctx.report.add_rewrites(1);
                }
            }
        }

        let violations = validate(&links, &config.prefix, &config.build_root);
        if !violations.is_empty() {
            let err = Error::DanglingSymlinks(
                violations.into_iter().map(|v| (v.link, v.target)).collect(),
            );
            ctx.report.push_error(&err);
        }
        Ok(())
    }
}

/// Resolve dependencies and rewrite link tables of every binary
///
/// A failing binary is reported and the stage moves on to the next one.
pub struct RelocationStage;

impl PostStage for RelocationStage {
    fn name(&self) -> &str {
        "relocation"
    }

    fn run(&self, ctx: &mut StageContext<'_>) -> Result<()> {
        let config = ctx.config;
        let resolver = PathResolver::new(&config.prefix, ctx.manifest)
            .with_build_prefix(config.build_prefix.as_deref())
            .with_overrides(&config.relocation.overrides);
        let planner =
            RelocationPlanner::new(resolver).with_identity_rewrite(config.relocation.rewrite_identity);

        for entry in ctx.manifest {
            match planner.relocate(entry, ctx.editor, ctx.session) {
                Ok(Some(outcome)) => {
                    if outcome.rewritten() {
                        ctx.report.add_rewrites(1);
                    }
                    for warning in outcome.warnings {
                        ctx.report.push(warning);
                    }
                    for err in &outcome.errors {
                        ctx.report.push_error(err);
                    }
                }
                Ok(None) => {}
                Err(e) => ctx.report.push_error(&e),
            }
        }
        Ok(())
    }
}

/// Dist-info version and menu descriptor checks
pub struct MetadataStage;

impl PostStage for MetadataStage {
    fn name(&self) -> &str {
        "metadata"
    }

    fn run(&self, ctx: &mut StageContext<'_>) -> Result<()> {
        let config = ctx.config;

        if let (Some(name), Some(version)) = (&config.metadata.name, &config.metadata.version) {
            if let Err(e) = check_version(name, version, ctx.manifest.entries()) {
                ctx.report.push_error(&e);
            }
        } else {
            debug!("No declared name/version, skipping dist-info check");
        }

        if config.metadata.validate_menus {
            for finding in validate_menus(&config.prefix, ctx.manifest) {
                ctx.report.push(finding);
            }
        }
        Ok(())
    }
}

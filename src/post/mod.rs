// src/post/mod.rs

//! Post-build processing of package outputs
//!
//! One output is processed by a chain of stages in a fixed order, each
//! relying on the file set the previous one stabilised:
//!
//! hardlinks -> shebangs -> symlinks -> relocation -> metadata
//!
//! A stage reports problems into the output's [`OutputReport`]. The chain
//! stops after the first stage that records a fatal finding, since the
//! output will not be packaged anyway. Several outputs can be processed in
//! parallel; each gets its own report and relocation session.

mod stages;

pub use stages::{HardlinkStage, MetadataStage, RelocationStage, ShebangStage, SymlinkStage};

use crate::config::PostConfig;
use crate::error::Result;
use crate::manifest::FileManifest;
use crate::relocate::{LinkEditor, RelocationSession};
use crate::report::{Finding, FindingKind, OutputReport};
use rayon::prelude::*;
use std::path::Path;
use tracing::{debug, info, warn};

/// State handed to each stage of one output
pub struct StageContext<'a> {
    pub config: &'a PostConfig,
    pub manifest: &'a FileManifest,
    pub editor: &'a dyn LinkEditor,
    pub session: &'a mut RelocationSession,
    pub report: &'a mut OutputReport,
}

impl StageContext<'_> {
    pub fn prefix(&self) -> &Path {
        &self.config.prefix
    }
}

/// One step of post-build processing
pub trait PostStage: Send + Sync {
    /// Stage name for logging and reports
    fn name(&self) -> &str;

    /// Run the stage, recording findings in `ctx.report`
    ///
    /// An `Err` is an internal failure of the stage itself and ends the chain.
    fn run(&self, ctx: &mut StageContext<'_>) -> Result<()>;
}

/// Ordered list of stages
pub struct StageChain {
    stages: Vec<Box<dyn PostStage>>,
}

impl StageChain {
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    /// Build the standard chain, leaving out disabled stages
    pub fn from_config(config: &PostConfig) -> Self {
        let mut chain = Self::new();

        if config.hardlinks {
            chain.add(Box::new(HardlinkStage));
        }
        if config.shebang.enabled {
            chain.add(Box::new(ShebangStage));
        }
        if config.symlinks.enabled {
            chain.add(Box::new(SymlinkStage));
        }
        if config.relocation.enabled {
            chain.add(Box::new(RelocationStage));
        }
        chain.add(Box::new(MetadataStage));

        chain
    }

    pub fn add(&mut self, stage: Box<dyn PostStage>) {
        self.stages.push(stage);
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Run every stage in order against one output
    pub fn run(&self, ctx: &mut StageContext<'_>) {
        for stage in &self.stages {
            debug!("Running stage '{}' for '{}'", stage.name(), ctx.report.output);
            ctx.report.stages.push(stage.name().to_string());

            if let Err(e) = stage.run(ctx) {
                warn!("Stage '{}' failed: {}", stage.name(), e);
                ctx.report.push(Finding::new(
                    FindingKind::Internal,
                    format!("{}: {}", stage.name(), e),
                    e.paths(),
                ));
            }

            if !ctx.report.success() {
                info!(
                    "Stopping after '{}': {} fatal finding(s)",
                    stage.name(),
                    ctx.report.errors.len()
                );
                break;
            }
        }
    }
}

impl Default for StageChain {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs the stage chain for package outputs
pub struct PostProcessor {
    config: PostConfig,
    chain: StageChain,
}

impl PostProcessor {
    pub fn new(config: PostConfig) -> Self {
        let chain = StageChain::from_config(&config);
        Self { config, chain }
    }

    /// Use a custom chain instead of the standard one
    pub fn with_chain(config: PostConfig, chain: StageChain) -> Self {
        Self { config, chain }
    }

    pub fn config(&self) -> &PostConfig {
        &self.config
    }

    /// Process one output
    pub fn run(&self, manifest: &FileManifest, editor: &dyn LinkEditor) -> OutputReport {
        let mut report = OutputReport::new(self.config.output.clone());
        let mut session = RelocationSession::new();

        info!(
            "Post-processing '{}': {} file(s) in {}",
            self.config.output,
            manifest.len(),
            self.config.prefix.display()
        );
        if let Some(final_prefix) = &self.config.final_prefix {
            debug!("Final install prefix: {}", final_prefix.display());
        }

        let mut ctx = StageContext {
            config: &self.config,
            manifest,
            editor,
            session: &mut session,
            report: &mut report,
        };
        self.chain.run(&mut ctx);

        info!(
            "Finished '{}': {} file(s) rewritten, {} error(s), {} warning(s)",
            report.output,
            report.rewritten_files,
            report.errors.len(),
            report.warnings.len()
        );
        report
    }

    /// Process independent outputs in parallel, reports in input order
    pub fn run_outputs(
        outputs: &[(PostConfig, FileManifest)],
        editor: &dyn LinkEditor,
    ) -> Vec<OutputReport> {
        outputs
            .par_iter()
            .map(|(config, manifest)| PostProcessor::new(config.clone()).run(manifest, editor))
            .collect()
    }

    /// Like [`run_outputs`](Self::run_outputs), but each output gets the
    /// editor `make_editor` builds from its own configuration
    pub fn run_outputs_with<E, F>(
        outputs: &[(PostConfig, FileManifest)],
        make_editor: F,
    ) -> Vec<OutputReport>
    where
        E: LinkEditor,
        F: Fn(&PostConfig) -> E + Sync,
    {
        outputs
            .par_iter()
            .map(|(config, manifest)| {
                let editor = make_editor(config);
                PostProcessor::new(config.clone()).run(manifest, &editor)
            })
            .collect()
    }
}

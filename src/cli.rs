// src/cli.rs
//! Command-line interface definitions
//!
//! - `run` - post-process one or more package outputs and print their reports
//! - `resolve` - show how a single dependency reference resolves
//! - `check-version` - compare a declared version with installed dist-info

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "postbuild")]
#[command(version)]
#[command(about = "Relocate and validate package build prefixes", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Post-process package outputs (one --config per output)
    Run {
        /// Output configuration (TOML); repeat for several outputs
        #[arg(short, long = "config", required = true)]
        configs: Vec<PathBuf>,

        /// File manifest per output, in --config order; scans the prefix if omitted
        #[arg(short, long = "manifest")]
        manifests: Vec<PathBuf>,

        /// Link editor timeout in seconds, overriding each output's configuration
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Resolve one dependency reference against a prefix
    Resolve {
        /// Reference as recorded in the binary (e.g. libz.so.1, @rpath/libz.dylib)
        reference: String,

        /// Install prefix
        #[arg(short, long)]
        prefix: PathBuf,

        /// File manifest; scans the prefix if omitted
        #[arg(short, long)]
        manifest: Option<PathBuf>,

        /// Separate build (toolchain) prefix
        #[arg(long)]
        build_prefix: Option<PathBuf>,

        /// Force the reference to this manifest entry
        #[arg(long = "override")]
        explicit: Option<PathBuf>,
    },

    /// Check a declared version against installed dist-info metadata
    CheckVersion {
        /// Distribution name
        name: String,

        /// Declared version
        version: String,

        /// File manifest listing installed files
        #[arg(short, long)]
        manifest: PathBuf,
    },
}

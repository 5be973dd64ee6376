// src/lib.rs

//! Post-build relocation and validation for binary packages
//!
//! After a package is built and installed into a temporary prefix, this
//! crate makes the tree portable and checks that nothing in it breaks once
//! the prefix moves to its real install location.
//!
//! # Architecture
//!
//! - Resolution: dependency references are mapped to manifest entries
//!   ([`resolve`])
//! - Relocation: library search paths and identities are rewritten
//!   relative to each binary through an external link editor ([`relocate`])
//! - Checks: hardlinks, shebangs, symlinks and package metadata
//!   ([`checks`])
//! - Orchestration: per-output stage chain with a structured report
//!   ([`post`], [`report`])

pub mod checks;
pub mod cli;
pub mod config;
mod error;
pub mod hash;
pub mod manifest;
pub mod post;
pub mod relocate;
pub mod report;
pub mod resolve;

pub use config::PostConfig;
pub use error::{Error, Result};
pub use hash::{Hash, HashAlgorithm, Hasher};
pub use manifest::FileManifest;
pub use post::{PostProcessor, PostStage, StageChain, StageContext};
pub use relocate::{
    BinaryFormat, LinkEditor, RelocationPlanner, RelocationSession, RelocationTargetForm,
    RewriteOp, SystemLinkEditor,
};
pub use report::{Finding, FindingKind, OutputReport};
pub use resolve::{PathResolver, ResolvedDependency};

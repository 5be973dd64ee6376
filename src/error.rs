// src/error.rs

//! Error types for post-build relocation and validation
//!
//! Every fatal condition carries the offending path(s) so a failing build
//! can be diagnosed from the message alone.

use crate::report::FindingKind;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while relocating or validating a package output
#[derive(Error, Debug)]
pub enum Error {
    /// A reference expected to resolve inside the prefix does not
    #[error("Could not find '{reference}' in prefix {}", .prefix.display())]
    NotFound { reference: String, prefix: PathBuf },

    /// Several physically distinct files share the referenced name
    #[error("Found multiple instances of '{reference}': {candidates:?}")]
    AmbiguousDependency {
        reference: String,
        candidates: Vec<String>,
    },

    /// A reference points into the build prefix but has no host-prefix counterpart
    #[error(
        "Compiler runtime library in build prefix not found in host prefix: '{reference}' (expected {})",
        .expected.display()
    )]
    BuildPrefixLeak { reference: String, expected: PathBuf },

    /// Symlinks whose targets disappear with the build area
    #[error("Found symlinks to paths that may not exist after the build is completed:\n{}", format_links(.0))]
    DanglingSymlinks(Vec<(PathBuf, PathBuf)>),

    /// The external link editor failed or timed out on one binary
    #[error("Link editor failed on {}: {reason}", .path.display())]
    LinkEditor { path: PathBuf, reason: String },

    /// A required external tool is not installed
    #[error("Required tool '{0}' not found in PATH")]
    ToolNotFound(String),

    /// Declared and installed package versions disagree
    #[error(
        "Version mismatch for '{name}': recipe declares {expected} but {} contains {found}",
        .path.display()
    )]
    MetadataMismatch {
        name: String,
        expected: String,
        found: String,
        path: PathBuf,
    },

    /// The file manifest is malformed
    #[error("Invalid file manifest: {0}")]
    InvalidManifest(String),

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(String),

    /// A binary could not be parsed
    #[error("Failed to parse binary {}: {reason}", .path.display())]
    Binary { path: PathBuf, reason: String },

    /// I/O failure on a specific file
    #[error("I/O error on {}: {source}", .path.display())]
    File {
        path: PathBuf,
        source: std::io::Error,
    },

    /// I/O error not tied to one file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Classify this error into the reporting taxonomy
    pub fn kind(&self) -> FindingKind {
        match self {
            Self::NotFound { .. } | Self::BuildPrefixLeak { .. } => FindingKind::NotFound,
            Self::AmbiguousDependency { .. } => FindingKind::AmbiguousDependency,
            Self::DanglingSymlinks(_) => FindingKind::DanglingSymlink,
            Self::LinkEditor { .. } | Self::ToolNotFound(_) | Self::Binary { .. } => {
                FindingKind::LinkEditorFailure
            }
            Self::MetadataMismatch { .. } => FindingKind::MetadataMismatch,
            Self::InvalidManifest(_)
            | Self::Config(_)
            | Self::File { .. }
            | Self::Io(_)
            | Self::Json(_)
            | Self::Toml(_) => FindingKind::Internal,
        }
    }

    /// Paths named by this error, in the order they appear in the message
    pub fn paths(&self) -> Vec<PathBuf> {
        match self {
            Self::NotFound { reference, .. } => vec![PathBuf::from(reference)],
            Self::AmbiguousDependency { candidates, .. } => {
                candidates.iter().map(PathBuf::from).collect()
            }
            Self::BuildPrefixLeak { expected, .. } => vec![expected.clone()],
            Self::DanglingSymlinks(links) => links.iter().map(|(link, _)| link.clone()).collect(),
            Self::LinkEditor { path, .. }
            | Self::Binary { path, .. }
            | Self::MetadataMismatch { path, .. }
            | Self::File { path, .. } => vec![path.clone()],
            _ => Vec::new(),
        }
    }
}

/// `map_err` adapter that records which file an I/O error concerns
pub(crate) fn io_at(path: &Path) -> impl FnOnce(std::io::Error) -> Error + '_ {
    move |source| Error::File {
        path: path.to_path_buf(),
        source,
    }
}

fn format_links(links: &[(PathBuf, PathBuf)]) -> String {
    links
        .iter()
        .map(|(link, target)| format!("  {} → {}", link.display(), target.display()))
        .collect::<Vec<_>>()
        .join("\n")
}

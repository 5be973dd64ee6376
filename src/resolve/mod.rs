// src/resolve/mod.rs

//! Dependency reference resolution
//!
//! Maps a raw reference recorded inside a binary or script to a concrete
//! entry of the package's file manifest. Evaluation order:
//!
//! 1. An explicit override for the exact reference string always wins
//! 2. `@rpath/...` is left alone; self-relative tokens (`$ORIGIN`,
//!    `@loader_path`, `@executable_path`) are stripped and only the final
//!    component of the suffix is matched
//! 3. Absolute paths under the prefix must name a manifest entry
//! 4. Absolute paths under a separate build prefix must have a counterpart
//!    under the host prefix
//! 5. Other absolute paths are external (system) dependencies
//! 6. Bare and relative names are matched by file name; several matches are
//!    only accepted when their contents are identical

mod reference;

pub use reference::{basename, DependencyReference, RuntimeToken};

use crate::error::{io_at, Error, Result};
use crate::hash::{hash_file, HashAlgorithm};
use crate::manifest::{normalize_entry, normalize_lexically, FileManifest};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Outcome of resolving one reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedDependency {
    /// Names a manifest entry (prefix-relative)
    Internal(PathBuf),
    /// Outside the package; left untouched
    External,
    /// Could not be classified; left untouched with a notice
    Unresolved,
}

impl ResolvedDependency {
    pub fn internal(&self) -> Option<&Path> {
        match self {
            Self::Internal(path) => Some(path),
            _ => None,
        }
    }
}

/// Resolves references against one prefix and manifest
#[derive(Debug, Clone, Copy)]
pub struct PathResolver<'a> {
    prefix: &'a Path,
    manifest: &'a FileManifest,
    build_prefix: Option<&'a Path>,
    overrides: Option<&'a BTreeMap<String, PathBuf>>,
}

impl<'a> PathResolver<'a> {
    pub fn new(prefix: &'a Path, manifest: &'a FileManifest) -> Self {
        Self {
            prefix,
            manifest,
            build_prefix: None,
            overrides: None,
        }
    }

    /// Also check references into a separate build (toolchain) prefix
    pub fn with_build_prefix(mut self, build_prefix: Option<&'a Path>) -> Self {
        self.build_prefix = build_prefix.filter(|p| *p != self.prefix);
        self
    }

    /// Use a reference -> manifest path override table
    pub fn with_overrides(mut self, overrides: &'a BTreeMap<String, PathBuf>) -> Self {
        self.overrides = Some(overrides);
        self
    }

    pub fn prefix(&self) -> &Path {
        self.prefix
    }

    pub fn manifest(&self) -> &FileManifest {
        self.manifest
    }

    /// Resolve a reference, consulting the configured override table
    pub fn resolve(&self, reference: &str) -> Result<ResolvedDependency> {
        let explicit = self
            .overrides
            .and_then(|table| table.get(reference))
            .map(PathBuf::as_path);
        self.resolve_with(reference, explicit)
    }

    /// Resolve a reference with an optional caller-forced manifest path
    pub fn resolve_with(
        &self,
        reference: &str,
        explicit: Option<&Path>,
    ) -> Result<ResolvedDependency> {
        if let Some(path) = explicit {
            let entry = normalize_entry(path)?;
            if !self.manifest.contains(&entry) {
                warn!(
                    "Override for '{}' names {} which is not in the manifest",
                    reference,
                    entry.display()
                );
            }
            return Ok(ResolvedDependency::Internal(entry));
        }

        match DependencyReference::parse(reference) {
            DependencyReference::Token(token, suffix) => {
                if !token.is_self_relative() {
                    debug!("'{}' resolves through the search path, leaving as is", reference);
                    return Ok(ResolvedDependency::External);
                }
                if suffix.is_empty() {
                    info!("Don't know how to find '{}', skipping", reference);
                    return Ok(ResolvedDependency::Unresolved);
                }
                self.find_by_name(reference, basename(suffix), false)
            }
            DependencyReference::Absolute(path) => self.resolve_absolute(reference, path),
            DependencyReference::Bare(name) => self.find_by_name(reference, basename(name), false),
            DependencyReference::Relative(path) => {
                let entry = normalize_lexically(path);
                if self.manifest.contains(&entry) {
                    return Ok(ResolvedDependency::Internal(entry));
                }
                self.find_by_name(reference, basename(reference), true)
            }
        }
    }

    fn resolve_absolute(&self, reference: &str, path: &Path) -> Result<ResolvedDependency> {
        let path = normalize_lexically(path);

        if let Ok(relative) = path.strip_prefix(self.prefix) {
            return self.lookup_in_prefix(reference, relative);
        }

        if let Some(build_prefix) = self.build_prefix
            && let Ok(relative) = path.strip_prefix(build_prefix)
        {
            let expected = self.prefix.join(relative);
            if !expected.exists() {
                return Err(Error::BuildPrefixLeak {
                    reference: reference.to_string(),
                    expected,
                });
            }
            debug!(
                "Mapped build-prefix reference '{}' to {}",
                reference,
                expected.display()
            );
            return self.lookup_in_prefix(reference, relative);
        }

        Ok(ResolvedDependency::External)
    }

    fn lookup_in_prefix(&self, reference: &str, relative: &Path) -> Result<ResolvedDependency> {
        if self.manifest.contains(relative) {
            Ok(ResolvedDependency::Internal(relative.to_path_buf()))
        } else {
            Err(Error::NotFound {
                reference: reference.to_string(),
                prefix: self.prefix.to_path_buf(),
            })
        }
    }

    fn find_by_name(
        &self,
        reference: &str,
        name: &str,
        has_directories: bool,
    ) -> Result<ResolvedDependency> {
        let matches = self.manifest.by_file_name(name);

        match matches.as_slice() {
            [] if has_directories => {
                info!("Don't know how to find '{}', skipping", reference);
                Ok(ResolvedDependency::Unresolved)
            }
            [] => Err(Error::NotFound {
                reference: reference.to_string(),
                prefix: self.prefix.to_path_buf(),
            }),
            [only] => Ok(ResolvedDependency::Internal((*only).clone())),
            [.., last] => {
                let candidates: Vec<String> = matches
                    .iter()
                    .map(|m| m.to_string_lossy().into_owned())
                    .collect();

                if !self.all_identical(&matches)? {
                    return Err(Error::AmbiguousDependency {
                        reference: name.to_string(),
                        candidates,
                    });
                }

                let listed: Vec<&String> = candidates.iter().rev().collect();
                info!(
                    "Found multiple instances of '{}': {:?}. Choosing the first one.",
                    name, listed
                );
                Ok(ResolvedDependency::Internal((*last).clone()))
            }
        }
    }

    /// Compare candidate files by content, not by path
    fn all_identical(&self, candidates: &[&PathBuf]) -> Result<bool> {
        let mut first = None;
        for candidate in candidates {
            let path = self.prefix.join(candidate);
            let digest = hash_file(HashAlgorithm::Sha256, &path).map_err(io_at(&path))?;
            match &first {
                None => first = Some(digest),
                Some(expected) if *expected != digest => return Ok(false),
                Some(_) => {}
            }
        }
        Ok(true)
    }
}

/// Resolve one reference without building a resolver first
pub fn resolve(
    reference: &str,
    prefix: &Path,
    manifest: &FileManifest,
    explicit_override: Option<&Path>,
) -> Result<ResolvedDependency> {
    PathResolver::new(prefix, manifest).resolve_with(reference, explicit_override)
}

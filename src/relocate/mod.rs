// src/relocate/mod.rs

//! Relocation planning for shared libraries and executables
//!
//! For each binary in the manifest the planner resolves every declared
//! dependency, then derives the rewrites that make the binary find its
//! in-package dependencies relative to its own location:
//!
//! - prefix-absolute search path entries become token-relative
//!   (`$ORIGIN/..` for ELF, `@loader_path/..` for Mach-O)
//! - every directory holding an internal dependency is added to the search path
//! - internal dependency references that would not load from the installed
//!   location are replaced by search-path lookups
//! - a shared library's self-identity is made location independent
//!
//! System search path entries are preserved verbatim. Actual editing is done
//! through a [`LinkEditor`].

mod editor;
mod inspect;
mod install_name;
mod patchelf;

pub use editor::{LinkEditor, SystemLinkEditor};
pub use inspect::{detect_format, read_link_info, BinaryFormat, LinkInfo};
pub use install_name::InstallNameToolEditor;
pub use patchelf::PatchelfEditor;

use crate::error::{io_at, Error, Result};
use crate::manifest::normalize_lexically;
use crate::report::{Finding, FindingKind};
use crate::resolve::{basename, DependencyReference, PathResolver, ResolvedDependency, RuntimeToken};
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// One edit to a binary's link table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewriteOp {
    /// Replace the whole runtime search path
    SetSearchPaths(Vec<String>),
    /// Replace the shared-library self-identity
    SetSelfIdentity(String),
    /// Replace one declared dependency reference
    ChangeDependency { old: String, new: String },
}

/// How a relocated reference is spelled for a given binary format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelocationTargetForm {
    /// `$ORIGIN`-relative search paths, bare dependency names (ELF)
    SelfRelative,
    /// `@loader_path`-relative search paths, `@rpath/` dependencies (Mach-O)
    LoaderRelative,
}

impl RelocationTargetForm {
    pub const fn for_format(format: BinaryFormat) -> Self {
        match format {
            BinaryFormat::Elf => Self::SelfRelative,
            BinaryFormat::MachO => Self::LoaderRelative,
        }
    }

    pub const fn token(&self) -> RuntimeToken {
        match self {
            Self::SelfRelative => RuntimeToken::Origin,
            Self::LoaderRelative => RuntimeToken::LoaderPath,
        }
    }

    /// Search path entry for a directory `relative` to the binary's own
    pub fn search_entry(&self, relative: &Path) -> String {
        let token = self.token().as_str();
        if relative.as_os_str().is_empty() {
            token.to_string()
        } else {
            format!("{}/{}", token, relative.display())
        }
    }

    /// Dependency reference that is found through the search path
    pub fn dependency_reference(&self, name: &str) -> String {
        match self {
            Self::SelfRelative => name.to_string(),
            Self::LoaderRelative => format!("@rpath/{}", name),
        }
    }

    /// Whether an internal dependency `reference` must be replaced by a
    /// search-path lookup. ELF only needs prefix-absolute references
    /// rewritten; dyld resolves bare and relative install names against the
    /// working directory, so on Mach-O anything but `@rpath/<name>` or a
    /// `@loader_path` form is rewritten.
    pub fn rewrites_dependency(&self, reference: &str, prefix: &Path) -> bool {
        match (self, DependencyReference::parse(reference)) {
            (_, DependencyReference::Absolute(path)) => path.starts_with(prefix),
            (Self::SelfRelative, _) => false,
            (Self::LoaderRelative, DependencyReference::Token(RuntimeToken::LoaderPath, _)) => {
                false
            }
            (Self::LoaderRelative, _) => {
                self.dependency_reference(basename(reference)) != reference
            }
        }
    }

    /// Location independent form of a self-identity, or `None` if the
    /// current one is already fine
    pub fn identity_for(&self, current: &str) -> Option<String> {
        let name = basename(current);
        let wanted = match self {
            Self::SelfRelative if current.contains('/') => name.to_string(),
            Self::SelfRelative => return None,
            Self::LoaderRelative if Path::new(current).is_absolute() => {
                self.dependency_reference(name)
            }
            Self::LoaderRelative => return None,
        };
        (wanted != current && !name.is_empty()).then_some(wanted)
    }
}

/// Link table of one binary, as seen through the editor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryArtifact {
    /// Location relative to the prefix
    pub path: PathBuf,
    pub format: BinaryFormat,
    pub dependencies: Vec<String>,
    pub search_paths: Vec<String>,
    pub identity: Option<String>,
}

impl BinaryArtifact {
    /// Read the link table of the binary at `absolute`
    pub fn inspect(
        editor: &dyn LinkEditor,
        absolute: &Path,
        path: PathBuf,
        format: BinaryFormat,
    ) -> Result<Self> {
        Ok(Self {
            path,
            format,
            dependencies: editor.list_dependencies(absolute)?,
            search_paths: editor.search_paths(absolute)?,
            identity: editor.self_identity(absolute)?,
        })
    }

    fn directory(&self) -> &Path {
        self.path.parent().unwrap_or(Path::new(""))
    }
}

/// Binaries already relocated during one invocation
///
/// Keyed by canonical path so aliases (symlinks, repeated manifest entries
/// across variants) are rewritten once.
#[derive(Debug, Default)]
pub struct RelocationSession {
    processed: HashSet<PathBuf>,
}

impl RelocationSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a binary; returns false if it was already processed
    pub fn mark(&mut self, canonical: PathBuf) -> bool {
        self.processed.insert(canonical)
    }

    pub fn is_processed(&self, canonical: &Path) -> bool {
        self.processed.contains(canonical)
    }

    pub fn len(&self) -> usize {
        self.processed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processed.is_empty()
    }
}

/// What happened to one binary
#[derive(Debug, Default)]
pub struct RelocationOutcome {
    /// Binary location relative to the prefix
    pub path: PathBuf,
    /// Rewrites applied (empty when nothing needed changing or on error)
    pub ops: Vec<RewriteOp>,
    /// Non-fatal notices
    pub warnings: Vec<Finding>,
    /// Fatal resolution errors; no rewrite is applied when non-empty
    pub errors: Vec<Error>,
}

impl RelocationOutcome {
    pub fn rewritten(&self) -> bool {
        !self.ops.is_empty()
    }
}

/// Plans and applies relocation for binaries of one package output
#[derive(Debug, Clone, Copy)]
pub struct RelocationPlanner<'a> {
    resolver: PathResolver<'a>,
    rewrite_identity: bool,
}

impl<'a> RelocationPlanner<'a> {
    pub fn new(resolver: PathResolver<'a>) -> Self {
        Self {
            resolver,
            rewrite_identity: true,
        }
    }

    pub fn with_identity_rewrite(mut self, enabled: bool) -> Self {
        self.rewrite_identity = enabled;
        self
    }

    fn prefix(&self) -> &Path {
        self.resolver.prefix()
    }

    /// Resolve every declared dependency of a binary
    ///
    /// Resolution errors are collected rather than returned early so one
    /// failing binary reports all of its missing dependencies at once.
    pub fn resolve_dependencies(
        &self,
        artifact: &BinaryArtifact,
    ) -> (Vec<(String, ResolvedDependency)>, Vec<Error>) {
        let mut resolved = Vec::new();
        let mut errors = Vec::new();

        for reference in &artifact.dependencies {
            match self.resolver.resolve(reference) {
                Ok(resolution) => resolved.push((reference.clone(), resolution)),
                Err(Error::NotFound { .. })
                    if artifact.format == BinaryFormat::Elf
                        && matches!(
                            DependencyReference::parse(reference),
                            DependencyReference::Bare(_)
                        ) =>
                {
                    // Bare ELF names not shipped here are found by the system loader
                    debug!("'{}' is not in the package, assuming a system library", reference);
                    resolved.push((reference.clone(), ResolvedDependency::External));
                }
                Err(e) => errors.push(e),
            }
        }

        (resolved, errors)
    }

    /// Compute the rewrites for one binary given its resolved dependencies
    pub fn plan(
        &self,
        artifact: &BinaryArtifact,
        resolved: &[(String, ResolvedDependency)],
    ) -> Vec<RewriteOp> {
        let form = RelocationTargetForm::for_format(artifact.format);
        let binary_dir = self.prefix().join(artifact.directory());
        let mut ops = Vec::new();

        let mut search_paths: Vec<String> = Vec::new();
        for entry in &artifact.search_paths {
            let rewritten = self
                .relative_search_entry(form, entry, &binary_dir)
                .unwrap_or_else(|| entry.clone());
            push_unique(&mut search_paths, rewritten);
        }

        for (reference, resolution) in resolved {
            let ResolvedDependency::Internal(target) = resolution else {
                continue;
            };

            let target_dir = self.prefix().join(target.parent().unwrap_or(Path::new("")));
            if let Some(relative) = pathdiff::diff_paths(&target_dir, &binary_dir) {
                push_unique(&mut search_paths, form.search_entry(&relative));
            }

            if form.rewrites_dependency(reference, self.prefix()) {
                ops.push(RewriteOp::ChangeDependency {
                    old: reference.clone(),
                    new: form.dependency_reference(basename(reference)),
                });
            }
        }

        if search_paths != artifact.search_paths {
            ops.insert(0, RewriteOp::SetSearchPaths(search_paths));
        }

        if self.rewrite_identity
            && let Some(identity) = &artifact.identity
            && let Some(wanted) = form.identity_for(identity)
        {
            ops.push(RewriteOp::SetSelfIdentity(wanted));
        }

        ops
    }

    /// Token-relative spelling of a prefix-absolute search path entry
    fn relative_search_entry(
        &self,
        form: RelocationTargetForm,
        entry: &str,
        binary_dir: &Path,
    ) -> Option<String> {
        let DependencyReference::Absolute(path) = DependencyReference::parse(entry) else {
            return None;
        };
        let path = normalize_lexically(path);
        if !path.starts_with(self.prefix()) {
            return None;
        }
        pathdiff::diff_paths(&path, binary_dir).map(|relative| form.search_entry(&relative))
    }

    /// Relocate one manifest entry
    ///
    /// Returns `Ok(None)` when the entry is not a binary, lives outside the
    /// prefix once symlinks are resolved, or was already handled in this
    /// session. Link editor failures are returned as `Err` and concern this
    /// binary only.
    pub fn relocate(
        &self,
        entry: &Path,
        editor: &dyn LinkEditor,
        session: &mut RelocationSession,
    ) -> Result<Option<RelocationOutcome>> {
        let absolute = self.prefix().join(entry);
        let Ok(metadata) = fs::symlink_metadata(&absolute) else {
            return Ok(None);
        };
        let canonical = match fs::canonicalize(&absolute) {
            Ok(canonical) => canonical,
            // Dangling links are the symlink check's concern
            Err(e) if metadata.file_type().is_symlink() && e.kind() == io::ErrorKind::NotFound => {
                debug!("{} is a dangling symlink, skipping", entry.display());
                return Ok(None);
            }
            Err(e) => return Err(io_at(&absolute)(e)),
        };
        let canonical_prefix = fs::canonicalize(self.prefix()).map_err(io_at(self.prefix()))?;

        let Ok(location) = canonical.strip_prefix(&canonical_prefix) else {
            debug!("{} points outside the prefix, skipping", entry.display());
            return Ok(None);
        };
        let location = location.to_path_buf();

        let Some(format) = detect_format(&canonical)? else {
            return Ok(None);
        };

        if !session.mark(canonical.clone()) {
            debug!("{} was already relocated, skipping", location.display());
            return Ok(None);
        }

        let artifact = BinaryArtifact::inspect(editor, &canonical, location.clone(), format)?;
        let (resolved, errors) = self.resolve_dependencies(&artifact);

        let mut outcome = RelocationOutcome {
            path: location,
            ..RelocationOutcome::default()
        };

        for (reference, resolution) in &resolved {
            if *resolution == ResolvedDependency::Unresolved {
                outcome.warnings.push(Finding::new(
                    FindingKind::UnresolvedSkip,
                    format!("Don't know how to find '{}', skipping", reference),
                    vec![outcome.path.clone()],
                ));
            }
        }

        if !errors.is_empty() {
            outcome.errors = errors;
            return Ok(Some(outcome));
        }

        let ops = self.plan(&artifact, &resolved);
        if !ops.is_empty() {
            info!(
                "Relocating {} ({}): {} change(s)",
                outcome.path.display(),
                format.as_str(),
                ops.len()
            );
            editor.apply(&canonical, &ops)?;
        }
        outcome.ops = ops;

        Ok(Some(outcome))
    }
}

fn push_unique(list: &mut Vec<String>, value: String) {
    if !list.contains(&value) {
        list.push(value);
    }
}

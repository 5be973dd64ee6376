// src/checks/symlinks.rs

//! Symlink validation
//!
//! A symlink that points into the transient build area (but not into the
//! prefix itself) is dangling as soon as the build directory is removed.
//! All offenders are collected and reported in one error. Absolute links
//! that stay inside the prefix are rewritten as relative links so they keep
//! working after the prefix moves.

use crate::error::{io_at, Error, Result};
use crate::manifest::normalize_lexically;
use std::fs;
use std::os::unix::fs as unix_fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// A symlink under the prefix and the absolute path it points to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymlinkEntry {
    /// Link location relative to the prefix
    pub link: PathBuf,
    /// Lexically resolved absolute target
    pub target: PathBuf,
}

impl SymlinkEntry {
    /// Read the link at `link` (prefix-relative); `None` if it is not a symlink
    pub fn read(prefix: &Path, link: &Path) -> Result<Option<Self>> {
        let absolute = prefix.join(link);
        let Ok(metadata) = fs::symlink_metadata(&absolute) else {
            return Ok(None);
        };
        if !metadata.file_type().is_symlink() {
            return Ok(None);
        }

        let raw = fs::read_link(&absolute).map_err(io_at(&absolute))?;
        let target = if raw.is_absolute() {
            normalize_lexically(&raw)
        } else {
            let parent = absolute.parent().unwrap_or(prefix);
            normalize_lexically(&parent.join(raw))
        };

        Ok(Some(Self {
            link: link.to_path_buf(),
            target,
        }))
    }
}

/// Read every symlink among `entries`, in the order given
pub fn collect_symlinks<'a>(
    prefix: &Path,
    entries: impl IntoIterator<Item = &'a PathBuf>,
) -> Result<Vec<SymlinkEntry>> {
    let mut links = Vec::new();
    for entry in entries {
        if let Some(link) = SymlinkEntry::read(prefix, entry)? {
            links.push(link);
        }
    }
    Ok(links)
}

/// Links whose targets vanish with the build area, in encounter order
pub fn validate(symlinks: &[SymlinkEntry], prefix: &Path, build_root: &Path) -> Vec<SymlinkEntry> {
    symlinks
        .iter()
        .filter(|entry| entry.target.starts_with(build_root) && !entry.target.starts_with(prefix))
        .cloned()
        .collect()
}

/// Fail with every dangling link if any of `links` (prefix-relative) point
/// into the build area outside the prefix
pub fn check_symlinks<P: AsRef<Path>>(links: &[P], prefix: &Path, build_root: &Path) -> Result<()> {
    let mut entries = Vec::new();
    for link in links {
        if let Some(entry) = SymlinkEntry::read(prefix, link.as_ref())? {
            entries.push(entry);
        }
    }

    let violations = validate(&entries, prefix, build_root);
    if violations.is_empty() {
        return Ok(());
    }
    Err(Error::DanglingSymlinks(
        violations.into_iter().map(|v| (v.link, v.target)).collect(),
    ))
}

/// Rewrite an absolute link that stays inside the prefix as a relative one
///
/// Returns true if the link was rewritten.
pub fn make_relative(entry: &SymlinkEntry, prefix: &Path) -> Result<bool> {
    let absolute = prefix.join(&entry.link);
    let raw = fs::read_link(&absolute).map_err(io_at(&absolute))?;
    if !raw.is_absolute() || !entry.target.starts_with(prefix) {
        return Ok(false);
    }

    let parent = absolute.parent().unwrap_or(prefix);
    let Some(relative) = pathdiff::diff_paths(&entry.target, parent) else {
        return Ok(false);
    };

    info!(
        "Making absolute symlink relative ({} -> {} :-> {})",
        entry.link.display(),
        raw.display(),
        relative.display()
    );
    fs::remove_file(&absolute).map_err(io_at(&absolute))?;
    unix_fs::symlink(&relative, &absolute).map_err(io_at(&absolute))?;
    Ok(true)
}

// src/manifest.rs

//! File manifest of a package output
//!
//! The manifest is the authoritative, ordered list of prefix-relative paths
//! that ship in the package. A file present under the prefix but absent from
//! the manifest is not part of the package.

use crate::error::{io_at, Error, Result};
use std::collections::HashSet;
use std::fs;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

/// Ordered, duplicate-free list of prefix-relative paths
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileManifest {
    entries: Vec<PathBuf>,
}

impl FileManifest {
    /// Build a manifest, normalising each entry and rejecting duplicates
    pub fn new<I, P>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut seen = HashSet::new();
        let mut normalized = Vec::new();

        for entry in entries {
            let path = normalize_entry(entry.as_ref())?;
            if !seen.insert(path.clone()) {
                return Err(Error::InvalidManifest(format!(
                    "duplicate entry '{}'",
                    path.display()
                )));
            }
            normalized.push(path);
        }

        Ok(Self {
            entries: normalized,
        })
    }

    /// Parse a newline-separated manifest (blank lines and `#` comments ignored)
    pub fn parse(content: &str) -> Result<Self> {
        Self::new(
            content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#')),
        )
    }

    /// Load a newline-separated manifest file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(io_at(path))?;
        Self::parse(&content)
    }

    /// Build a manifest from every non-directory entry under `prefix`
    ///
    /// Entries are sorted so the result does not depend on directory order.
    pub fn scan(prefix: &Path) -> Result<Self> {
        let mut entries = Vec::new();
        for entry in WalkDir::new(prefix).follow_links(false) {
            let entry = entry.map_err(|e| {
                Error::InvalidManifest(format!("failed to scan {}: {}", prefix.display(), e))
            })?;
            if entry.file_type().is_dir() {
                continue;
            }
            if let Ok(relative) = entry.path().strip_prefix(prefix) {
                entries.push(relative.to_path_buf());
            }
        }
        entries.sort();
        Self::new(entries)
    }

    pub fn entries(&self) -> &[PathBuf] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &PathBuf> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `path` (prefix-relative) is an entry
    pub fn contains(&self, path: &Path) -> bool {
        self.entries.iter().any(|e| e == path)
    }

    /// Entries whose final component equals `name`, in manifest order
    pub fn by_file_name(&self, name: &str) -> Vec<&PathBuf> {
        self.entries
            .iter()
            .filter(|e| e.file_name().is_some_and(|n| n == name))
            .collect()
    }
}

impl<'a> IntoIterator for &'a FileManifest {
    type Item = &'a PathBuf;
    type IntoIter = std::slice::Iter<'a, PathBuf>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Normalise a manifest entry to a clean relative path
///
/// Leading slashes and `.` components are dropped; `..` is rejected since a
/// manifest entry can never escape the prefix.
pub fn normalize_entry(path: &Path) -> Result<PathBuf> {
    let mut normalized = PathBuf::new();

    for component in path.components() {
        match component {
            Component::Normal(c) => normalized.push(c),
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
            Component::ParentDir => {
                return Err(Error::InvalidManifest(format!(
                    "entry escapes the prefix: '{}'",
                    path.display()
                )));
            }
        }
    }

    if normalized.as_os_str().is_empty() {
        return Err(Error::InvalidManifest(format!(
            "empty entry after normalization: '{}'",
            path.display()
        )));
    }

    Ok(normalized)
}

/// Lexically normalise a path, folding `.` and `..` without touching the filesystem
///
/// Used for symlink targets that may not exist.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

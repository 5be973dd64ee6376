// src/checks/hardlinks.rs

//! Breaking shared inodes between packaged files
//!
//! A hardlink inside the prefix means two manifest entries (possibly in
//! different package outputs) share bytes on disk. Rewriting one of them
//! later would silently change the other, so every extra link is replaced by
//! an independent copy before any other stage runs.

use crate::error::{io_at, Error, Result};
use crate::hash::{hash_file, HashAlgorithm};
use std::fs::{self, File};
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};
use walkdir::WalkDir;

/// Replace every other hardlink to `path` found under `scan_root` with an
/// independent copy
///
/// If `path` still shares its inode afterwards (links outside `scan_root`),
/// `path` itself is copied too. Returns the number of files replaced; a
/// file with a single link is left alone.
pub fn break_hardlinks(path: &Path, scan_root: &Path) -> Result<usize> {
    let metadata = fs::symlink_metadata(path).map_err(io_at(path))?;
    if !metadata.is_file() || metadata.nlink() <= 1 {
        return Ok(0);
    }

    let (dev, ino) = (metadata.dev(), metadata.ino());
    let mut replaced = 0;

    for other in linked_paths(scan_root, dev, ino)? {
        if other == path {
            continue;
        }
        make_independent_copy(&other)?;
        replaced += 1;
    }

    if fs::symlink_metadata(path).map_err(io_at(path))?.nlink() > 1 {
        make_independent_copy(path)?;
        replaced += 1;
    }

    debug!(
        "Broke {} hardlink(s) to {}",
        replaced,
        path.display()
    );
    Ok(replaced)
}

/// Regular files under `root` on the given device and inode
fn linked_paths(root: &Path, dev: u64, ino: u64) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(|e| walk_error(root, e))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let metadata = entry.metadata().map_err(|e| walk_error(root, e))?;
        if metadata.dev() == dev && metadata.ino() == ino {
            found.push(entry.into_path());
        }
    }
    Ok(found)
}

fn walk_error(root: &Path, err: walkdir::Error) -> Error {
    Error::File {
        path: err.path().unwrap_or(root).to_path_buf(),
        source: err.into(),
    }
}

/// Swap `path` for a fresh file with the same content and mode
///
/// The copy is written next to the original and renamed over it, so the
/// path never disappears.
pub fn make_independent_copy(path: &Path) -> Result<()> {
    let parent = path.parent().unwrap_or(Path::new("."));
    let permissions = fs::metadata(path).map_err(io_at(path))?.permissions();

    let mut temp = NamedTempFile::new_in(parent).map_err(io_at(parent))?;
    let mut original = File::open(path).map_err(io_at(path))?;
    io::copy(&mut original, temp.as_file_mut()).map_err(io_at(path))?;
    temp.as_file().sync_all().map_err(io_at(temp.path()))?;

    let expected = hash_file(HashAlgorithm::Xxh128, path).map_err(io_at(path))?;
    let copied = hash_file(HashAlgorithm::Xxh128, temp.path()).map_err(io_at(temp.path()))?;
    if expected != copied {
        return Err(io_at(path)(io::Error::other(format!(
            "copy does not match the original ({} != {})",
            copied, expected
        ))));
    }

    fs::set_permissions(temp.path(), permissions).map_err(io_at(temp.path()))?;
    temp.persist(path).map_err(|e| io_at(path)(e.error))?;

    info!("Replaced hardlink with a copy: {}", path.display());
    Ok(())
}

// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use postbuild::relocate::LinkInfo;
use postbuild::{FileManifest, LinkEditor, PostConfig, Result, RewriteOp};
use std::collections::HashMap;
use std::fs;
use std::os::unix::fs as unix_fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::TempDir;

/// Leading bytes that make a file look like an ELF object
pub const ELF_HEADER: &[u8] = b"\x7fELF\x02\x01\x01\x00\x00\x00\x00\x00\x00\x00\x00\x00";

/// Leading bytes that make a file look like a 64-bit Mach-O object
pub const MACHO_HEADER: &[u8] = &[0xcf, 0xfa, 0xed, 0xfe, 0x07, 0x00, 0x00, 0x01];

/// A build area with a host prefix inside it.
///
/// Layout: `<tmp>/croot/` is the build root, `<tmp>/croot/pkg/_h_env/` the prefix.
/// Paths are canonicalised so they match what the relocation engine sees.
pub struct BuildArea {
    _temp: TempDir,
    pub build_root: PathBuf,
    pub prefix: PathBuf,
}

impl BuildArea {
    pub fn new() -> Self {
        let temp = tempfile::tempdir().unwrap();
        let root = fs::canonicalize(temp.path()).unwrap();
        let build_root = root.join("croot");
        let prefix = build_root.join("pkg/_h_env");
        fs::create_dir_all(&prefix).unwrap();
        Self {
            _temp: temp,
            build_root,
            prefix,
        }
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.prefix.join(rel)
    }

    pub fn write(&self, rel: &str, content: impl AsRef<[u8]>) -> PathBuf {
        let path = self.path(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    pub fn write_elf(&self, rel: &str) -> PathBuf {
        self.write(rel, ELF_HEADER)
    }

    pub fn write_macho(&self, rel: &str) -> PathBuf {
        self.write(rel, MACHO_HEADER)
    }

    pub fn symlink(&self, rel: &str, target: impl AsRef<Path>) -> PathBuf {
        let path = self.path(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        unix_fs::symlink(target, &path).unwrap();
        path
    }

    pub fn config(&self) -> PostConfig {
        PostConfig::new(&self.prefix, &self.build_root).with_output("test-output")
    }

    pub fn manifest(&self) -> FileManifest {
        FileManifest::scan(&self.prefix).unwrap()
    }
}

/// In-memory link editor that records every edit.
#[derive(Default)]
pub struct FakeEditor {
    binaries: Mutex<HashMap<PathBuf, LinkInfo>>,
    ops: Mutex<Vec<(PathBuf, RewriteOp)>>,
    failing: Mutex<Vec<PathBuf>>,
}

impl FakeEditor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the link table of the binary at `path`
    pub fn register(&self, path: &Path, info: LinkInfo) {
        self.binaries.lock().unwrap().insert(path.to_path_buf(), info);
    }

    /// Make every edit of `path` fail
    pub fn fail_on(&self, path: &Path) {
        self.failing.lock().unwrap().push(path.to_path_buf());
    }

    pub fn ops(&self) -> Vec<(PathBuf, RewriteOp)> {
        self.ops.lock().unwrap().clone()
    }

    pub fn ops_for(&self, path: &Path) -> Vec<RewriteOp> {
        self.ops()
            .into_iter()
            .filter(|(p, _)| p == path)
            .map(|(_, op)| op)
            .collect()
    }

    pub fn info(&self, path: &Path) -> LinkInfo {
        self.binaries
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .unwrap_or_default()
    }

    fn record(&self, path: &Path, op: RewriteOp) -> Result<()> {
        if self.failing.lock().unwrap().iter().any(|p| p == path) {
            return Err(postbuild::Error::LinkEditor {
                path: path.to_path_buf(),
                reason: "simulated failure".to_string(),
            });
        }
        let mut binaries = self.binaries.lock().unwrap();
        let info = binaries.entry(path.to_path_buf()).or_default();
        match &op {
            RewriteOp::SetSearchPaths(paths) => info.search_paths = paths.clone(),
            RewriteOp::SetSelfIdentity(identity) => info.identity = Some(identity.clone()),
            RewriteOp::ChangeDependency { old, new } => {
                for dep in info.dependencies.iter_mut().filter(|d| *d == old) {
                    *dep = new.clone();
                }
            }
        }
        self.ops.lock().unwrap().push((path.to_path_buf(), op));
        Ok(())
    }
}

impl LinkEditor for FakeEditor {
    fn list_dependencies(&self, binary: &Path) -> Result<Vec<String>> {
        Ok(self.info(binary).dependencies)
    }

    fn search_paths(&self, binary: &Path) -> Result<Vec<String>> {
        Ok(self.info(binary).search_paths)
    }

    fn set_search_paths(&self, binary: &Path, paths: &[String]) -> Result<()> {
        self.record(binary, RewriteOp::SetSearchPaths(paths.to_vec()))
    }

    fn self_identity(&self, binary: &Path) -> Result<Option<String>> {
        Ok(self.info(binary).identity)
    }

    fn set_self_identity(&self, binary: &Path, identity: &str) -> Result<()> {
        self.record(binary, RewriteOp::SetSelfIdentity(identity.to_string()))
    }

    fn change_dependency(&self, binary: &Path, old: &str, new: &str) -> Result<()> {
        self.record(
            binary,
            RewriteOp::ChangeDependency {
                old: old.to_string(),
                new: new.to_string(),
            },
        )
    }
}

/// Shorthand for a link table
pub fn link_info(dependencies: &[&str], search_paths: &[&str], identity: Option<&str>) -> LinkInfo {
    LinkInfo {
        dependencies: dependencies.iter().map(|s| s.to_string()).collect(),
        search_paths: search_paths.iter().map(|s| s.to_string()).collect(),
        identity: identity.map(str::to_string),
    }
}

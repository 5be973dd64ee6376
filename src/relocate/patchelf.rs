// src/relocate/patchelf.rs

//! ELF link editing through `patchelf`

use super::editor::{run_tool, LinkEditor};
use super::inspect::read_link_info;
use crate::error::Result;
use std::ffi::OsString;
use std::path::Path;
use std::time::Duration;
use tracing::info;

const PATCHELF: &str = "patchelf";

#[derive(Debug, Clone)]
pub struct PatchelfEditor {
    timeout: Duration,
}

impl PatchelfEditor {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn run(&self, binary: &Path, mut args: Vec<OsString>) -> Result<()> {
        args.push(binary.as_os_str().to_owned());
        run_tool(PATCHELF, &args, binary, self.timeout)
    }
}

impl LinkEditor for PatchelfEditor {
    fn list_dependencies(&self, binary: &Path) -> Result<Vec<String>> {
        Ok(read_link_info(binary)?.dependencies)
    }

    fn search_paths(&self, binary: &Path) -> Result<Vec<String>> {
        Ok(read_link_info(binary)?.search_paths)
    }

    fn set_search_paths(&self, binary: &Path, paths: &[String]) -> Result<()> {
        if paths.is_empty() {
            return self.run(binary, vec!["--remove-rpath".into()]);
        }
        let joined = paths.join(":");
        info!("patchelf: file: {}\n    setting rpath to: {}", binary.display(), joined);
        // --force-rpath writes DT_RPATH, which also applies to indirect dependencies
        self.run(
            binary,
            vec!["--force-rpath".into(), "--set-rpath".into(), joined.into()],
        )
    }

    fn self_identity(&self, binary: &Path) -> Result<Option<String>> {
        Ok(read_link_info(binary)?.identity)
    }

    fn set_self_identity(&self, binary: &Path, identity: &str) -> Result<()> {
        self.run(binary, vec!["--set-soname".into(), identity.into()])
    }

    fn change_dependency(&self, binary: &Path, old: &str, new: &str) -> Result<()> {
        self.run(binary, vec!["--replace-needed".into(), old.into(), new.into()])
    }
}

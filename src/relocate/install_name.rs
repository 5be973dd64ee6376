// src/relocate/install_name.rs

//! Mach-O link editing through `install_name_tool`
//!
//! Editing load commands invalidates an existing code signature, so on hosts
//! that have `codesign` the binary is re-signed ad hoc after every change.

use super::editor::{run_tool, LinkEditor};
use super::inspect::read_link_info;
use crate::error::Result;
use std::ffi::OsString;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

const INSTALL_NAME_TOOL: &str = "install_name_tool";
const CODESIGN: &str = "codesign";

#[derive(Debug, Clone)]
pub struct InstallNameToolEditor {
    timeout: Duration,
}

impl InstallNameToolEditor {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn run(&self, binary: &Path, mut args: Vec<OsString>) -> Result<()> {
        args.push(binary.as_os_str().to_owned());
        run_tool(INSTALL_NAME_TOOL, &args, binary, self.timeout)?;
        self.resign(binary)
    }

    fn resign(&self, binary: &Path) -> Result<()> {
        if which::which(CODESIGN).is_err() {
            debug!("codesign not available, leaving {} unsigned", binary.display());
            return Ok(());
        }
        let args: Vec<OsString> = vec![
            "-f".into(),
            "-s".into(),
            "-".into(),
            binary.as_os_str().to_owned(),
        ];
        run_tool(CODESIGN, &args, binary, self.timeout)
    }
}

impl LinkEditor for InstallNameToolEditor {
    fn list_dependencies(&self, binary: &Path) -> Result<Vec<String>> {
        Ok(read_link_info(binary)?.dependencies)
    }

    fn search_paths(&self, binary: &Path) -> Result<Vec<String>> {
        Ok(read_link_info(binary)?.search_paths)
    }

    /// Mach-O keeps one LC_RPATH per entry, so the new list is expressed as
    /// deletions and additions against the current one
    fn set_search_paths(&self, binary: &Path, paths: &[String]) -> Result<()> {
        let current = self.search_paths(binary)?;
        let mut args: Vec<OsString> = Vec::new();

        for old in current.iter().filter(|p| !paths.contains(p)) {
            args.push("-delete_rpath".into());
            args.push(old.into());
        }
        for new in paths.iter().filter(|p| !current.contains(p)) {
            args.push("-add_rpath".into());
            args.push(new.into());
        }

        if args.is_empty() {
            return Ok(());
        }
        info!("install_name_tool for {}: {:?}", binary.display(), args);
        self.run(binary, args)
    }

    fn self_identity(&self, binary: &Path) -> Result<Option<String>> {
        Ok(read_link_info(binary)?.identity)
    }

    fn set_self_identity(&self, binary: &Path, identity: &str) -> Result<()> {
        self.run(binary, vec!["-id".into(), identity.into()])
    }

    fn change_dependency(&self, binary: &Path, old: &str, new: &str) -> Result<()> {
        self.run(binary, vec!["-change".into(), old.into(), new.into()])
    }
}

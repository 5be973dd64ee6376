// src/relocate/editor.rs

//! Link editor abstraction
//!
//! The engine never rewrites object files itself. Everything that touches
//! load commands or dynamic sections goes through [`LinkEditor`], backed in
//! production by `patchelf` (ELF) and `install_name_tool` (Mach-O).

use super::inspect::{detect_format, read_link_info, BinaryFormat};
use super::install_name::InstallNameToolEditor;
use super::patchelf::PatchelfEditor;
use super::RewriteOp;
use crate::error::{io_at, Error, Result};
use std::ffi::OsString;
use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};
use wait_timeout::ChildExt;

/// Capability to read and rewrite a binary's link table
///
/// All paths passed in are absolute paths to the binary on disk.
pub trait LinkEditor: Send + Sync {
    /// Declared dependencies in load order
    fn list_dependencies(&self, binary: &Path) -> Result<Vec<String>>;

    /// Current runtime search path entries
    fn search_paths(&self, binary: &Path) -> Result<Vec<String>>;

    /// Replace the runtime search path
    fn set_search_paths(&self, binary: &Path, paths: &[String]) -> Result<()>;

    /// Shared-library self-identity, if any
    fn self_identity(&self, binary: &Path) -> Result<Option<String>>;

    fn set_self_identity(&self, binary: &Path, identity: &str) -> Result<()>;

    /// Replace one declared dependency reference
    fn change_dependency(&self, binary: &Path, old: &str, new: &str) -> Result<()>;

    /// Apply a planned sequence of rewrites
    fn apply(&self, binary: &Path, ops: &[RewriteOp]) -> Result<()> {
        for op in ops {
            match op {
                RewriteOp::SetSearchPaths(paths) => self.set_search_paths(binary, paths)?,
                RewriteOp::SetSelfIdentity(identity) => self.set_self_identity(binary, identity)?,
                RewriteOp::ChangeDependency { old, new } => {
                    self.change_dependency(binary, old, new)?
                }
            }
        }
        Ok(())
    }
}

/// Dispatches to the right tool based on each binary's format
#[derive(Debug, Clone)]
pub struct SystemLinkEditor {
    elf: PatchelfEditor,
    macho: InstallNameToolEditor,
}

impl SystemLinkEditor {
    pub fn new(timeout: Duration) -> Self {
        Self {
            elf: PatchelfEditor::new(timeout),
            macho: InstallNameToolEditor::new(timeout),
        }
    }

    fn editor_for(&self, binary: &Path) -> Result<&dyn LinkEditor> {
        match detect_format(binary)? {
            Some(BinaryFormat::Elf) => Ok(&self.elf),
            Some(BinaryFormat::MachO) => Ok(&self.macho),
            None => Err(Error::Binary {
                path: binary.to_path_buf(),
                reason: "not an ELF or Mach-O file".to_string(),
            }),
        }
    }
}

impl LinkEditor for SystemLinkEditor {
    fn list_dependencies(&self, binary: &Path) -> Result<Vec<String>> {
        Ok(read_link_info(binary)?.dependencies)
    }

    fn search_paths(&self, binary: &Path) -> Result<Vec<String>> {
        Ok(read_link_info(binary)?.search_paths)
    }

    fn set_search_paths(&self, binary: &Path, paths: &[String]) -> Result<()> {
        self.editor_for(binary)?.set_search_paths(binary, paths)
    }

    fn self_identity(&self, binary: &Path) -> Result<Option<String>> {
        Ok(read_link_info(binary)?.identity)
    }

    fn set_self_identity(&self, binary: &Path, identity: &str) -> Result<()> {
        self.editor_for(binary)?.set_self_identity(binary, identity)
    }

    fn change_dependency(&self, binary: &Path, old: &str, new: &str) -> Result<()> {
        self.editor_for(binary)?.change_dependency(binary, old, new)
    }
}

/// Run an external tool on one binary, bounded by `timeout`
///
/// A non-zero exit or a timeout is a [`Error::LinkEditor`] for that binary.
pub(crate) fn run_tool(
    tool: &str,
    args: &[OsString],
    binary: &Path,
    timeout: Duration,
) -> Result<()> {
    let program = which::which(tool).map_err(|_| Error::ToolNotFound(tool.to_string()))?;

    debug!("Executing: {} {:?}", program.display(), args);

    let mut child = Command::new(&program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| Error::LinkEditor {
            path: binary.to_path_buf(),
            reason: format!("failed to spawn '{}': {}", tool, e),
        })?;

    // Drained concurrently so a chatty tool cannot fill the pipe and stall
    let stderr_reader = child.stderr.take().map(|mut stderr| {
        thread::spawn(move || {
            let mut buffer = Vec::new();
            let _ = stderr.read_to_end(&mut buffer);
            String::from_utf8_lossy(&buffer).into_owned()
        })
    });
    let collect_stderr = move || {
        stderr_reader
            .and_then(|reader| reader.join().ok())
            .unwrap_or_default()
    };

    match child.wait_timeout(timeout).map_err(io_at(binary))? {
        Some(status) => {
            let stderr = collect_stderr();

            if status.success() {
                for line in stderr.lines() {
                    warn!("[{}] {}", tool, line);
                }
                Ok(())
            } else {
                let code = status.code().unwrap_or(-1);
                Err(Error::LinkEditor {
                    path: binary.to_path_buf(),
                    reason: format!("'{}' failed with exit code {}: {}", tool, code, stderr.trim()),
                })
            }
        }
        None => {
            let _ = child.kill();
            let _ = child.wait();
            Err(Error::LinkEditor {
                path: binary.to_path_buf(),
                reason: format!("'{}' timed out after {} seconds", tool, timeout.as_secs()),
            })
        }
    }
}

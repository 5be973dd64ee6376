// src/checks/shebang.rs

//! Interpreter line rewriting for scripts
//!
//! Scripts installed during the build often start with an absolute path to
//! an interpreter inside the build prefix. That path will not exist on the
//! user's machine, so the line is rewritten to the configured interpreter,
//! to the same interpreter under the final install prefix, or failing both
//! to a `/usr/bin/env` lookup of the interpreter's name.
//!
//! The file's permission bits are restored exactly afterwards, including
//! files that started out unreadable.

use crate::error::{io_at, Result};
use crate::relocate::BinaryFormat;
use regex::Regex;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{info, warn};

/// Longest shebang line the kernel will honour, including `#!`
pub const MAX_SHEBANG_LENGTH: usize = 127;

static SHEBANG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#![ ]*(/(?:\\ |[^ \n\r\t])*)(.*)$").unwrap());

/// A parsed `#!` line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shebang<'a> {
    /// Absolute interpreter path
    pub interpreter: &'a str,
    /// Everything after the interpreter, leading whitespace included
    pub options: &'a str,
}

impl<'a> Shebang<'a> {
    /// Parse a first line (without its newline)
    pub fn parse(line: &'a str) -> Option<Self> {
        let captures = SHEBANG.captures(line)?;
        Some(Self {
            interpreter: captures.get(1)?.as_str(),
            options: captures.get(2).map_or("", |m| m.as_str()),
        })
    }

    pub fn interpreter_name(&self) -> &'a str {
        self.interpreter.rsplit('/').next().unwrap_or(self.interpreter)
    }
}

/// `#!/usr/bin/env <name><options>` form of an over-long line
pub fn env_shebang(line: &str) -> Option<String> {
    let shebang = Shebang::parse(line)?;
    Some(format!(
        "#!/usr/bin/env {}{}",
        shebang.interpreter_name(),
        shebang.options
    ))
}

/// What happened to one script
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShebangFix {
    /// Not a script, or the interpreter is outside the build prefix
    Unchanged,
    /// Rewritten to the new line
    Rewritten(String),
    /// Rewritten, then shortened to an `env` lookup for being over the limit
    Shortened(String),
}

/// Rewrites build-prefix interpreter lines
#[derive(Debug, Clone)]
pub struct ShebangFixer {
    prefix: PathBuf,
    build_prefix: Option<PathBuf>,
    final_prefix: Option<PathBuf>,
    interpreter: Option<String>,
    replace_long: bool,
}

impl ShebangFixer {
    pub fn new(prefix: impl Into<PathBuf>) -> Self {
        Self {
            prefix: prefix.into(),
            build_prefix: None,
            final_prefix: None,
            interpreter: None,
            replace_long: true,
        }
    }

    /// Also treat interpreters under a separate build prefix as build-local
    pub fn with_build_prefix(mut self, build_prefix: Option<PathBuf>) -> Self {
        self.build_prefix = build_prefix;
        self
    }

    /// Map prefix interpreters to the same path under the install location
    pub fn with_final_prefix(mut self, final_prefix: Option<PathBuf>) -> Self {
        self.final_prefix = final_prefix;
        self
    }

    /// Rewrite every build-prefix interpreter to this reference
    pub fn with_interpreter(mut self, interpreter: Option<String>) -> Self {
        self.interpreter = interpreter;
        self
    }

    pub fn with_long_replacement(mut self, enabled: bool) -> Self {
        self.replace_long = enabled;
        self
    }

    /// Fix the script at `entry` (relative to the prefix)
    pub fn fix(&self, entry: &Path) -> Result<ShebangFix> {
        let path = self.prefix.join(entry);
        let metadata = fs::symlink_metadata(&path).map_err(io_at(&path))?;
        if !metadata.is_file() || metadata.len() == 0 {
            return Ok(ShebangFix::Unchanged);
        }

        let original = metadata.permissions();
        let needs_access = original.mode() & 0o600 != 0o600;
        if needs_access {
            fs::set_permissions(&path, fs::Permissions::from_mode(original.mode() | 0o600))
                .map_err(io_at(&path))?;
        }

        let result = self.rewrite(&path, entry);

        // Restore even when the rewrite failed; content writes can reset bits
        let restored = fs::set_permissions(&path, original);
        let fix = result?;
        restored.map_err(io_at(&path))?;
        Ok(fix)
    }

    fn rewrite(&self, path: &Path, entry: &Path) -> Result<ShebangFix> {
        let data = fs::read(path).map_err(io_at(path))?;
        if BinaryFormat::sniff(&data).is_some() {
            return Ok(ShebangFix::Unchanged);
        }

        let line_end = data.iter().position(|&b| b == b'\n').unwrap_or(data.len());
        let Ok(line) = std::str::from_utf8(&data[..line_end]) else {
            return Ok(ShebangFix::Unchanged);
        };
        let line = line.trim_end_matches('\r');
        let Some(shebang) = Shebang::parse(line) else {
            return Ok(ShebangFix::Unchanged);
        };
        let Some(replacement) = self.replacement(&shebang) else {
            return Ok(ShebangFix::Unchanged);
        };

        let mut new_line = format!("#!{}{}", replacement, shebang.options);
        let mut shortened = false;
        if self.replace_long
            && new_line.len() > MAX_SHEBANG_LENGTH
            && let Some(env_form) = env_shebang(&new_line)
        {
            warn!(
                "Shebang of {} exceeds {} bytes, using {}",
                entry.display(),
                MAX_SHEBANG_LENGTH,
                env_form
            );
            new_line = env_form;
            shortened = true;
        }

        if new_line == line {
            return Ok(ShebangFix::Unchanged);
        }

        info!("updating shebang: {}", entry.display());
        let mut content = Vec::with_capacity(data.len() + new_line.len());
        content.extend_from_slice(new_line.as_bytes());
        content.extend_from_slice(&data[line.len()..]);
        fs::write(path, content).map_err(io_at(path))?;

        Ok(if shortened {
            ShebangFix::Shortened(new_line)
        } else {
            ShebangFix::Rewritten(new_line)
        })
    }

    /// New interpreter reference for a build-local interpreter
    fn replacement(&self, shebang: &Shebang<'_>) -> Option<String> {
        let interpreter = Path::new(shebang.interpreter);
        let relative = [Some(&self.prefix), self.build_prefix.as_ref()]
            .into_iter()
            .flatten()
            .find_map(|root| interpreter.strip_prefix(root).ok())?;

        if let Some(target) = &self.interpreter {
            return Some(target.clone());
        }
        if let Some(final_prefix) = &self.final_prefix {
            return Some(final_prefix.join(relative).to_string_lossy().into_owned());
        }
        Some(format!("/usr/bin/env {}", shebang.interpreter_name()))
    }
}

/// Rewrite the interpreter line of `entry` under `prefix` to `interpreter`
pub fn fix_shebang(entry: &Path, prefix: &Path, interpreter: &str) -> Result<ShebangFix> {
    ShebangFixer::new(prefix)
        .with_interpreter(Some(interpreter.to_string()))
        .fix(entry)
}

// src/config.rs

//! Configuration for post-build processing of one package output
//!
//! Loaded from TOML; every table is optional and falls back to defaults.
//!
//! ```toml
//! prefix = "/work/host_env"
//! build_root = "/work"
//!
//! [relocation]
//! timeout_secs = 30
//!
//! [relocation.overrides]
//! "libfoo.so.1" = "lib/libfoo.so.1"
//!
//! [shebang]
//! interpreter = "/usr/bin/env python"
//! ```

use crate::error::{io_at, Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default bound on one link editor invocation
pub const DEFAULT_EDITOR_TIMEOUT_SECS: u64 = 60;

/// Top-level configuration for one package output
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PostConfig {
    /// Output name used in reports
    pub output: String,
    /// Build-time install prefix the package files live in
    pub prefix: PathBuf,
    /// Separate toolchain prefix (cross builds); references into it must
    /// have a counterpart under `prefix`
    pub build_prefix: Option<PathBuf>,
    /// Transient build area discarded after packaging
    pub build_root: PathBuf,
    /// Final install location; in-prefix shebangs are rewritten against it
    /// when no interpreter is configured
    pub final_prefix: Option<PathBuf>,
    /// Break shared inodes before anything else touches the tree
    pub hardlinks: bool,
    pub relocation: RelocationConfig,
    pub shebang: ShebangConfig,
    pub symlinks: SymlinkConfig,
    pub metadata: MetadataConfig,
}

impl Default for PostConfig {
    fn default() -> Self {
        Self {
            output: String::new(),
            prefix: PathBuf::new(),
            build_prefix: None,
            build_root: PathBuf::new(),
            final_prefix: None,
            hardlinks: true,
            relocation: RelocationConfig::default(),
            shebang: ShebangConfig::default(),
            symlinks: SymlinkConfig::default(),
            metadata: MetadataConfig::default(),
        }
    }
}

impl PostConfig {
    /// Create a configuration for the given prefix and build area
    pub fn new(prefix: impl Into<PathBuf>, build_root: impl Into<PathBuf>) -> Self {
        Self {
            prefix: prefix.into(),
            build_root: build_root.into(),
            ..Self::default()
        }
    }

    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(io_at(path))?;
        Self::from_toml_str(&content)
    }

    /// Check required fields
    pub fn validate(&self) -> Result<()> {
        if self.prefix.as_os_str().is_empty() {
            return Err(Error::Config("'prefix' is required".to_string()));
        }
        if !self.prefix.is_absolute() {
            return Err(Error::Config(format!(
                "'prefix' must be absolute: {}",
                self.prefix.display()
            )));
        }
        if let Some(build_prefix) = &self.build_prefix
            && !build_prefix.is_absolute()
        {
            return Err(Error::Config(format!(
                "'build_prefix' must be absolute: {}",
                build_prefix.display()
            )));
        }
        Ok(())
    }

    /// Set the output name
    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = output.into();
        self
    }

    /// Set a separate build (toolchain) prefix
    pub fn with_build_prefix(mut self, build_prefix: impl Into<PathBuf>) -> Self {
        self.build_prefix = Some(build_prefix.into());
        self
    }

    /// Force a reference to resolve to the given manifest entry
    pub fn with_override(mut self, reference: impl Into<String>, entry: impl Into<PathBuf>) -> Self {
        self.relocation
            .overrides
            .insert(reference.into(), entry.into());
        self
    }

    /// Set the link editor timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.relocation.timeout_secs = timeout.as_secs();
        self
    }

    /// Set the interpreter that build-prefix shebangs are rewritten to
    pub fn with_interpreter(mut self, interpreter: impl Into<String>) -> Self {
        self.shebang.interpreter = Some(interpreter.into());
        self
    }

    /// Set the package name and version checked against installed dist-info
    pub fn with_declared_version(
        mut self,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        self.metadata.name = Some(name.into());
        self.metadata.version = Some(version.into());
        self
    }
}

/// Library search-path and identity rewriting
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelocationConfig {
    pub enabled: bool,
    /// Bound on each link editor invocation, in seconds
    pub timeout_secs: u64,
    /// Rewrite shared-library self-identities (SONAME / install id)
    pub rewrite_identity: bool,
    /// Reference string -> manifest path, bypassing ambiguity resolution
    pub overrides: BTreeMap<String, PathBuf>,
}

impl Default for RelocationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_secs: DEFAULT_EDITOR_TIMEOUT_SECS,
            rewrite_identity: true,
            overrides: BTreeMap::new(),
        }
    }
}

impl RelocationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Interpreter line rewriting
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShebangConfig {
    pub enabled: bool,
    /// Target interpreter reference; when unset, the interpreter name is
    /// kept and resolved through `/usr/bin/env`
    pub interpreter: Option<String>,
    /// Shorten shebangs over the kernel limit to an `env` form
    pub replace_long: bool,
}

impl Default for ShebangConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interpreter: None,
            replace_long: true,
        }
    }
}

/// Symlink validation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SymlinkConfig {
    pub enabled: bool,
    /// Rewrite absolute in-prefix symlinks as relative links
    pub make_relative: bool,
}

impl Default for SymlinkConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            make_relative: true,
        }
    }
}

/// Package metadata consistency checks
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    /// Distribution name whose installed dist-info is checked
    pub name: Option<String>,
    /// Declared version it must carry
    pub version: Option<String>,
    /// Validate `Menu/*.json` installer-menu descriptors
    pub validate_menus: bool,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            name: None,
            version: None,
            validate_menus: true,
        }
    }
}

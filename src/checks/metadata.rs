// src/checks/metadata.rs

//! Declared vs. installed package version
//!
//! Python packages install a `<name>-<version>.dist-info/METADATA` file. If
//! the recipe's declared version disagrees with the one pip actually
//! installed, the package would advertise the wrong version.

use crate::error::{Error, Result};
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;
use tracing::debug;

static DIST_INFO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|/)(?P<name>[^/]+)-(?P<version>[^/-]+)\.dist-info/METADATA$").unwrap()
});

/// Normalize a distribution name for comparison (`Foo_Bar.baz` == `foo-bar-baz`)
pub fn normalize_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '_' | '.' => '-',
            c => c.to_ascii_lowercase(),
        })
        .collect()
}

/// Name and version encoded in a dist-info METADATA path
pub fn dist_info(path: &Path) -> Option<(String, String)> {
    let text = path.to_str()?;
    let captures = DIST_INFO.captures(text)?;
    Some((
        captures.name("name")?.as_str().to_string(),
        captures.name("version")?.as_str().to_string(),
    ))
}

/// Check that every installed dist-info for `name` carries `version`
///
/// Succeeds when no installed metadata names the package.
pub fn check_version<P: AsRef<Path>>(name: &str, version: &str, paths: &[P]) -> Result<()> {
    let wanted = normalize_name(name);

    for path in paths {
        let path = path.as_ref();
        let Some((found_name, found_version)) = dist_info(path) else {
            continue;
        };
        if normalize_name(&found_name) != wanted {
            continue;
        }
        if found_version != version {
            return Err(Error::MetadataMismatch {
                name: name.to_string(),
                expected: version.to_string(),
                found: found_version,
                path: path.to_path_buf(),
            });
        }
        debug!("{} matches declared version {}", path.display(), version);
    }

    Ok(())
}

// src/resolve/reference.rs

//! Classification of raw dependency references
//!
//! A reference is whatever string a binary's link table or a script's
//! interpreter line records. It takes one of three shapes: an absolute path,
//! a bare or relative name, or a runtime-relative token followed by a suffix.

use std::path::{Component, Path};

/// Placeholder tokens the dynamic loader expands at runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuntimeToken {
    /// ELF `$ORIGIN` / `${ORIGIN}`: directory of the loading object
    Origin,
    /// Mach-O `@loader_path`: directory of the loading object
    LoaderPath,
    /// Mach-O `@executable_path`: directory of the main executable
    ExecutablePath,
    /// Mach-O `@rpath`: each entry of the consumer's search path
    Rpath,
}

impl RuntimeToken {
    const ALL: [(&'static str, RuntimeToken); 5] = [
        ("${ORIGIN}", RuntimeToken::Origin),
        ("$ORIGIN", RuntimeToken::Origin),
        ("@loader_path", RuntimeToken::LoaderPath),
        ("@executable_path", RuntimeToken::ExecutablePath),
        ("@rpath", RuntimeToken::Rpath),
    ];

    /// Split a leading token off `reference`, returning the token and the
    /// remaining suffix with its separator removed
    pub fn split(reference: &str) -> Option<(Self, &str)> {
        for (text, token) in Self::ALL {
            if let Some(rest) = reference.strip_prefix(text)
                && (rest.is_empty() || rest.starts_with('/'))
            {
                return Some((token, rest.trim_start_matches('/')));
            }
        }
        None
    }

    /// Whether the token names the binary's own location rather than a
    /// search path supplied by whoever loads it
    pub const fn is_self_relative(&self) -> bool {
        !matches!(self, Self::Rpath)
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Origin => "$ORIGIN",
            Self::LoaderPath => "@loader_path",
            Self::ExecutablePath => "@executable_path",
            Self::Rpath => "@rpath",
        }
    }
}

/// Shape of a raw dependency reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyReference<'a> {
    /// Absolute filesystem path
    Absolute(&'a Path),
    /// Name without any directory component
    Bare(&'a str),
    /// Relative path with directory components
    Relative(&'a Path),
    /// Runtime-relative token plus (possibly empty) suffix
    Token(RuntimeToken, &'a str),
}

impl<'a> DependencyReference<'a> {
    pub fn parse(reference: &'a str) -> Self {
        if let Some((token, suffix)) = RuntimeToken::split(reference) {
            return Self::Token(token, suffix);
        }

        let path = Path::new(reference);
        if path.is_absolute() {
            Self::Absolute(path)
        } else if has_directory_components(path) {
            Self::Relative(path)
        } else {
            Self::Bare(reference)
        }
    }
}

/// True if the path has anything besides a single normal component
fn has_directory_components(path: &Path) -> bool {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .count()
        > 1
}

/// Final path component of a reference, as a string
pub fn basename(reference: &str) -> &str {
    reference
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(reference)
}

// src/relocate/inspect.rs

//! Binary format detection and link-table reading
//!
//! Uses goblin to read what the dynamic loader will see: the declared
//! dependencies, the runtime search path and the library's own identity.
//! Editing is left to the external tools in the sibling modules.

use crate::error::{io_at, Error, Result};
use goblin::Object;
use goblin::mach::Mach;
use std::fs::{self, File};
use std::io::Read;
use std::path::Path;

const ELF_MAGIC: [u8; 4] = *b"\x7fELF";
const MACHO_MAGICS: [[u8; 4]; 4] = [
    [0xfe, 0xed, 0xfa, 0xce],
    [0xfe, 0xed, 0xfa, 0xcf],
    [0xce, 0xfa, 0xed, 0xfe],
    [0xcf, 0xfa, 0xed, 0xfe],
];

/// Object file formats the relocation engine knows how to handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryFormat {
    Elf,
    MachO,
}

impl BinaryFormat {
    /// Identify a format from the leading bytes of a file
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        let magic: [u8; 4] = bytes.get(..4)?.try_into().ok()?;
        if magic == ELF_MAGIC {
            Some(Self::Elf)
        } else if MACHO_MAGICS.contains(&magic) {
            Some(Self::MachO)
        } else {
            None
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Elf => "ELF",
            Self::MachO => "Mach-O",
        }
    }
}

/// Read just enough of a file to tell whether it is a relocatable binary
///
/// Short files and non-regular files are simply not binaries.
pub fn detect_format(path: &Path) -> Result<Option<BinaryFormat>> {
    let metadata = fs::metadata(path).map_err(io_at(path))?;
    if !metadata.is_file() || metadata.len() < 4 {
        return Ok(None);
    }

    let mut magic = [0u8; 4];
    File::open(path)
        .and_then(|mut file| file.read_exact(&mut magic))
        .map_err(io_at(path))?;
    Ok(BinaryFormat::sniff(&magic))
}

/// Link-relevant contents of one binary
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkInfo {
    /// Declared dependencies in load order
    pub dependencies: Vec<String>,
    /// Runtime search path entries
    pub search_paths: Vec<String>,
    /// Self-identity (ELF SONAME / Mach-O install id)
    pub identity: Option<String>,
}

/// Parse a binary and extract its link table
pub fn read_link_info(path: &Path) -> Result<LinkInfo> {
    let data = fs::read(path).map_err(io_at(path))?;

    match Object::parse(&data) {
        Ok(Object::Elf(elf)) => {
            // DT_RUNPATH takes precedence over DT_RPATH when both are present
            let raw = if elf.runpaths.is_empty() {
                &elf.rpaths
            } else {
                &elf.runpaths
            };
            Ok(LinkInfo {
                dependencies: elf.libraries.iter().map(|s| (*s).to_string()).collect(),
                search_paths: split_search_path(raw.iter().copied()),
                identity: elf.soname.map(str::to_string),
            })
        }
        Ok(Object::Mach(Mach::Binary(mach))) => Ok(LinkInfo {
            // goblin lists the binary itself first
            dependencies: mach
                .libs
                .iter()
                .filter(|lib| **lib != "self")
                .map(|lib| (*lib).to_string())
                .collect(),
            search_paths: mach.rpaths.iter().map(|s| (*s).to_string()).collect(),
            identity: mach.name.map(str::to_string),
        }),
        Ok(Object::Mach(Mach::Fat(_))) => Err(Error::Binary {
            path: path.to_path_buf(),
            reason: "universal (fat) Mach-O binaries are not supported".to_string(),
        }),
        Ok(Object::PE(_)) => Err(Error::Binary {
            path: path.to_path_buf(),
            reason: "PE binaries are not supported".to_string(),
        }),
        Ok(Object::Archive(_)) => Err(Error::Binary {
            path: path.to_path_buf(),
            reason: "static archives carry no link table".to_string(),
        }),
        Ok(_) => Err(Error::Binary {
            path: path.to_path_buf(),
            reason: "unknown object format".to_string(),
        }),
        Err(e) => Err(Error::Binary {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }),
    }
}

/// Flatten colon-separated ELF search path strings into single entries
fn split_search_path<'a>(raw: impl Iterator<Item = &'a str>) -> Vec<String> {
    raw.flat_map(|value| value.split(':'))
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}

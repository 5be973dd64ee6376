// src/hash.rs

//! Content hashing for duplicate detection
//!
//! Two algorithms are supported:
//! - **SHA-256**: used when deciding whether same-named dependency candidates
//!   are interchangeable, where a collision would silently pick the wrong file
//! - **XXH128**: fast non-cryptographic hash, used to verify that a copy
//!   made while breaking hardlinks matches its original

use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use xxhash_rust::xxh3::Xxh3;

const READ_BUFFER: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    Xxh128,
}

impl HashAlgorithm {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Xxh128 => "xxh128",
        }
    }
}

/// Lowercase hex digest tagged with the algorithm that produced it
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Hash {
    pub algorithm: HashAlgorithm,
    pub value: String,
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm.name(), self.value)
    }
}

/// Incremental hasher over either algorithm
pub struct Hasher {
    algorithm: HashAlgorithm,
    state: HasherState,
}

enum HasherState {
    Sha256(Sha256),
    Xxh128(Box<Xxh3>),
}

impl Hasher {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        let state = match algorithm {
            HashAlgorithm::Sha256 => HasherState::Sha256(Sha256::new()),
            HashAlgorithm::Xxh128 => HasherState::Xxh128(Box::new(Xxh3::new())),
        };
        Self { algorithm, state }
    }

    pub fn update(&mut self, data: &[u8]) {
        match &mut self.state {
            HasherState::Sha256(h) => h.update(data),
            HasherState::Xxh128(h) => h.update(data),
        }
    }

    pub fn finalize(self) -> Hash {
        let value = match self.state {
            HasherState::Sha256(h) => hex::encode(h.finalize()),
            HasherState::Xxh128(h) => format!("{:032x}", h.digest128()),
        };
        Hash {
            algorithm: self.algorithm,
            value,
        }
    }
}

pub fn hash_bytes(algorithm: HashAlgorithm, data: &[u8]) -> Hash {
    let mut hasher = Hasher::new(algorithm);
    hasher.update(data);
    hasher.finalize()
}

/// Hash everything `reader` yields
pub fn hash_reader<R: Read>(algorithm: HashAlgorithm, reader: &mut R) -> io::Result<Hash> {
    let mut hasher = Hasher::new(algorithm);
    let mut buffer = vec![0u8; READ_BUFFER];
    loop {
        match reader.read(&mut buffer)? {
            0 => return Ok(hasher.finalize()),
            n => hasher.update(&buffer[..n]),
        }
    }
}

/// Hash a file's content, streaming it from disk
pub fn hash_file(algorithm: HashAlgorithm, path: &Path) -> io::Result<Hash> {
    hash_reader(algorithm, &mut File::open(path)?)
}

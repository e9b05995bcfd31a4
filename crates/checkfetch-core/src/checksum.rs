//! Checksum computation for fetched and cached bytes.
//!
//! Digests are streamed through a fixed-size window so file-backed inputs
//! never load more than `BUF_SIZE` bytes at a time. Results are normalized to
//! lowercase hex; parsing accepts either case.

use md5::Md5;
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

const BUF_SIZE: usize = 8 * 1024;

#[cfg(test)]
thread_local! {
    static DIGESTS_STARTED: std::cell::Cell<usize> = const { std::cell::Cell::new(0) };
}

/// Digests started on the calling thread.
#[cfg(test)]
pub(crate) fn digests_started() -> usize {
    DIGESTS_STARTED.with(|c| c.get())
}

/// Digest algorithm, selected from the width of the expected checksum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Algorithm {
    /// 128-bit MD5 (32 hex chars).
    #[default]
    Md5,
    /// 256-bit SHA-256 (64 hex chars).
    Sha256,
}

impl Algorithm {
    /// Number of hex characters in a digest produced by this algorithm.
    pub fn hex_len(self) -> usize {
        match self {
            Algorithm::Md5 => 32,
            Algorithm::Sha256 => 64,
        }
    }

    /// Pick the algorithm whose digest has `len` hex characters.
    pub fn for_hex_len(len: usize) -> Option<Self> {
        match len {
            32 => Some(Algorithm::Md5),
            64 => Some(Algorithm::Sha256),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Algorithm::Md5 => "md5",
            Algorithm::Sha256 => "sha256",
        }
    }
}

impl std::str::FromStr for Algorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "md5" => Ok(Algorithm::Md5),
            "sha256" | "sha-256" => Ok(Algorithm::Sha256),
            other => Err(format!("unsupported digest algorithm: {other}")),
        }
    }
}

/// A normalized lowercase hex digest of fixed width.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DigestResult {
    hex: String,
    algorithm: Algorithm,
}

impl DigestResult {
    /// Validate and normalize a hex checksum. Returns `None` for empty input,
    /// non-hex characters, or an unsupported width.
    pub fn parse(hex: &str) -> Option<Self> {
        let hex = hex.trim();
        let algorithm = Algorithm::for_hex_len(hex.len())?;
        if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        Some(Self {
            hex: hex.to_ascii_lowercase(),
            algorithm,
        })
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn as_str(&self) -> &str {
        &self.hex
    }

    /// Case-insensitive comparison against a raw hex string.
    pub fn matches_hex(&self, other: &str) -> bool {
        self.hex.eq_ignore_ascii_case(other.trim())
    }

    pub fn matches(&self, other: &DigestResult) -> bool {
        self.algorithm == other.algorithm && self.hex == other.hex
    }
}

impl fmt::Display for DigestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hex)
    }
}

enum Hasher {
    Md5(Md5),
    Sha256(Sha256),
}

impl Hasher {
    fn new(algorithm: Algorithm) -> Self {
        #[cfg(test)]
        DIGESTS_STARTED.with(|c| c.set(c.get() + 1));
        match algorithm {
            Algorithm::Md5 => Hasher::Md5(Md5::new()),
            Algorithm::Sha256 => Hasher::Sha256(Sha256::new()),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Hasher::Md5(h) => h.update(data),
            Hasher::Sha256(h) => h.update(data),
        }
    }

    fn finish(self, algorithm: Algorithm) -> DigestResult {
        let hex = match self {
            Hasher::Md5(h) => hex::encode(h.finalize()),
            Hasher::Sha256(h) => hex::encode(h.finalize()),
        };
        DigestResult { hex, algorithm }
    }
}

/// Digest an in-memory buffer.
pub fn digest_bytes(data: &[u8], algorithm: Algorithm) -> DigestResult {
    let mut hasher = Hasher::new(algorithm);
    hasher.update(data);
    hasher.finish(algorithm)
}

/// Consume `reader` to the end and return its digest. The reader is dropped
/// on every exit path, including read errors.
pub fn digest_reader<R: Read>(mut reader: R, algorithm: Algorithm) -> io::Result<DigestResult> {
    let mut hasher = Hasher::new(algorithm);
    let mut buf = [0u8; BUF_SIZE];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finish(algorithm))
}

/// Digest a file, reading it in `BUF_SIZE` chunks.
pub fn digest_path(path: &Path, algorithm: Algorithm) -> io::Result<DigestResult> {
    let f = File::open(path)?;
    digest_reader(f, algorithm)
}

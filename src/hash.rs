// src/hash.rs

//! Configurable hashing for artifact verification and cache-key digests.
//!
//! Several algorithms coexist because they serve different roles:
//!
//! | Use case | Algorithm |
//! |----------|-----------|
//! | Verifying upstream downloads | SHA-1 (what the manifest publishes) |
//! | Verifying files bundled in the server archive | SHA-256 |
//! | Fingerprints and derivation digests | MD5 |
//! | Per-entry digests while splitting archives | XXH128 (never persisted) |

use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::fmt;
use std::io::{self, Read};
use std::path::Path;
use xxhash_rust::xxh3::xxh3_128;

/// Hash algorithm selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    /// SHA-1, used to match upstream download checksums.
    Sha1,
    /// SHA-256, used to match checksums of files bundled in the server archive.
    Sha256,
    /// MD5, used for fingerprints and derivation digests. Only needs to be
    /// stable between runs for identical bytes.
    Md5,
    /// XXH128, used for fast in-memory comparisons during archive splitting.
    Xxh128,
}

impl HashAlgorithm {
    /// The algorithm name as a string.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
            Self::Md5 => "md5",
            Self::Xxh128 => "xxh128",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Streaming hasher over any supported algorithm.
pub struct Hasher {
    state: HasherState,
}

enum HasherState {
    Sha1(Sha1),
    Sha256(Sha256),
    Md5(Md5),
    // XXH3 has no incremental API in the binding we use, so buffer.
    Xxh128(Vec<u8>),
}

impl Hasher {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        let state = match algorithm {
            HashAlgorithm::Sha1 => HasherState::Sha1(Sha1::new()),
            HashAlgorithm::Sha256 => HasherState::Sha256(Sha256::new()),
            HashAlgorithm::Md5 => HasherState::Md5(Md5::new()),
            HashAlgorithm::Xxh128 => HasherState::Xxh128(Vec::new()),
        };
        Self { state }
    }

    pub fn update(&mut self, data: &[u8]) {
        match &mut self.state {
            HasherState::Sha1(h) => h.update(data),
            HasherState::Sha256(h) => h.update(data),
            HasherState::Md5(h) => h.update(data),
            HasherState::Xxh128(buffer) => buffer.extend_from_slice(data),
        }
    }

    /// Finalize and return the digest as a lowercase hex string.
    pub fn finalize(self) -> String {
        match self.state {
            HasherState::Sha1(h) => hex::encode(h.finalize()),
            HasherState::Sha256(h) => hex::encode(h.finalize()),
            HasherState::Md5(h) => hex::encode(h.finalize()),
            HasherState::Xxh128(buffer) => format!("{:032x}", xxh3_128(&buffer)),
        }
    }
}

/// Compute the hash of a byte slice.
pub fn hash_bytes(algorithm: HashAlgorithm, data: &[u8]) -> String {
    let mut hasher = Hasher::new(algorithm);
    hasher.update(data);
    hasher.finalize()
}

/// Compute the hash of data from a reader, streaming in 8 KiB chunks.
pub fn hash_reader<R: Read>(algorithm: HashAlgorithm, reader: &mut R) -> io::Result<String> {
    let mut hasher = Hasher::new(algorithm);
    let mut buffer = [0u8; 8192];

    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hasher.finalize())
}

/// Compute the hash of a file's contents.
pub fn hash_file(algorithm: HashAlgorithm, path: &Path) -> io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    hash_reader(algorithm, &mut file)
}

/// A failed hash verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyError {
    pub expected: String,
    pub actual: String,
}

impl fmt::Display for VerifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "expected {}, got {}", self.expected, self.actual)
    }
}

impl std::error::Error for VerifyError {}

/// Verify a file matches an expected hash, streaming its content.
///
/// The outer error is an I/O failure reading the file; the inner one is the
/// actual mismatch.
pub fn verify_file(
    algorithm: HashAlgorithm,
    path: &Path,
    expected: &str,
) -> io::Result<std::result::Result<(), VerifyError>> {
    let actual = hash_file(algorithm, path)?;
    if actual == expected.to_lowercase() {
        Ok(Ok(()))
    } else {
        Ok(Err(VerifyError {
            expected: expected.to_string(),
            actual,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha1_known_value() {
        assert_eq!(
            hash_bytes(HashAlgorithm::Sha1, b"hello world"),
            "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed"
        );
    }

    #[test]
    fn sha256_known_value() {
        assert_eq!(
            hash_bytes(HashAlgorithm::Sha256, b"hello world"),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn md5_known_value() {
        assert_eq!(
            hash_bytes(HashAlgorithm::Md5, b"hello world"),
            "5eb63bbbe01eeed093cb22bb8f5acdc3"
        );
    }

    #[test]
    fn xxh128_shape() {
        assert_eq!(hash_bytes(HashAlgorithm::Xxh128, b"hello world").len(), 32);
    }

    #[test]
    fn incremental_matches_oneshot() {
        let mut hasher = Hasher::new(HashAlgorithm::Md5);
        hasher.update(b"hello ");
        hasher.update(b"world");
        assert_eq!(
            hasher.finalize(),
            hash_bytes(HashAlgorithm::Md5, b"hello world")
        );
    }

    #[test]
    fn reader_matches_bytes() {
        let data = b"some longer test data for the streaming path";
        let mut cursor = std::io::Cursor::new(&data[..]);
        assert_eq!(
            hash_reader(HashAlgorithm::Sha1, &mut cursor).unwrap(),
            hash_bytes(HashAlgorithm::Sha1, data)
        );
    }

    #[test]
    fn verify_is_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.bin");
        std::fs::write(&path, b"hello world").unwrap();

        let upper = "2AAE6C35C94FCFB415DBE95F408B9CE91EE846ED";
        assert!(verify_file(HashAlgorithm::Sha1, &path, upper)
            .unwrap()
            .is_ok());

        let wrong = "0000000000000000000000000000000000000000";
        let err = verify_file(HashAlgorithm::Sha1, &path, wrong)
            .unwrap()
            .unwrap_err();
        assert_eq!(err.expected, wrong);
    }
}

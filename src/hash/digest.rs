//! Streaming file digests

use crate::config::HashAlgorithm;
use crate::error::{Result, TreeSyncError};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

const READ_BUFFER: usize = 1024 * 1024;

/// Hash result as hex string
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashResult {
    /// The hash algorithm used
    pub algorithm: HashAlgorithm,
    /// Hash value as lowercase hex string
    pub hash: String,
    /// Number of bytes hashed
    pub size: u64,
}

impl HashResult {
    /// Same algorithm, same digest
    pub fn verify(&self, other: &HashResult) -> bool {
        self.algorithm == other.algorithm && self.hash == other.hash
    }
}

impl std::fmt::Display for HashResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.algorithm.name(), self.hash)
    }
}

/// Unified hasher over all supported algorithms
pub enum Hasher {
    /// XXHash3 128-bit
    XXHash3(Box<xxhash_rust::xxh3::Xxh3>),
    /// XXHash64
    XXHash64(xxhash_rust::xxh64::Xxh64),
    /// BLAKE3
    Blake3(Box<blake3::Hasher>),
    /// SHA-256
    Sha256(sha2::Sha256),
}

impl Hasher {
    /// Create a new hasher for the given algorithm
    pub fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::XXHash3 => Self::XXHash3(Box::default()),
            HashAlgorithm::XXHash64 => Self::XXHash64(xxhash_rust::xxh64::Xxh64::new(0)),
            HashAlgorithm::Blake3 => Self::Blake3(Box::default()),
            HashAlgorithm::Sha256 => {
                use sha2::Digest;
                Self::Sha256(sha2::Sha256::new())
            }
        }
    }

    /// Feed more data
    pub fn update(&mut self, data: &[u8]) {
        match self {
            Self::XXHash3(h) => h.update(data),
            Self::XXHash64(h) => h.update(data),
            Self::Blake3(h) => {
                h.update(data);
            }
            Self::Sha256(h) => {
                use sha2::Digest;
                h.update(data);
            }
        }
    }

    /// Finalize into a lowercase hex digest
    pub fn finalize(self) -> String {
        match self {
            Self::XXHash3(h) => format!("{:032x}", h.digest128()),
            Self::XXHash64(h) => format!("{:016x}", h.digest()),
            Self::Blake3(h) => h.finalize().to_hex().to_string(),
            Self::Sha256(h) => {
                use sha2::Digest;
                hex::encode(h.finalize())
            }
        }
    }
}

/// Compute the digest of a file
pub fn hash_file(path: &Path, algorithm: HashAlgorithm) -> Result<HashResult> {
    let file = File::open(path).map_err(|e| TreeSyncError::io(path, e))?;
    let mut reader = BufReader::with_capacity(READ_BUFFER, file);
    let mut hasher = Hasher::new(algorithm);
    let mut buffer = vec![0u8; READ_BUFFER];
    let mut size = 0u64;

    loop {
        let bytes_read = reader
            .read(&mut buffer)
            .map_err(|e| TreeSyncError::io(path, e))?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
        size += bytes_read as u64;
    }

    Ok(HashResult {
        algorithm,
        hash: hasher.finalize(),
        size,
    })
}

/// Compute the digest of an in-memory buffer
pub fn hash_bytes(data: &[u8], algorithm: HashAlgorithm) -> HashResult {
    let mut hasher = Hasher::new(algorithm);
    hasher.update(data);
    HashResult {
        algorithm,
        hash: hasher.finalize(),
        size: data.len() as u64,
    }
}

/// Result of verifying two files
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationResult {
    /// Hash of the source file
    pub source_hash: HashResult,
    /// Hash of the destination file
    pub dest_hash: HashResult,
    /// Whether the hashes match
    pub matches: bool,
}

/// Hash `source` and `dest` concurrently and compare
pub fn verify_files_match(
    source: &Path,
    dest: &Path,
    algorithm: HashAlgorithm,
) -> Result<VerificationResult> {
    let (source_hash, dest_hash) = rayon::join(
        || hash_file(source, algorithm),
        || hash_file(dest, algorithm),
    );
    let source_hash = source_hash?;
    let dest_hash = dest_hash?;
    let matches = source_hash.verify(&dest_hash);

    Ok(VerificationResult {
        source_hash,
        dest_hash,
        matches,
    })
}

/// Like [`verify_files_match`] but a mismatch is an error
pub fn ensure_files_match(source: &Path, dest: &Path, algorithm: HashAlgorithm) -> Result<()> {
    let result = verify_files_match(source, dest, algorithm)?;
    if result.matches {
        Ok(())
    } else {
        Err(TreeSyncError::integrity_mismatch(
            dest,
            result.source_hash.hash,
            result.dest_hash.hash,
        ))
    }
}

//! Content hashing for copy verification
//!
//! Supports XXHash3 (default), XXHash64, BLAKE3 and SHA-256.

mod digest;

pub use digest::*;

//! SHA-256 Digests
//!
//! Used for identity hashes and for binding both DH half-keys into the
//! handshake (`H(X)`, `H(X || Y)`).

use sha2::{Digest, Sha256};

/// Digest size in bytes
pub const SHA256_SIZE: usize = 32;

/// SHA-256 of a byte slice
pub fn sha256(data: &[u8]) -> [u8; SHA256_SIZE] {
    Sha256::digest(data).into()
}

/// SHA-256 of the concatenation of two slices
pub fn sha256_pair(a: &[u8], b: &[u8]) -> [u8; SHA256_SIZE] {
    let mut hasher = Sha256::new();
    hasher.update(a);
    hasher.update(b);
    hasher.finalize().into()
}

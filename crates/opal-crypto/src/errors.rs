//! Crypto Error Types

use thiserror::Error;

/// Errors raised by the crypto primitives
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CryptoError {
    /// Peer public key is outside the valid group range
    #[error("invalid Diffie-Hellman public key")]
    InvalidPublicKey,

    /// First 32 payload bytes of the shared secret are all zero
    #[error("shared secret starts with more than 32 zero bytes")]
    WeakSharedSecret,

    /// CBC operates on whole blocks only
    #[error("data length {0} is not a multiple of the AES block size")]
    NotBlockAligned(usize),

    /// Block helper called with a slice that is not one block long
    #[error("expected a 16-byte block, got {0} bytes")]
    BadBlockSize(usize),
}

/// Result type for crypto operations
pub type CryptoResult<T> = Result<T, CryptoError>;

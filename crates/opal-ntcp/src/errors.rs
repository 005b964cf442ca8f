//! NTCP Error Types

use thiserror::Error;

/// Errors raised by the handshake and frame engines
#[derive(Error, Debug)]
pub enum NtcpError {
    /// Phase 1 was addressed to a different router identity
    #[error("wrong remote identity in phase 1")]
    WrongIdent,

    /// The hash bound into phase 2 does not match our half-keys
    #[error("incorrect hash in phase 2")]
    IncorrectHash,

    /// A handshake signature failed to verify
    #[error("signature verification failed")]
    SignatureFailed,

    /// Declared identity size does not fit the phase-3 layout
    #[error("malformed phase-3 identity size: {0}")]
    MalformedIdentitySize(usize),

    /// Frame payload exceeds the protocol maximum
    #[error("frame payload {len} exceeds maximum {max}")]
    OversizedFrame { len: usize, max: usize },

    /// Inbound frame failed its Adler-32 check
    #[error("frame checksum mismatch")]
    ChecksumMismatch,

    /// Handshake frame shorter than its fixed layout
    #[error("truncated handshake frame: got {got} bytes, need {need}")]
    Truncated { got: usize, need: usize },

    /// Operation called in a state that does not allow it
    #[error("invalid handshake state: {0}")]
    InvalidState(&'static str),

    /// Crypto failure (weak shared secret, bad public key)
    #[error("crypto error: {0}")]
    Crypto(#[from] opal_crypto::CryptoError),

    /// Identity decoding or signature plumbing failure
    #[error("identity error: {0}")]
    Core(#[from] opal_core::CoreError),

    /// Socket failure
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for NTCP operations
pub type NtcpResult<T> = Result<T, NtcpError>;

//! Core Error Types

use thiserror::Error;

/// Errors raised by the core identity and message types
#[derive(Error, Debug)]
pub enum CoreError {
    /// Buffer too short for the structure being decoded
    #[error("truncated buffer: got {got} bytes, need {need}")]
    Truncated { got: usize, need: usize },

    /// The verifying key bytes do not describe a valid key
    #[error("invalid verifying key")]
    InvalidKey,

    /// Signature does not verify under the identity's key
    #[error("bad signature")]
    BadSignature,

    /// Signature blob has the wrong length for the identity's key type
    #[error("invalid signature length: got {got}, expected {expected}")]
    InvalidSignatureLength { got: usize, expected: usize },

    /// Certificate section exceeds the encodable maximum
    #[error("certificate too large: {0} bytes")]
    CertificateTooLarge(usize),
}

/// Result type for core operations
pub type CoreResult<T> = Result<T, CoreError>;

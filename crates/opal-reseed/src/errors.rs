//! Reseed Error Types

use thiserror::Error;

/// Errors raised while fetching or parsing reseed data
#[derive(Error, Debug)]
pub enum ReseedError {
    /// Archive does not start with the SU3 magic
    #[error("unexpected SU3 magic number")]
    BadMagic,

    /// SU3 carries something other than a ZIP
    #[error("can't handle SU3 file type {0}")]
    UnsupportedFileType(u8),

    /// SU3 carries something other than reseed data
    #[error("unexpected SU3 content type {0}")]
    UnexpectedContentType(u8),

    /// Archive ended inside a structure
    #[error("unexpected end of archive at byte {0}")]
    UnexpectedEof(usize),

    /// A local-file record announced a data descriptor that is missing
    #[error("SU3 archive data descriptor not found")]
    DescriptorNotFound,

    /// PEM or DER structure not as expected
    #[error("malformed certificate: {0}")]
    MalformedCertificate(String),

    /// HTTP fetch failed
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// File or decompression I/O failure
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for reseed operations
pub type ReseedResult<T> = Result<T, ReseedError>;

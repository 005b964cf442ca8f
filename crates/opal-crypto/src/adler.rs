//! Adler-32 Frame Checksums
//!
//! Every data frame ends in an Adler-32 over its length prefix, payload
//! and padding. Cheap integrity only; tampering is caught, attacks are
//! not the threat model here.

use adler32::RollingAdler32;

/// Checksum size in bytes
pub const ADLER32_SIZE: usize = 4;

/// Adler-32 of a byte slice
pub fn adler32(data: &[u8]) -> u32 {
    RollingAdler32::from_buffer(data).hash()
}

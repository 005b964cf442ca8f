//! Session-Key Derivation
//!
//! Maps the 256-byte DH shared secret to the 32-byte AES session key.
//! The mapping reproduces a historical MSB-signedness artefact of the
//! protocol's big-integer encoding and peers only interoperate if it is
//! matched bit-for-bit:
//!
//! - secret's top bit set: the key is a zero byte followed by the first
//!   31 secret bytes
//! - first byte non-zero: the key is the first 32 secret bytes
//! - first byte zero: leading zero bytes are skipped and the next 32
//!   bytes are taken; more than 32 leading zeros aborts the session

use crate::dh::DH_PUBLIC_SIZE;
use crate::errors::{CryptoError, CryptoResult};

/// Size of an AES-256 session key in bytes
pub const SESSION_KEY_SIZE: usize = 32;

/// Derive the AES-256 session key from a DH shared secret
pub fn derive_session_key(shared: &[u8; DH_PUBLIC_SIZE]) -> CryptoResult<[u8; SESSION_KEY_SIZE]> {
    let mut key = [0u8; SESSION_KEY_SIZE];
    if shared[0] & 0x80 != 0 {
        key[1..].copy_from_slice(&shared[..SESSION_KEY_SIZE - 1]);
    } else if shared[0] != 0 {
        key.copy_from_slice(&shared[..SESSION_KEY_SIZE]);
    } else {
        let mut first = 1;
        while shared[first] == 0 {
            first += 1;
            if first > SESSION_KEY_SIZE {
                return Err(CryptoError::WeakSharedSecret);
            }
        }
        key.copy_from_slice(&shared[first..first + SESSION_KEY_SIZE]);
    }
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret_with_prefix(prefix: &[u8]) -> [u8; DH_PUBLIC_SIZE] {
        let mut secret = [0u8; DH_PUBLIC_SIZE];
        secret[..prefix.len()].copy_from_slice(prefix);
        for (i, byte) in secret.iter_mut().enumerate().skip(prefix.len()) {
            *byte = (i % 251) as u8 + 1;
        }
        secret
    }

    #[test]
    fn test_high_bit_prepends_zero() {
        let secret = secret_with_prefix(&[0x80]);
        let key = derive_session_key(&secret).unwrap();

        assert_eq!(key[0], 0);
        assert_eq!(&key[1..], &secret[..31]);
    }

    #[test]
    fn test_high_bit_0xff() {
        let secret = secret_with_prefix(&[0xFF]);
        let key = derive_session_key(&secret).unwrap();

        assert_eq!(key[0], 0);
        assert_eq!(&key[1..], &secret[..31]);
    }

    #[test]
    fn test_plain_leading_byte() {
        let secret = secret_with_prefix(&[0x7F]);
        let key = derive_session_key(&secret).unwrap();

        assert_eq!(&key, &secret[..32]);
    }

    #[test]
    fn test_leading_zero_skipped() {
        let secret = secret_with_prefix(&[0x00]);
        let key = derive_session_key(&secret).unwrap();

        // first non-zero byte is at index 1
        assert_eq!(&key, &secret[1..33]);
    }

    #[test]
    fn test_run_of_zeros_skipped() {
        for zeros in [2usize, 17, 32] {
            let mut secret = secret_with_prefix(&[]);
            for byte in secret.iter_mut().take(zeros) {
                *byte = 0;
            }
            let key = derive_session_key(&secret).unwrap();
            assert_eq!(&key, &secret[zeros..zeros + 32], "zeros = {}", zeros);
        }
    }

    #[test]
    fn test_33_zeros_rejected() {
        let mut secret = secret_with_prefix(&[]);
        for byte in secret.iter_mut().take(33) {
            *byte = 0;
        }
        assert_eq!(derive_session_key(&secret), Err(CryptoError::WeakSharedSecret));
    }

    #[test]
    fn test_derivation_is_pure() {
        let secret = secret_with_prefix(&[0x42]);
        assert_eq!(
            derive_session_key(&secret).unwrap(),
            derive_session_key(&secret).unwrap()
        );
    }
}

//! Chained AES-256-CBC Contexts
//!
//! NTCP runs one unbroken CBC chain per direction: the IV set during the
//! handshake rolls forward with every block for the rest of the session,
//! and no per-frame IV ever appears on the wire. The contexts here wrap
//! the `cbc` mode implementation and are kept alive for the session
//! lifetime so the rolling IV is never reset.

use aes::cipher::{Block, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes::Aes256;

use crate::errors::{CryptoError, CryptoResult};
use crate::session_key::SESSION_KEY_SIZE;

/// AES block size in bytes
pub const AES_BLOCK_SIZE: usize = 16;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;
type AesBlock = Block<Aes256>;

/// Encrypting CBC context with a rolling IV
pub struct AesCbcEncryption {
    inner: Aes256CbcEnc,
}

impl AesCbcEncryption {
    /// Create with a session key and initial IV
    pub fn new(key: &[u8; SESSION_KEY_SIZE], iv: &[u8; AES_BLOCK_SIZE]) -> Self {
        Self {
            inner: Aes256CbcEnc::new(key.into(), iv.into()),
        }
    }

    /// Encrypt whole blocks in place, chaining the IV forward
    pub fn encrypt(&mut self, data: &mut [u8]) -> CryptoResult<()> {
        if data.len() % AES_BLOCK_SIZE != 0 {
            return Err(CryptoError::NotBlockAligned(data.len()));
        }
        for block in data.chunks_exact_mut(AES_BLOCK_SIZE) {
            self.inner.encrypt_block_mut(AesBlock::from_mut_slice(block));
        }
        Ok(())
    }
}

/// Decrypting CBC context with a rolling IV
pub struct AesCbcDecryption {
    inner: Aes256CbcDec,
}

impl AesCbcDecryption {
    /// Create with a session key and initial IV
    pub fn new(key: &[u8; SESSION_KEY_SIZE], iv: &[u8; AES_BLOCK_SIZE]) -> Self {
        Self {
            inner: Aes256CbcDec::new(key.into(), iv.into()),
        }
    }

    /// Decrypt whole blocks in place, chaining the IV forward
    pub fn decrypt(&mut self, data: &mut [u8]) -> CryptoResult<()> {
        if data.len() % AES_BLOCK_SIZE != 0 {
            return Err(CryptoError::NotBlockAligned(data.len()));
        }
        for block in data.chunks_exact_mut(AES_BLOCK_SIZE) {
            self.inner.decrypt_block_mut(AesBlock::from_mut_slice(block));
        }
        Ok(())
    }

    /// Decrypt a single block out of place
    ///
    /// Used by the inbound frame path, which decrypts from the staging
    /// buffer straight into the message under reassembly.
    pub fn decrypt_block(&mut self, input: &[u8], output: &mut [u8]) -> CryptoResult<()> {
        if input.len() != AES_BLOCK_SIZE {
            return Err(CryptoError::BadBlockSize(input.len()));
        }
        if output.len() < AES_BLOCK_SIZE {
            return Err(CryptoError::BadBlockSize(output.len()));
        }
        self.inner.decrypt_block_b2b_mut(
            AesBlock::from_slice(input),
            AesBlock::from_mut_slice(&mut output[..AES_BLOCK_SIZE]),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; SESSION_KEY_SIZE] = [0x11; SESSION_KEY_SIZE];
    const IV: [u8; AES_BLOCK_SIZE] = [0x22; AES_BLOCK_SIZE];

    #[test]
    fn test_roundtrip() {
        let mut data = [0u8; 64];
        for (i, byte) in data.iter_mut().enumerate() {
            *byte = i as u8;
        }
        let original = data;

        let mut enc = AesCbcEncryption::new(&KEY, &IV);
        enc.encrypt(&mut data).unwrap();
        assert_ne!(data, original);

        let mut dec = AesCbcDecryption::new(&KEY, &IV);
        dec.decrypt(&mut data).unwrap();
        assert_eq!(data, original);
    }

    #[test]
    fn test_chaining_across_calls() {
        // Two sequential encrypt calls must equal one call over the
        // concatenation: the IV carries over.
        let mut split = [0xABu8; 64];
        let mut joined = split;

        let mut enc = AesCbcEncryption::new(&KEY, &IV);
        let (a, b) = split.split_at_mut(32);
        enc.encrypt(a).unwrap();
        enc.encrypt(b).unwrap();

        let mut enc_joined = AesCbcEncryption::new(&KEY, &IV);
        enc_joined.encrypt(&mut joined).unwrap();

        assert_eq!(split, joined);
    }

    #[test]
    fn test_decrypt_block_chains_like_bulk() {
        let mut data = [0x5Au8; 48];
        let mut enc = AesCbcEncryption::new(&KEY, &IV);
        enc.encrypt(&mut data).unwrap();

        let mut bulk = data;
        let mut dec_bulk = AesCbcDecryption::new(&KEY, &IV);
        dec_bulk.decrypt(&mut bulk).unwrap();

        let mut blockwise = [0u8; 48];
        let mut dec = AesCbcDecryption::new(&KEY, &IV);
        for i in (0..48).step_by(AES_BLOCK_SIZE) {
            dec.decrypt_block(&data[i..i + AES_BLOCK_SIZE], &mut blockwise[i..])
                .unwrap();
        }

        assert_eq!(bulk, blockwise);
    }

    #[test]
    fn test_unaligned_rejected() {
        let mut enc = AesCbcEncryption::new(&KEY, &IV);
        let mut data = [0u8; 17];
        assert_eq!(
            enc.encrypt(&mut data),
            Err(CryptoError::NotBlockAligned(17))
        );

        let mut dec = AesCbcDecryption::new(&KEY, &IV);
        assert_eq!(
            dec.decrypt(&mut data),
            Err(CryptoError::NotBlockAligned(17))
        );
        assert_eq!(
            dec.decrypt_block(&data[..15], &mut [0u8; 16]),
            Err(CryptoError::BadBlockSize(15))
        );
    }
}

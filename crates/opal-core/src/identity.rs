//! Router Identities
//!
//! A router identity bundles the router's encryption public key, its
//! Ed25519 verifying key and an opaque certificate section. The identity
//! hash (SHA-256 of the serialized identity) is how routers refer to each
//! other everywhere else: in the handshake binding, in the session map,
//! and in the netdb reachability hints.
//!
//! Wire form:
//!
//! ```text
//! [256 bytes encryption key][120 bytes signing-key field]
//! [2 bytes BE certificate length][certificate]
//! ```
//!
//! The signing-key field carries the 32-byte Ed25519 verifying key in its
//! leading bytes; the remainder of the field is zero. A certificate-less
//! identity therefore serializes to exactly 378 bytes.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::errors::{CoreError, CoreResult};

/// Size of an identity hash in bytes
pub const IDENT_HASH_SIZE: usize = 32;

/// Size of the encryption public key in bytes
pub const ENCRYPTION_KEY_SIZE: usize = 256;

/// Size of the signing-key field in bytes
pub const SIGNING_FIELD_SIZE: usize = 120;

/// Size of an Ed25519 verifying key in bytes
pub const VERIFYING_KEY_SIZE: usize = 32;

/// Size of an Ed25519 signature in bytes
pub const ED25519_SIGNATURE_SIZE: usize = 64;

/// Serialized size of an identity with an empty certificate section
pub const MIN_IDENTITY_SIZE: usize = ENCRYPTION_KEY_SIZE + SIGNING_FIELD_SIZE + 2;

/// SHA-256 hash of a serialized router identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IdentHash([u8; IDENT_HASH_SIZE]);

impl IdentHash {
    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; IDENT_HASH_SIZE]) -> Self {
        Self(bytes)
    }

    /// Get as bytes
    pub fn as_bytes(&self) -> &[u8; IDENT_HASH_SIZE] {
        &self.0
    }

    /// Create from a slice
    pub fn from_slice(slice: &[u8]) -> CoreResult<Self> {
        if slice.len() != IDENT_HASH_SIZE {
            return Err(CoreError::Truncated {
                got: slice.len(),
                need: IDENT_HASH_SIZE,
            });
        }
        let mut hash = [0u8; IDENT_HASH_SIZE];
        hash.copy_from_slice(slice);
        Ok(Self(hash))
    }
}

impl std::fmt::Display for IdentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..4])) // Show first 4 bytes
    }
}

/// Public router identity
#[derive(Clone, PartialEq, Eq)]
pub struct RouterIdentity {
    /// Encryption public key (used by tunnel crypto, opaque to transports)
    encryption_key: [u8; ENCRYPTION_KEY_SIZE],
    /// Ed25519 verifying key
    verifying_key: VerifyingKey,
    /// Opaque certificate section
    certificate: Vec<u8>,
}

impl RouterIdentity {
    /// Create from key material and a certificate section
    pub fn new(
        encryption_key: [u8; ENCRYPTION_KEY_SIZE],
        verifying_key: VerifyingKey,
        certificate: Vec<u8>,
    ) -> CoreResult<Self> {
        if certificate.len() > u16::MAX as usize {
            return Err(CoreError::CertificateTooLarge(certificate.len()));
        }
        Ok(Self {
            encryption_key,
            verifying_key,
            certificate,
        })
    }

    /// Serialized length in bytes
    pub fn len(&self) -> usize {
        MIN_IDENTITY_SIZE + self.certificate.len()
    }

    /// An identity always carries its key material
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Signature length for this identity's key type
    ///
    /// Ed25519 identities carry 64-byte signatures.
    pub fn signature_len(&self) -> usize {
        ED25519_SIGNATURE_SIZE
    }

    /// Encryption public key
    pub fn encryption_key(&self) -> &[u8; ENCRYPTION_KEY_SIZE] {
        &self.encryption_key
    }

    /// Certificate section
    pub fn certificate(&self) -> &[u8] {
        &self.certificate
    }

    /// Serialize to bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.len());
        buf.extend_from_slice(&self.encryption_key);
        buf.extend_from_slice(self.verifying_key.as_bytes());
        buf.resize(ENCRYPTION_KEY_SIZE + SIGNING_FIELD_SIZE, 0);
        buf.extend_from_slice(&(self.certificate.len() as u16).to_be_bytes());
        buf.extend_from_slice(&self.certificate);
        buf
    }

    /// Deserialize from bytes, returning the identity and the number of
    /// bytes consumed
    pub fn from_bytes(data: &[u8]) -> CoreResult<(Self, usize)> {
        if data.len() < MIN_IDENTITY_SIZE {
            return Err(CoreError::Truncated {
                got: data.len(),
                need: MIN_IDENTITY_SIZE,
            });
        }

        let mut encryption_key = [0u8; ENCRYPTION_KEY_SIZE];
        encryption_key.copy_from_slice(&data[..ENCRYPTION_KEY_SIZE]);

        let mut key_bytes = [0u8; VERIFYING_KEY_SIZE];
        key_bytes
            .copy_from_slice(&data[ENCRYPTION_KEY_SIZE..ENCRYPTION_KEY_SIZE + VERIFYING_KEY_SIZE]);
        let verifying_key =
            VerifyingKey::from_bytes(&key_bytes).map_err(|_| CoreError::InvalidKey)?;

        let cert_off = ENCRYPTION_KEY_SIZE + SIGNING_FIELD_SIZE;
        let cert_len = u16::from_be_bytes([data[cert_off], data[cert_off + 1]]) as usize;
        let total = MIN_IDENTITY_SIZE + cert_len;
        if data.len() < total {
            return Err(CoreError::Truncated {
                got: data.len(),
                need: total,
            });
        }
        let certificate = data[cert_off + 2..total].to_vec();

        Ok((
            Self {
                encryption_key,
                verifying_key,
                certificate,
            },
            total,
        ))
    }

    /// Identity hash: SHA-256 of the serialized identity
    pub fn hash(&self) -> IdentHash {
        let digest = Sha256::digest(self.to_bytes());
        IdentHash(digest.into())
    }

    /// Verify a signature over `data`
    pub fn verify(&self, data: &[u8], signature: &[u8]) -> CoreResult<()> {
        let sig_bytes: &[u8; ED25519_SIGNATURE_SIZE] =
            signature
                .try_into()
                .map_err(|_| CoreError::InvalidSignatureLength {
                    got: signature.len(),
                    expected: ED25519_SIGNATURE_SIZE,
                })?;
        let signature = Signature::from_bytes(sig_bytes);
        self.verifying_key
            .verify(data, &signature)
            .map_err(|_| CoreError::BadSignature)
    }
}

impl std::fmt::Debug for RouterIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterIdentity")
            .field("hash", &self.hash())
            .field("certificate_len", &self.certificate.len())
            .finish()
    }
}

/// A router's private keys together with its public identity
pub struct RouterKeys {
    identity: RouterIdentity,
    signing_key: SigningKey,
}

impl RouterKeys {
    /// Generate a fresh identity with an empty certificate section
    pub fn generate() -> Self {
        Self::generate_with_certificate(Vec::new())
    }

    /// Generate a fresh identity carrying the given certificate section
    pub fn generate_with_certificate(certificate: Vec<u8>) -> Self {
        let mut encryption_key = [0u8; ENCRYPTION_KEY_SIZE];
        OsRng.fill_bytes(&mut encryption_key);
        let signing_key = SigningKey::generate(&mut OsRng);
        let identity = RouterIdentity {
            encryption_key,
            verifying_key: signing_key.verifying_key(),
            certificate,
        };
        Self {
            identity,
            signing_key,
        }
    }

    /// Public identity
    pub fn identity(&self) -> &RouterIdentity {
        &self.identity
    }

    /// Identity hash
    pub fn hash(&self) -> IdentHash {
        self.identity.hash()
    }

    /// Sign `data` with the identity's signing key
    pub fn sign(&self, data: &[u8]) -> [u8; ED25519_SIGNATURE_SIZE] {
        self.signing_key.sign(data).to_bytes()
    }
}

impl std::fmt::Debug for RouterKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterKeys")
            .field("identity", &self.identity.hash())
            .field("signing_key", &"[REDACTED]")
            .finish()
    }
}

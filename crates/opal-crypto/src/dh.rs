//! 2048-bit MODP Diffie-Hellman
//!
//! The handshake exchanges 256-byte public keys in the 2048-bit MODP
//! group (RFC 3526 group 14, generator 2). Keypairs are ephemeral: one
//! per session, destroyed once the handshake completes.

use num_bigint::{BigUint, RandBigInt};
use std::sync::OnceLock;

use crate::errors::{CryptoError, CryptoResult};

/// Size of a DH public key and of the shared secret in bytes
pub const DH_PUBLIC_SIZE: usize = 256;

/// RFC 3526 group 14 prime (2048 bits)
const MODP_PRIME_HEX: &str = "\
FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD129024E088A67CC74\
020BBEA63B139B22514A08798E3404DDEF9519B3CD3A431B302B0A6DF25F1437\
4FE1356D6D51C245E485B576625E7EC6F44C42E9A637ED6B0BFF5CB6F406B7ED\
EE386BFB5A899FA5AE9F24117C4B1FE649286651ECE45B3DC2007CB8A163BF05\
98DA48361C55D39A69163FA8FD24CF5F83655D23DCA3AD961C62F356208552BB\
9ED529077096966D670C354E4ABC9804F1746C08CA18217C32905E462E36CE3B\
E39E772C180E86039B2783A2EC07A28FB5C55DF06F4C52C9DE2BCBF695581718\
3995497CEA956AE515D2261898FA051015728E5A8AACAA68FFFFFFFFFFFFFFFF";

fn group_prime() -> &'static BigUint {
    static PRIME: OnceLock<BigUint> = OnceLock::new();
    PRIME.get_or_init(|| {
        BigUint::parse_bytes(MODP_PRIME_HEX.as_bytes(), 16).expect("valid group prime")
    })
}

fn group_generator() -> BigUint {
    BigUint::from(2u32)
}

/// Left-pad a big-endian value to the fixed 256-byte wire width
fn to_fixed_bytes(value: &BigUint) -> [u8; DH_PUBLIC_SIZE] {
    let bytes = value.to_bytes_be();
    let mut out = [0u8; DH_PUBLIC_SIZE];
    out[DH_PUBLIC_SIZE - bytes.len()..].copy_from_slice(&bytes);
    out
}

/// Ephemeral Diffie-Hellman keypair
pub struct DhKeyPair {
    private: BigUint,
    public: [u8; DH_PUBLIC_SIZE],
}

impl DhKeyPair {
    /// Generate a new random keypair
    pub fn generate() -> Self {
        let prime = group_prime();
        let mut rng = rand::thread_rng();
        let private = rng.gen_biguint_below(prime);
        let public = to_fixed_bytes(&group_generator().modpow(&private, prime));
        Self { private, public }
    }

    /// Public key in wire form
    pub fn public_key(&self) -> &[u8; DH_PUBLIC_SIZE] {
        &self.public
    }

    /// Compute the 256-byte shared secret with a peer's public key
    pub fn agree(&self, peer_public: &[u8; DH_PUBLIC_SIZE]) -> CryptoResult<[u8; DH_PUBLIC_SIZE]> {
        let prime = group_prime();
        let peer = BigUint::from_bytes_be(peer_public);
        if peer <= BigUint::from(1u32) || &peer >= prime {
            return Err(CryptoError::InvalidPublicKey);
        }
        Ok(to_fixed_bytes(&peer.modpow(&self.private, prime)))
    }
}

impl std::fmt::Debug for DhKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DhKeyPair")
            .field("public", &hex::encode(&self.public[..8]))
            .field("private", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_key_width() {
        let kp = DhKeyPair::generate();
        assert_eq!(kp.public_key().len(), DH_PUBLIC_SIZE);
    }

    #[test]
    fn test_agreement_matches() {
        let alice = DhKeyPair::generate();
        let bob = DhKeyPair::generate();

        let alice_shared = alice.agree(bob.public_key()).unwrap();
        let bob_shared = bob.agree(alice.public_key()).unwrap();

        assert_eq!(alice_shared, bob_shared);
    }

    #[test]
    fn test_different_peers_different_secrets() {
        let alice = DhKeyPair::generate();
        let bob = DhKeyPair::generate();
        let carol = DhKeyPair::generate();

        let with_bob = alice.agree(bob.public_key()).unwrap();
        let with_carol = alice.agree(carol.public_key()).unwrap();

        assert_ne!(with_bob, with_carol);
    }

    #[test]
    fn test_degenerate_public_keys_rejected() {
        let kp = DhKeyPair::generate();

        let zero = [0u8; DH_PUBLIC_SIZE];
        assert_eq!(kp.agree(&zero), Err(CryptoError::InvalidPublicKey));

        let mut one = [0u8; DH_PUBLIC_SIZE];
        one[DH_PUBLIC_SIZE - 1] = 1;
        assert_eq!(kp.agree(&one), Err(CryptoError::InvalidPublicKey));

        let prime = to_fixed_bytes(group_prime());
        assert_eq!(kp.agree(&prime), Err(CryptoError::InvalidPublicKey));
    }
}

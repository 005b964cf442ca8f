//! NTCP Handshake
//!
//! Four phases, strictly alternating, with mutual identity binding:
//!
//! ```text
//! Initiator                                        Responder
//!   |                                                  |
//!   |--- Phase 1: X || H(X) ^ HI_r ------------------->|
//!   |                                                  |
//!   |<-- Phase 2: Y || Enc(H(X||Y) || tsB || filler) --|
//!   |                                                  |
//!   |--- Phase 3: Enc(ident || tsA || pad || sigA) --->|
//!   |                                                  |
//!   |<-- Phase 4: Enc(sigB || pad) --------------------|
//!   |                                                  |
//!   |=============== session established ==============|
//! ```
//!
//! Both signatures cover `X || Y || ident-hash || tsA || tsB`; phase 3
//! binds the responder's identity hash, phase 4 the initiator's.
//!
//! The CBC contexts created while processing phases 1 and 2 are the
//! session's stream ciphers: the responder's encryption context first
//! encrypts the phase-2 block, then phase 4, then every data frame, one
//! unbroken chain. The state machines here are sans-io; the session
//! moves their bytes over the socket.

use rand::RngCore;

use opal_core::{unix_seconds, IdentHash, RouterIdentity, RouterKeys, IDENT_HASH_SIZE};
use opal_crypto::{
    derive_session_key, sha256, sha256_pair, AesCbcDecryption, AesCbcEncryption, DhKeyPair,
    DH_PUBLIC_SIZE, SHA256_SIZE,
};

use crate::constants::{
    aligned16, NTCP_DEFAULT_PHASE3_SIZE, PHASE1_SIZE, PHASE2_ENCRYPTED_SIZE, PHASE2_SIZE,
};
use crate::errors::{NtcpError, NtcpResult};

/// Last 16 bytes of a DH public key, used as a phase-2 IV
fn dh_iv(public: &[u8; DH_PUBLIC_SIZE]) -> [u8; 16] {
    let mut iv = [0u8; 16];
    iv.copy_from_slice(&public[DH_PUBLIC_SIZE - 16..]);
    iv
}

/// The byte sequence both handshake signatures cover
fn signed_data(
    x: &[u8; DH_PUBLIC_SIZE],
    y: &[u8; DH_PUBLIC_SIZE],
    ident: &IdentHash,
    ts_a: u32,
    ts_b: u32,
) -> Vec<u8> {
    let mut data = Vec::with_capacity(2 * DH_PUBLIC_SIZE + IDENT_HASH_SIZE + 8);
    data.extend_from_slice(x);
    data.extend_from_slice(y);
    data.extend_from_slice(ident.as_bytes());
    data.extend_from_slice(&ts_a.to_be_bytes());
    data.extend_from_slice(&ts_b.to_be_bytes());
    data
}

/// Phase-1 frame: the initiator's DH public key and `H(X)` XOR-ed with
/// the responder's identity hash
#[derive(Clone)]
pub struct Phase1 {
    pub pub_key: [u8; DH_PUBLIC_SIZE],
    pub hx_xor_hi: [u8; SHA256_SIZE],
}

impl Phase1 {
    /// Build for the given responder identity
    pub fn new(dh_public: &[u8; DH_PUBLIC_SIZE], remote_ident: &IdentHash) -> Self {
        let mut hx_xor_hi = sha256(dh_public);
        for (byte, ident) in hx_xor_hi.iter_mut().zip(remote_ident.as_bytes()) {
            *byte ^= ident;
        }
        Self {
            pub_key: *dh_public,
            hx_xor_hi,
        }
    }

    /// Serialize to the 288-byte wire form
    pub fn to_bytes(&self) -> [u8; PHASE1_SIZE] {
        let mut buf = [0u8; PHASE1_SIZE];
        buf[..DH_PUBLIC_SIZE].copy_from_slice(&self.pub_key);
        buf[DH_PUBLIC_SIZE..].copy_from_slice(&self.hx_xor_hi);
        buf
    }

    /// Deserialize from bytes
    pub fn from_bytes(data: &[u8]) -> NtcpResult<Self> {
        if data.len() < PHASE1_SIZE {
            return Err(NtcpError::Truncated {
                got: data.len(),
                need: PHASE1_SIZE,
            });
        }
        let mut pub_key = [0u8; DH_PUBLIC_SIZE];
        pub_key.copy_from_slice(&data[..DH_PUBLIC_SIZE]);
        let mut hx_xor_hi = [0u8; SHA256_SIZE];
        hx_xor_hi.copy_from_slice(&data[DH_PUBLIC_SIZE..PHASE1_SIZE]);
        Ok(Self { pub_key, hx_xor_hi })
    }

    /// Check the frame was addressed to `local_ident`
    pub fn verify(&self, local_ident: &IdentHash) -> NtcpResult<()> {
        let digest = sha256(&self.pub_key);
        for i in 0..SHA256_SIZE {
            if self.hx_xor_hi[i] ^ local_ident.as_bytes()[i] != digest[i] {
                return Err(NtcpError::WrongIdent);
            }
        }
        Ok(())
    }

    /// IV for the initiator-to-responder cipher direction
    fn iv(&self) -> [u8; 16] {
        let mut iv = [0u8; 16];
        iv.copy_from_slice(&self.hx_xor_hi[SHA256_SIZE - 16..]);
        iv
    }
}

/// Phase-2 frame: the responder's DH public key and the encrypted
/// `H(X||Y) || tsB || filler` block
pub struct Phase2 {
    pub pub_key: [u8; DH_PUBLIC_SIZE],
    pub encrypted: [u8; PHASE2_ENCRYPTED_SIZE],
}

impl Phase2 {
    /// Deserialize from bytes
    pub fn from_bytes(data: &[u8]) -> NtcpResult<Self> {
        if data.len() < PHASE2_SIZE {
            return Err(NtcpError::Truncated {
                got: data.len(),
                need: PHASE2_SIZE,
            });
        }
        let mut pub_key = [0u8; DH_PUBLIC_SIZE];
        pub_key.copy_from_slice(&data[..DH_PUBLIC_SIZE]);
        let mut encrypted = [0u8; PHASE2_ENCRYPTED_SIZE];
        encrypted.copy_from_slice(&data[DH_PUBLIC_SIZE..PHASE2_SIZE]);
        Ok(Self { pub_key, encrypted })
    }
}

/// Progress of the responder's phase-3 processing
#[derive(Debug, PartialEq, Eq)]
pub enum Phase3Status {
    /// Identity decoded and signature verified
    Complete,
    /// This many more bytes are needed before the signature can be checked
    NeedBytes(usize),
}

/// Initiator side of the handshake
pub struct InitiatorHandshake {
    dh: Option<DhKeyPair>,
    remote_identity: RouterIdentity,
    phase1: Phase1,
    remote_y: [u8; DH_PUBLIC_SIZE],
    ts_a: u32,
    ts_b: u32,
    encryption: Option<AesCbcEncryption>,
    decryption: Option<AesCbcDecryption>,
}

impl InitiatorHandshake {
    /// Start a handshake towards a known remote identity
    pub fn new(dh: DhKeyPair, remote_identity: RouterIdentity) -> Self {
        let phase1 = Phase1::new(dh.public_key(), &remote_identity.hash());
        Self {
            dh: Some(dh),
            remote_identity,
            phase1,
            remote_y: [0u8; DH_PUBLIC_SIZE],
            ts_a: 0,
            ts_b: 0,
            encryption: None,
            decryption: None,
        }
    }

    /// The phase-1 frame to send
    pub fn phase1_bytes(&self) -> [u8; PHASE1_SIZE] {
        self.phase1.to_bytes()
    }

    /// Process the responder's phase 2: derive the session key, set up
    /// both cipher directions and verify the bound hash
    pub fn handle_phase2(&mut self, frame: &[u8]) -> NtcpResult<()> {
        let phase2 = Phase2::from_bytes(frame)?;
        let dh = self
            .dh
            .as_ref()
            .ok_or(NtcpError::InvalidState("phase 2 after keypair release"))?;

        let shared = dh.agree(&phase2.pub_key)?;
        let key = derive_session_key(&shared)?;
        let mut decryption = AesCbcDecryption::new(&key, &dh_iv(&phase2.pub_key));
        let encryption = AesCbcEncryption::new(&key, &self.phase1.iv());

        let mut block = phase2.encrypted;
        decryption.decrypt(&mut block)?;

        let expected = sha256_pair(&self.phase1.pub_key, &phase2.pub_key);
        if block[..SHA256_SIZE] != expected {
            return Err(NtcpError::IncorrectHash);
        }
        self.ts_b = u32::from_be_bytes([block[32], block[33], block[34], block[35]]);
        self.remote_y = phase2.pub_key;
        self.encryption = Some(encryption);
        self.decryption = Some(decryption);
        Ok(())
    }

    /// Build and encrypt the phase-3 frame:
    /// `[2B identity size][identity][4B tsA][random padding][signature]`
    pub fn phase3_bytes(&mut self, keys: &RouterKeys) -> NtcpResult<Vec<u8>> {
        self.ts_a = unix_seconds();

        let ident_bytes = keys.identity().to_bytes();
        let unpadded = 2 + ident_bytes.len() + 4 + keys.identity().signature_len();
        let total = aligned16(unpadded);

        let mut buf = Vec::with_capacity(total);
        buf.extend_from_slice(&(ident_bytes.len() as u16).to_be_bytes());
        buf.extend_from_slice(&ident_bytes);
        buf.extend_from_slice(&self.ts_a.to_be_bytes());
        let mut filler = vec![0u8; total - unpadded];
        rand::thread_rng().fill_bytes(&mut filler);
        buf.extend_from_slice(&filler);

        let data = signed_data(
            &self.phase1.pub_key,
            &self.remote_y,
            &self.remote_identity.hash(),
            self.ts_a,
            self.ts_b,
        );
        buf.extend_from_slice(&keys.sign(&data));

        self.encryption
            .as_mut()
            .ok_or(NtcpError::InvalidState("phase 3 before phase 2"))?
            .encrypt(&mut buf)?;
        Ok(buf)
    }

    /// Size of the phase-4 frame to expect from the responder
    pub fn phase4_len(&self) -> usize {
        aligned16(self.remote_identity.signature_len())
    }

    /// Decrypt and verify the responder's phase 4
    pub fn handle_phase4(&mut self, frame: &mut [u8], keys: &RouterKeys) -> NtcpResult<()> {
        self.decryption
            .as_mut()
            .ok_or(NtcpError::InvalidState("phase 4 before phase 2"))?
            .decrypt(frame)?;

        let sig_len = self.remote_identity.signature_len();
        if frame.len() < sig_len {
            return Err(NtcpError::Truncated {
                got: frame.len(),
                need: sig_len,
            });
        }
        let data = signed_data(
            &self.phase1.pub_key,
            &self.remote_y,
            &keys.hash(),
            self.ts_a,
            self.ts_b,
        );
        self.remote_identity
            .verify(&data, &frame[..sig_len])
            .map_err(|_| NtcpError::SignatureFailed)
    }

    /// Reclaim the DH keypair for the transport's pool after a phase-2
    /// failure
    pub fn take_keypair(&mut self) -> Option<DhKeyPair> {
        self.dh.take()
    }

    /// Hand over the established cipher pair, releasing the handshake
    /// scratch state
    pub fn into_ciphers(self) -> NtcpResult<(AesCbcEncryption, AesCbcDecryption)> {
        match (self.encryption, self.decryption) {
            (Some(encryption), Some(decryption)) => Ok((encryption, decryption)),
            _ => Err(NtcpError::InvalidState("handshake incomplete")),
        }
    }
}

/// Responder side of the handshake
pub struct ResponderHandshake {
    dh: Option<DhKeyPair>,
    phase1: Option<Phase1>,
    public_y: [u8; DH_PUBLIC_SIZE],
    remote_identity: Option<RouterIdentity>,
    phase3_buf: Vec<u8>,
    ts_a: u32,
    ts_b: u32,
    encryption: Option<AesCbcEncryption>,
    decryption: Option<AesCbcDecryption>,
}

impl ResponderHandshake {
    /// Start the responder side with a keypair from the pool
    pub fn new(dh: DhKeyPair) -> Self {
        Self {
            dh: Some(dh),
            phase1: None,
            public_y: [0u8; DH_PUBLIC_SIZE],
            remote_identity: None,
            phase3_buf: Vec::new(),
            ts_a: 0,
            ts_b: 0,
            encryption: None,
            decryption: None,
        }
    }

    /// Process phase 1 and check it was addressed to us
    pub fn handle_phase1(&mut self, frame: &[u8], local_ident: &IdentHash) -> NtcpResult<()> {
        let phase1 = Phase1::from_bytes(frame)?;
        phase1.verify(local_ident)?;
        self.phase1 = Some(phase1);
        Ok(())
    }

    /// Build the phase-2 frame, deriving the session key and setting up
    /// both cipher directions
    pub fn phase2_bytes(&mut self) -> NtcpResult<Vec<u8>> {
        let phase1 = self
            .phase1
            .as_ref()
            .ok_or(NtcpError::InvalidState("phase 2 before phase 1"))?;
        let dh = self
            .dh
            .as_ref()
            .ok_or(NtcpError::InvalidState("phase 2 after keypair release"))?;

        let y = *dh.public_key();
        let shared = dh.agree(&phase1.pub_key)?;
        let key = derive_session_key(&shared)?;
        let mut encryption = AesCbcEncryption::new(&key, &dh_iv(&y));
        let decryption = AesCbcDecryption::new(&key, &phase1.iv());

        self.ts_b = unix_seconds();
        let hxy = sha256_pair(&phase1.pub_key, &y);
        let mut block = [0u8; PHASE2_ENCRYPTED_SIZE];
        block[..SHA256_SIZE].copy_from_slice(&hxy);
        block[32..36].copy_from_slice(&self.ts_b.to_be_bytes());
        rand::thread_rng().fill_bytes(&mut block[36..]);
        encryption.encrypt(&mut block)?;

        self.public_y = y;
        self.encryption = Some(encryption);
        self.decryption = Some(decryption);

        let mut out = Vec::with_capacity(PHASE2_SIZE);
        out.extend_from_slice(&y);
        out.extend_from_slice(&block);
        Ok(out)
    }

    /// Process a phase-3 chunk. The first chunk is the fixed 448-byte
    /// initial read; if the decoded identity demands more, the returned
    /// status says how many bytes the continuation read must fetch.
    pub fn handle_phase3(
        &mut self,
        chunk: &mut [u8],
        local_ident: &IdentHash,
    ) -> NtcpResult<Phase3Status> {
        self.decryption
            .as_mut()
            .ok_or(NtcpError::InvalidState("phase 3 before phase 2"))?
            .decrypt(chunk)?;
        self.phase3_buf.extend_from_slice(chunk);

        if self.remote_identity.is_none() {
            if self.phase3_buf.len() < NTCP_DEFAULT_PHASE3_SIZE {
                return Err(NtcpError::Truncated {
                    got: self.phase3_buf.len(),
                    need: NTCP_DEFAULT_PHASE3_SIZE,
                });
            }
            // The identity and tsA must fit the initial read; only the
            // padding and signature may spill into the continuation.
            let size = u16::from_be_bytes([self.phase3_buf[0], self.phase3_buf[1]]) as usize;
            if 2 + size + 4 > NTCP_DEFAULT_PHASE3_SIZE {
                return Err(NtcpError::MalformedIdentitySize(size));
            }
            let (identity, consumed) = RouterIdentity::from_bytes(&self.phase3_buf[2..2 + size])?;
            if consumed != size {
                return Err(NtcpError::MalformedIdentitySize(size));
            }
            self.remote_identity = Some(identity);
        }

        let identity = self
            .remote_identity
            .as_ref()
            .ok_or(NtcpError::InvalidState("phase 3 identity missing"))?;
        let total = aligned16(2 + identity.len() + 4 + identity.signature_len());
        if self.phase3_buf.len() < total {
            return Ok(Phase3Status::NeedBytes(total - self.phase3_buf.len()));
        }

        self.verify_phase3(local_ident)?;
        Ok(Phase3Status::Complete)
    }

    fn verify_phase3(&mut self, local_ident: &IdentHash) -> NtcpResult<()> {
        let identity = self
            .remote_identity
            .as_ref()
            .ok_or(NtcpError::InvalidState("phase 3 identity missing"))?;
        let phase1 = self
            .phase1
            .as_ref()
            .ok_or(NtcpError::InvalidState("phase 3 before phase 1"))?;

        let ts_off = 2 + identity.len();
        let ts_a = u32::from_be_bytes([
            self.phase3_buf[ts_off],
            self.phase3_buf[ts_off + 1],
            self.phase3_buf[ts_off + 2],
            self.phase3_buf[ts_off + 3],
        ]);
        let sig_len = identity.signature_len();
        let unpadded = ts_off + 4 + sig_len;
        let sig_off = ts_off + 4 + (aligned16(unpadded) - unpadded);

        let data = signed_data(&phase1.pub_key, &self.public_y, local_ident, ts_a, self.ts_b);
        identity
            .verify(&data, &self.phase3_buf[sig_off..sig_off + sig_len])
            .map_err(|_| NtcpError::SignatureFailed)?;
        self.ts_a = ts_a;
        Ok(())
    }

    /// Build and encrypt the phase-4 frame: our signature, padded to the
    /// block boundary
    pub fn phase4_bytes(&mut self, keys: &RouterKeys) -> NtcpResult<Vec<u8>> {
        let identity = self
            .remote_identity
            .as_ref()
            .ok_or(NtcpError::InvalidState("phase 4 before phase 3"))?;
        let phase1 = self
            .phase1
            .as_ref()
            .ok_or(NtcpError::InvalidState("phase 4 before phase 1"))?;

        let data = signed_data(
            &phase1.pub_key,
            &self.public_y,
            &identity.hash(),
            self.ts_a,
            self.ts_b,
        );
        let sig = keys.sign(&data);
        let total = aligned16(sig.len());
        let mut buf = Vec::with_capacity(total);
        buf.extend_from_slice(&sig);
        let mut filler = vec![0u8; total - sig.len()];
        rand::thread_rng().fill_bytes(&mut filler);
        buf.extend_from_slice(&filler);

        self.encryption
            .as_mut()
            .ok_or(NtcpError::InvalidState("phase 4 before phase 2"))?
            .encrypt(&mut buf)?;
        Ok(buf)
    }

    /// Remote identity, once learned from phase 3
    pub fn remote_identity(&self) -> Option<&RouterIdentity> {
        self.remote_identity.as_ref()
    }

    /// Reclaim the DH keypair for the transport's pool
    pub fn take_keypair(&mut self) -> Option<DhKeyPair> {
        self.dh.take()
    }

    /// Hand over the established cipher pair and the learned identity,
    /// releasing the handshake scratch state
    pub fn into_ciphers(self) -> NtcpResult<(AesCbcEncryption, AesCbcDecryption, RouterIdentity)> {
        match (self.encryption, self.decryption, self.remote_identity) {
            (Some(encryption), Some(decryption), Some(identity)) => {
                Ok((encryption, decryption, identity))
            }
            _ => Err(NtcpError::InvalidState("handshake incomplete")),
        }
    }
}

//! Frame Engine
//!
//! Outbound frames wrap an I2NP payload as
//!
//! ```text
//! [2 bytes BE length][payload][padding][4 bytes BE Adler-32]
//! ```
//!
//! padded so the whole frame is a multiple of 16 bytes, then encrypted
//! through the session's chained CBC context. A zero length field marks a
//! keepalive whose body is a 4-byte wall-clock timestamp.
//!
//! Inbound, ciphertext lands in a staging buffer and is consumed one
//! 16-byte block at a time: the first block of a frame carries the length
//! prefix, later blocks fill the message under reassembly, and the final
//! block carries the checksum. Whatever tail is shorter than a block
//! stays staged for the next read.

use rand::RngCore;
use tracing::debug;

use opal_core::{unix_seconds, I2npMessage};
use opal_crypto::{adler32, AesCbcDecryption, AesCbcEncryption, ADLER32_SIZE, AES_BLOCK_SIZE};

use crate::constants::{aligned16, NTCP_BUFFER_SIZE, NTCP_MAX_MESSAGE_SIZE};
use crate::errors::{NtcpError, NtcpResult};

/// Frames and encrypts outbound messages
pub struct FrameWriter {
    encryption: AesCbcEncryption,
}

impl FrameWriter {
    /// Take ownership of the session's encryption context
    pub fn new(encryption: AesCbcEncryption) -> Self {
        Self { encryption }
    }

    /// Frame and encrypt an I2NP payload
    ///
    /// An empty payload goes out as a keepalive.
    pub fn frame_message(&mut self, payload: &[u8]) -> NtcpResult<Vec<u8>> {
        if payload.is_empty() {
            return self.frame_keepalive();
        }
        if payload.len() > NTCP_MAX_MESSAGE_SIZE {
            return Err(NtcpError::OversizedFrame {
                len: payload.len(),
                max: NTCP_MAX_MESSAGE_SIZE,
            });
        }
        self.build(payload.len() as u16, payload)
    }

    /// Frame and encrypt a keepalive carrying the current wall clock
    pub fn frame_keepalive(&mut self) -> NtcpResult<Vec<u8>> {
        self.build(0, &unix_seconds().to_be_bytes())
    }

    fn build(&mut self, length_field: u16, body: &[u8]) -> NtcpResult<Vec<u8>> {
        let padding = (AES_BLOCK_SIZE - ((body.len() + 6) % AES_BLOCK_SIZE)) % AES_BLOCK_SIZE;
        let mut frame = Vec::with_capacity(body.len() + 6 + padding);
        frame.extend_from_slice(&length_field.to_be_bytes());
        frame.extend_from_slice(body);
        let mut filler = vec![0u8; padding];
        rand::thread_rng().fill_bytes(&mut filler);
        frame.extend_from_slice(&filler);
        let checksum = adler32(&frame);
        frame.extend_from_slice(&checksum.to_be_bytes());

        self.encryption.encrypt(&mut frame)?;
        Ok(frame)
    }
}

/// A message being reassembled from inbound blocks
struct PendingMessage {
    /// Decrypted frame bytes, block-aligned
    buf: Vec<u8>,
    /// Blocks written so far, in bytes
    offset: usize,
    /// Payload length from the frame header
    data_len: usize,
}

/// Decrypts and reassembles inbound frames
pub struct FrameReader {
    decryption: AesCbcDecryption,
    staging: Box<[u8; NTCP_BUFFER_SIZE]>,
    staged: usize,
    pending: Option<PendingMessage>,
}

impl FrameReader {
    /// Take ownership of the session's decryption context
    pub fn new(decryption: AesCbcDecryption) -> Self {
        Self {
            decryption,
            staging: Box::new([0u8; NTCP_BUFFER_SIZE]),
            staged: 0,
            pending: None,
        }
    }

    /// Consume a chunk of ciphertext from the socket, returning any
    /// messages completed by it
    pub fn feed(&mut self, mut chunk: &[u8]) -> NtcpResult<Vec<I2npMessage>> {
        let mut completed = Vec::new();
        while !chunk.is_empty() {
            let take = chunk.len().min(NTCP_BUFFER_SIZE - self.staged);
            self.staging[self.staged..self.staged + take].copy_from_slice(&chunk[..take]);
            self.staged += take;
            chunk = &chunk[take..];

            let mut pos = 0;
            while self.staged - pos >= AES_BLOCK_SIZE {
                let mut block = [0u8; AES_BLOCK_SIZE];
                block.copy_from_slice(&self.staging[pos..pos + AES_BLOCK_SIZE]);
                self.next_block(&block, &mut completed)?;
                pos += AES_BLOCK_SIZE;
            }
            // keep the sub-block tail for the next read
            if pos > 0 && self.staged > pos {
                self.staging.copy_within(pos..self.staged, 0);
            }
            self.staged -= pos;
        }
        Ok(completed)
    }

    /// Decrypt one 16-byte block and advance reassembly
    fn next_block(&mut self, block: &[u8], out: &mut Vec<I2npMessage>) -> NtcpResult<()> {
        match self.pending.as_mut() {
            None => {
                // new frame, header expected
                let mut first = [0u8; AES_BLOCK_SIZE];
                self.decryption.decrypt_block(block, &mut first)?;
                let data_len = u16::from_be_bytes([first[0], first[1]]) as usize;
                if data_len == 0 {
                    // keepalive; the rest of the block is timestamp,
                    // padding and checksum
                    debug!("timestamp frame");
                    return Ok(());
                }
                if data_len > NTCP_MAX_MESSAGE_SIZE {
                    return Err(NtcpError::OversizedFrame {
                        len: data_len,
                        max: NTCP_MAX_MESSAGE_SIZE,
                    });
                }
                let mut buf = vec![0u8; aligned16(data_len + 2 + ADLER32_SIZE)];
                buf[..AES_BLOCK_SIZE].copy_from_slice(&first);
                self.pending = Some(PendingMessage {
                    buf,
                    offset: AES_BLOCK_SIZE,
                    data_len,
                });
            }
            Some(msg) => {
                // frame continues
                self.decryption
                    .decrypt_block(block, &mut msg.buf[msg.offset..])?;
                msg.offset += AES_BLOCK_SIZE;
            }
        }

        let complete = self
            .pending
            .as_ref()
            .is_some_and(|msg| msg.offset >= msg.data_len + 2 + ADLER32_SIZE);
        if complete {
            if let Some(msg) = self.pending.take() {
                let total = msg.buf.len();
                let expected = u32::from_be_bytes([
                    msg.buf[total - 4],
                    msg.buf[total - 3],
                    msg.buf[total - 2],
                    msg.buf[total - 1],
                ]);
                if adler32(&msg.buf[..total - ADLER32_SIZE]) != expected {
                    return Err(NtcpError::ChecksumMismatch);
                }
                out.push(I2npMessage::from_slice(&msg.buf[2..2 + msg.data_len]));
            }
        }
        Ok(())
    }
}

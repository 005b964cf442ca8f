//! # Opal NTCP
//!
//! The NTCP session core: an authenticated, encrypted, bidirectional TCP
//! session between two routers, carrying length-prefixed I2NP messages.
//!
//! ## Protocol Overview
//!
//! ```text
//! Initiator                                        Responder
//!   |                                                  |
//!   |--- Phase 1: X || H(X) ^ HI_r ------------------->|
//!   |<-- Phase 2: Y || Enc(H(X||Y) || tsB) ------------|
//!   |--- Phase 3: Enc(ident || tsA || sigA) ---------->|
//!   |<-- Phase 4: Enc(sigB) ---------------------------|
//!   |                                                  |
//!   |====== AES-256-CBC frame stream (chained IV) =====|
//!   |                                                  |
//!   |<------ [len][I2NP payload][pad][adler32] ------->|
//! ```
//!
//! The handshake derives one AES-256 key; each direction runs a single
//! CBC chain from its handshake IV through every subsequent frame. Frames
//! are 16-byte aligned, carry an Adler-32 trailer, and a zero length
//! field is a keepalive.
//!
//! Sessions live on the [`Transport`], which owns the session map, the
//! DH keypair pool and the collaborator handles (netdb, I2NP dispatcher).

pub mod config;
pub mod constants;
pub mod errors;
pub mod frame;
pub mod handshake;
pub mod session;
pub mod transport;

pub use config::*;
pub use constants::*;
pub use errors::*;
pub use frame::*;
pub use handshake::*;
pub use session::*;
pub use transport::*;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::config::*;
    pub use crate::constants::*;
    pub use crate::errors::*;
    pub use crate::frame::*;
    pub use crate::handshake::*;
    pub use crate::session::*;
    pub use crate::transport::*;
}

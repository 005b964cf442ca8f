//! # Opal Core
//!
//! Shared primitives for the Opal router:
//! - Router identities (Ed25519 signing identity + certificate section)
//!   and their SHA-256 identity hashes
//! - The opaque I2NP message value carried by the transports
//! - Collaborator traits implemented by the netdb and the I2NP dispatcher
//!
//! Everything here is transport-agnostic; the NTCP session core and the
//! reseed loader both build on these types.

pub mod errors;
pub mod identity;
pub mod message;
pub mod time;
pub mod traits;

pub use errors::*;
pub use identity::*;
pub use message::*;
pub use time::*;
pub use traits::*;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::errors::*;
    pub use crate::identity::*;
    pub use crate::message::*;
    pub use crate::time::*;
    pub use crate::traits::*;
}

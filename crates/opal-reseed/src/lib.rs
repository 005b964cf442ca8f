//! # Opal Reseed
//!
//! Seed bootstrap for the Opal router. A reseed round downloads a signed
//! SU3 archive over HTTPS, walks the ZIP stream embedded in it and hands
//! every router descriptor to the netdb, so the transports have routers
//! to dial on first start.
//!
//! ```text
//! host list --(random pick)--> GET <host>/i2pseeds.su3
//!     SU3 header (magic, types, content length)
//!         ZIP local-file records (stored / deflated / data descriptor)
//!             router descriptors --> netdb.add_router_info
//! ```
//!
//! Parsing past the SU3 header never fails hard: a malformed archive
//! yields the count of descriptors ingested before the damage.

pub mod cert;
pub mod config;
mod cursor;
pub mod errors;
pub mod http;
pub mod reseeder;
pub mod su3;
pub mod zip;

pub use cert::*;
pub use config::*;
pub use errors::*;
pub use http::*;
pub use reseeder::*;
pub use su3::*;
pub use zip::*;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::cert::*;
    pub use crate::config::*;
    pub use crate::errors::*;
    pub use crate::http::*;
    pub use crate::reseeder::*;
    pub use crate::su3::*;
    pub use crate::zip::*;
}

//! Collaborator Traits
//!
//! The session core and the reseed loader do not own router-descriptor
//! storage or I2NP dispatch; they talk to them through these traits.

use crate::identity::IdentHash;
use crate::message::I2npMessage;

/// Router-descriptor store and reachability hints
pub trait NetDb: Send + Sync {
    /// Ingest a serialized router descriptor
    fn add_router_info(&self, data: &[u8]);

    /// Mark a router identity reachable or unreachable
    fn set_unreachable(&self, ident: &IdentHash, unreachable: bool);
}

/// I2NP message dispatch
pub trait MessageHandler: Send + Sync {
    /// Handle a fully reassembled inbound message
    fn handle_message(&self, msg: I2npMessage);

    /// Build the database-store message announcing the local router
    fn create_database_store(&self) -> I2npMessage;
}

//! Ports layer (Hexagonal Architecture)
//!
//! Inbound ports are what the sealer and the operator call. Outbound ports
//! are the collaborators the engine drives: executor, ledger, transaction
//! pool, transport, backup store and validator set source.

mod inbound;
mod outbound;

pub use inbound::*;
pub use outbound::*;

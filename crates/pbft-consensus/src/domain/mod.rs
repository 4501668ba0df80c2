//! Domain layer for the PBFT engine
//!
//! Pure types and caches. Nothing here performs I/O or reads a clock.

mod backup;
mod block;
mod broadcast_cache;
mod config;
mod error;
mod message;
mod req_cache;
mod time_manager;
mod validator;

pub use backup::*;
pub use block::*;
pub use broadcast_cache::*;
pub use config::*;
pub use error::*;
pub use message::*;
pub use req_cache::*;
pub use time_manager::*;
pub use validator::*;

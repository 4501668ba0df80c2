//! # Node Runtime Library
//!
//! Runs a network of PBFT validators inside one process. The `main.rs`
//! binary wraps it with telemetry, configuration and a demo load.
//!
//! ## Layout
//!
//! - `adapters/` - in-process implementations of the engine ports
//! - `container/` - configuration and network wiring
//! - `handlers/` - per-validator sealer
//! - `supervisor` - stops every validator on the first fatal error

pub mod adapters;
pub mod container;
pub mod error;
pub mod handlers;
pub mod supervisor;

pub use container::{load_config, LocalNetwork, NodeConfig, TxInjector, ValidatorNode};
pub use error::{RuntimeError, RuntimeResult};
pub use supervisor::{FatalReporter, Supervisor};

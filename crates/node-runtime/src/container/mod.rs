//! # Validator Container
//!
//! Configuration and wiring of an in-process validator network.

pub mod config;
pub mod network;

pub use config::{load_config, ConfigError, NetworkConfig, NodeConfig, SealerConfig, StorageConfig};
pub use network::{validator_key, LocalNetwork, TxInjector, ValidatorNode};

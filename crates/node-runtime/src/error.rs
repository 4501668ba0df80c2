//! Runtime error types

use crate::container::ConfigError;
use pbft_consensus::ConsensusError;
use shared_crypto::CryptoError;
use shared_types::StorageError;
use thiserror::Error;

/// Errors raised while starting or supervising the local network
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to derive validator key: {0}")]
    Key(#[from] CryptoError),

    #[error("Failed to open backup store: {0}")]
    Backup(#[from] StorageError),

    #[error("Validator {idx} stopped: {source}")]
    Consensus {
        idx: usize,
        #[source]
        source: ConsensusError,
    },

    #[error("Validator {0} worker exited unexpectedly")]
    WorkerExited(usize),

    #[error("Runtime task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Failed to encode status: {0}")]
    Status(#[from] serde_json::Error),
}

impl RuntimeError {
    pub fn consensus(idx: usize, source: ConsensusError) -> Self {
        RuntimeError::Consensus { idx, source }
    }
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;

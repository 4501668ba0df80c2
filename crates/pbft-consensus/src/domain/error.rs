//! Error types for the PBFT engine
//!
//! Only durability problems are fatal. Everything a peer can cause is a
//! [`CheckResult`] rejection and never surfaces as an error.

use shared_types::{Hash, StorageError};

/// Consensus error types
#[derive(Debug, thiserror::Error)]
pub enum ConsensusError {
    #[error("Failed to encode {what}: {reason}")]
    Encode { what: &'static str, reason: String },

    #[error("Failed to decode {what}: {reason}")]
    Decode { what: &'static str, reason: String },

    #[error("Unknown packet kind: {0}")]
    UnknownPacketKind(u8),

    #[error("Block execution failed at height {height}: {reason}")]
    Execution { height: u64, reason: String },

    #[error("Ledger error: {0}")]
    Ledger(String),

    #[error("Validator set unavailable: {0}")]
    ValidatorSet(String),

    #[error("Missing execution result for block {0:?}")]
    MissingExecution(Hash),

    #[error("Failed to write committed prepare to backup: {0}")]
    BackupWrite(StorageError),

    #[error("Failed to read committed prepare from backup: {0}")]
    BackupRead(StorageError),

    #[error("Insufficient disk space at {path}: {available} bytes free, {required} required")]
    InsufficientDiskSpace {
        path: String,
        available: u64,
        required: u64,
    },

    #[error("Consensus worker stopped")]
    WorkerStopped,
}

impl ConsensusError {
    /// Errors after which the node must shut down rather than keep voting.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ConsensusError::BackupWrite(_) | ConsensusError::InsufficientDiskSpace { .. }
        )
    }
}

impl From<StorageError> for ConsensusError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::DiskFull {
                path,
                available,
                required,
            } => ConsensusError::InsufficientDiskSpace {
                path,
                available,
                required,
            },
            other => ConsensusError::BackupWrite(other),
        }
    }
}

/// Result type for consensus operations
pub type ConsensusResult<T> = Result<T, ConsensusError>;

/// Outcome of validating an inbound request against local round state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CheckResult {
    Valid,
    /// Belongs to a round this node has not reached yet.
    Future,
    Invalid,
}

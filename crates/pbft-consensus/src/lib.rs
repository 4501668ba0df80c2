//! # pbft-consensus
//!
//! PBFT consensus engine for a permissioned chain with a fixed, ordered
//! validator set.
//!
//! ## Architecture
//!
//! The engine agrees on one block per height. With `n` validators it
//! tolerates `f = (n - 1) / 3` faulty ones and needs `n - f` votes for a
//! quorum.
//!
//! ```text
//!  leader            validators              ledger
//!    │  prepare (block) ──→ │                   │
//!    │ ←── sign (2f+1) ───→ │  backup committed │
//!    │ ←── commit (2f+1) ─→ │ ──── append ────→ │
//! ```
//!
//! When a round stalls the validators vote to move to a higher view,
//! which hands leadership to the next validator in line.
//!
//! ### Crash safety
//!
//! The prepare that reached the sign quorum is written to the backup store
//! before this node votes commit. On restart it is re-proposed, so a block
//! the network may already have committed is never replaced by another.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pbft_consensus::{PbftDependencies, PbftEngine, PbftWorker};
//!
//! let engine = Arc::new(PbftEngine::new(deps, key));
//! let handle = PbftWorker::start(engine).await?;
//!
//! // Transport: hand inbound packets to the worker
//! handle.queue().push(peer, packet)?;
//!
//! // Sealer
//! if handle.should_seal().await? {
//!     handle.generate_prepare(block).await?;
//! }
//! ```

pub mod adapters;
pub mod domain;
pub mod events;
pub mod metrics;
pub mod ports;
pub mod service;
pub mod state;
pub mod validation;
pub mod worker;

// Re-export main types
pub use adapters::InMemoryBackupStore;
pub use domain::{
    Block, BlockHeader, ChainHead, CheckResult, ConsensusError, ConsensusResult, ExecutionResult,
    PacketKind, PbftConfig, PbftMsgPacket, Transaction, ValidatorSet,
};
pub use events::{ConsensusEvent, Hooks};
pub use ports::{
    BackupStore, CommitResult, ConsensusApi, Executor, Ledger, TimeSource, Transport, TxPool,
    ValidatorSetProvider,
};
pub use service::{ConsensusStatus, PbftDependencies, PbftEngine};
pub use worker::{MsgQueue, PbftClient, PbftWorker, PbftWorkerHandle};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pbft_config_default() {
        let config = PbftConfig::default();
        assert_eq!(config.view_timeout_ms, 3_000);
        assert_eq!(config.max_ttl, 2);
        assert!(config.omit_empty_block);
    }
}

//! Driven ports (Outbound dependencies)
//!
//! All calls are synchronous. The engine invokes them from its worker
//! thread while holding the round lock, so implementations must not call
//! back into the engine.

use crate::domain::{Block, ChainHead, ExecutionResult, ValidatorSet};
use shared_types::{Hash, NodeId, StorageError};
use std::sync::Arc;

/// Block execution engine
pub trait Executor: Send + Sync {
    /// Apply the block's transactions to state.
    ///
    /// An error abandons the round; the node waits for a timeout or a
    /// different proposal.
    fn execute(&self, block: &Block) -> Result<ExecutionResult, String>;
}

/// Outcome of a ledger append
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommitResult {
    Ok,
    Failed(String),
}

/// Durable chain storage
pub trait Ledger: Send + Sync {
    /// Highest appended block
    fn head(&self) -> ChainHead;

    /// Hash of the appended block at `number`, if any
    fn block_hash_at(&self, number: u64) -> Option<Hash>;

    /// Append a block carrying its commit signature list
    fn commit_block(&self, block: Block, exec: Arc<ExecutionResult>) -> CommitResult;
}

/// Transaction pool
pub trait TxPool: Send + Sync {
    /// Remove transactions that made it into `block`
    fn drop_handled(&self, block: &Block);

    /// Transactions still waiting to be packed
    fn pending_count(&self) -> usize;
}

/// Peer-to-peer transport
///
/// Delivers opaque encoded packets. Inbound packets are pushed into the
/// worker queue by the transport itself.
pub trait Transport: Send + Sync {
    /// Fire-and-forget send to one peer
    fn send_to(&self, peer: &NodeId, packet: Vec<u8>);

    /// Peers with a live session
    fn connected_peers(&self) -> Vec<NodeId>;
}

/// Key/value store backing the committed-prepare slot
pub trait BackupStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Must be durable when it returns `Ok`
    fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError>;
}

/// Source of the current validator set
///
/// Queried at start and after every chain append. A changed set replaces
/// the engine's copy wholesale.
pub trait ValidatorSetProvider: Send + Sync {
    fn validator_set(&self) -> Result<ValidatorSet, String>;
}

/// Time source
pub trait TimeSource: Send + Sync {
    /// Current unix timestamp in milliseconds
    fn now_ms(&self) -> u64;
}

/// Default time source using system time
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now_ms(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

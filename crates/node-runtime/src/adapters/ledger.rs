//! In-memory ledger

use parking_lot::RwLock;
use pbft_consensus::domain::genesis_block;
use pbft_consensus::{Block, ChainHead, CommitResult, ExecutionResult, Ledger};
use shared_types::Hash;
use std::sync::Arc;
use tracing::debug;

/// Append-only chain starting at the shared genesis block
pub struct InMemoryLedger {
    blocks: RwLock<Vec<Block>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self {
            blocks: RwLock::new(vec![genesis_block()]),
        }
    }

    pub fn height(&self) -> u64 {
        self.head().number
    }

    pub fn block(&self, number: u64) -> Option<Block> {
        self.blocks.read().get(number as usize).cloned()
    }

    /// Transactions appended so far, genesis excluded.
    pub fn transaction_count(&self) -> usize {
        self.blocks
            .read()
            .iter()
            .map(|block| block.transactions.len())
            .sum()
    }
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl Ledger for InMemoryLedger {
    fn head(&self) -> ChainHead {
        let blocks = self.blocks.read();
        blocks
            .last()
            .map(|block| ChainHead::new(block.number(), block.hash()))
            .unwrap_or_else(|| ChainHead::genesis(&genesis_block()))
    }

    fn block_hash_at(&self, number: u64) -> Option<Hash> {
        self.blocks.read().get(number as usize).map(Block::hash)
    }

    fn commit_block(&self, block: Block, exec: Arc<ExecutionResult>) -> CommitResult {
        let mut blocks = self.blocks.write();
        let Some(parent) = blocks.last() else {
            return CommitResult::Failed("ledger has no genesis block".into());
        };
        if block.number() != parent.number() + 1 {
            return CommitResult::Failed(format!(
                "expected block {}, got {}",
                parent.number() + 1,
                block.number()
            ));
        }
        if block.header.parent_hash != parent.hash() {
            return CommitResult::Failed("parent hash does not match head".into());
        }
        if block.header.state_root != exec.state_root {
            return CommitResult::Failed("state root does not match execution".into());
        }
        debug!(height = block.number(), txs = block.transactions.len(), "Appended block");
        blocks.push(block);
        CommitResult::Ok
    }
}

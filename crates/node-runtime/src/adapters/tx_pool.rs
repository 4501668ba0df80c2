//! In-memory transaction pool

use parking_lot::Mutex;
use pbft_consensus::{Block, Transaction, TxPool};
use shared_types::Hash;
use std::collections::HashSet;
use tracing::trace;

/// FIFO pool keyed by transaction hash
#[derive(Default)]
pub struct InMemoryTxPool {
    pending: Mutex<Vec<(Hash, Transaction)>>,
}

impl InMemoryTxPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a transaction. Returns false for a duplicate.
    pub fn submit(&self, tx: Transaction) -> bool {
        let hash = tx.hash();
        let mut pending = self.pending.lock();
        if pending.iter().any(|(h, _)| *h == hash) {
            return false;
        }
        pending.push((hash, tx));
        true
    }

    /// Up to `max` oldest transactions not in `filter`. They stay queued
    /// until a block carrying them is committed.
    pub fn pending(&self, max: usize, filter: &HashSet<Hash>) -> Vec<Transaction> {
        self.pending
            .lock()
            .iter()
            .filter(|(hash, _)| !filter.contains(hash))
            .take(max)
            .map(|(_, tx)| tx.clone())
            .collect()
    }
}

impl TxPool for InMemoryTxPool {
    fn drop_handled(&self, block: &Block) {
        let handled: HashSet<Hash> = block.tx_hashes().into_iter().collect();
        let mut pending = self.pending.lock();
        let before = pending.len();
        pending.retain(|(hash, _)| !handled.contains(hash));
        trace!(dropped = before - pending.len(), "Dropped handled transactions");
    }

    fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pbft_consensus::domain::genesis_block;

    fn tx(nonce: u64) -> Transaction {
        Transaction::new(nonce, nonce.to_le_bytes().to_vec())
    }

    #[test]
    fn test_submit_dedups_and_keeps_order() {
        let pool = InMemoryTxPool::new();
        assert!(pool.submit(tx(1)));
        assert!(pool.submit(tx(2)));
        assert!(!pool.submit(tx(1)));
        assert_eq!(pool.pending_count(), 2);
        assert_eq!(pool.pending(10, &HashSet::new()), vec![tx(1), tx(2)]);
        assert_eq!(pool.pending(1, &HashSet::new()), vec![tx(1)]);
    }

    #[test]
    fn test_filter_and_drop_handled() {
        let pool = InMemoryTxPool::new();
        for nonce in 1..=3 {
            pool.submit(tx(nonce));
        }
        let filter: HashSet<Hash> = [tx(1).hash()].into_iter().collect();
        assert_eq!(pool.pending(10, &filter), vec![tx(2), tx(3)]);

        let block = Block::new(1, genesis_block().hash(), 0, 1, vec![tx(1), tx(3)]);
        pool.drop_handled(&block);
        assert_eq!(pool.pending(10, &HashSet::new()), vec![tx(2)]);
    }
}

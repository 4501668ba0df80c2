//! Block domain entities
//!
//! The engine never interprets transactions. It only needs a block to be
//! hashable, encodable and to carry the commit signature list once a quorum
//! has been observed.

use super::{ConsensusError, ConsensusResult};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, Bytes};
use shared_crypto::{keccak256, Keccak256Hasher};
use shared_types::{Hash, Signature, ZERO_HASH};

/// An opaque transaction as seen by consensus.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub nonce: u64,
    pub payload: Vec<u8>,
}

impl Transaction {
    pub fn new(nonce: u64, payload: Vec<u8>) -> Self {
        Self { nonce, payload }
    }

    /// Keccak-256 over the nonce and payload.
    pub fn hash(&self) -> Hash {
        let mut hasher = Keccak256Hasher::new();
        hasher.update(self.nonce.to_le_bytes()).update(&self.payload);
        hasher.finalize()
    }
}

/// Block header
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub number: u64,
    pub parent_hash: Hash,
    /// Unix millis at sealing time
    pub timestamp: u64,
    /// Index of the sealing validator
    pub sealer: u64,
    pub tx_root: Hash,
    /// Filled in by the executor
    pub state_root: Hash,
}

impl BlockHeader {
    /// Compute the hash of this block header
    pub fn hash(&self) -> Hash {
        let mut hasher = Keccak256Hasher::new();
        hasher
            .update(self.number.to_le_bytes())
            .update(self.parent_hash)
            .update(self.timestamp.to_le_bytes())
            .update(self.sealer.to_le_bytes())
            .update(self.tx_root)
            .update(self.state_root);
        hasher.finalize()
    }
}

/// A candidate or committed block.
///
/// `sig_list` is excluded from the hash; it is attached after the commit
/// quorum and lets any peer re-verify the decision independently.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
    #[serde_as(as = "Vec<(_, Bytes)>")]
    pub sig_list: Vec<(u64, Signature)>,
}

impl Block {
    /// Build an unexecuted block on top of `parent`.
    pub fn new(
        number: u64,
        parent_hash: Hash,
        sealer: u64,
        timestamp: u64,
        transactions: Vec<Transaction>,
    ) -> Self {
        let tx_root = transactions_root(&transactions);
        Self {
            header: BlockHeader {
                number,
                parent_hash,
                timestamp,
                sealer,
                tx_root,
                state_root: ZERO_HASH,
            },
            transactions,
            sig_list: Vec::new(),
        }
    }

    pub fn hash(&self) -> Hash {
        self.header.hash()
    }

    pub fn number(&self) -> u64 {
        self.header.number
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    pub fn tx_hashes(&self) -> Vec<Hash> {
        self.transactions.iter().map(Transaction::hash).collect()
    }

    pub fn encode(&self) -> ConsensusResult<Vec<u8>> {
        bincode::serialize(self).map_err(|e| ConsensusError::Encode {
            what: "block",
            reason: e.to_string(),
        })
    }

    pub fn decode(bytes: &[u8]) -> ConsensusResult<Self> {
        bincode::deserialize(bytes).map_err(|e| ConsensusError::Decode {
            what: "block",
            reason: e.to_string(),
        })
    }
}

/// Root over the transaction hashes, in block order.
pub fn transactions_root(transactions: &[Transaction]) -> Hash {
    if transactions.is_empty() {
        return ZERO_HASH;
    }
    let mut hasher = Keccak256Hasher::new();
    for tx in transactions {
        hasher.update(tx.hash());
    }
    hasher.finalize()
}

/// Post-execution handle produced by the executor.
///
/// The engine keeps it alongside the working prepare and passes it back to
/// the ledger on commit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutionResult {
    pub state_root: Hash,
    pub tx_count: usize,
    /// Opaque executor state, handed back to the ledger untouched
    pub context: Vec<u8>,
}

impl ExecutionResult {
    pub fn new(state_root: Hash, tx_count: usize) -> Self {
        Self {
            state_root,
            tx_count,
            context: Vec::new(),
        }
    }
}

/// Current chain head (the highest durably appended block)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainHead {
    pub number: u64,
    pub hash: Hash,
}

impl ChainHead {
    pub fn new(number: u64, hash: Hash) -> Self {
        Self { number, hash }
    }

    /// Head of a chain holding only the genesis block.
    pub fn genesis(genesis: &Block) -> Self {
        Self::new(genesis.number(), genesis.hash())
    }
}

/// Genesis block shared by every validator of a test or local network.
pub fn genesis_block() -> Block {
    let mut block = Block::new(0, ZERO_HASH, 0, 0, Vec::new());
    block.header.state_root = keccak256(b"genesis");
    block
}

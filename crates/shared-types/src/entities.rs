//! # Core Entities
//!
//! Byte-level identifiers shared across the node.

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, Bytes};
use std::fmt;

/// A 32-byte Keccak-256 digest.
pub type Hash = [u8; 32];

/// A 64-byte secp256k1 ECDSA signature in `r || s` form.
pub type Signature = [u8; 64];

/// The all-zero hash, used as the parent of the genesis block.
pub const ZERO_HASH: Hash = [0u8; 32];

/// Identity of a validator: its compressed secp256k1 public key.
///
/// The identity is stable for as long as the validator keeps its key, and
/// doubles as the verification key for every message the validator signs.
#[serde_as]
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(#[serde_as(as = "Bytes")] pub [u8; 33]);

impl NodeId {
    /// Raw compressed key bytes.
    pub fn as_bytes(&self) -> &[u8; 33] {
        &self.0
    }

    /// First four bytes in hex, for log lines.
    pub fn abridged(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self([0u8; 33])
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.abridged())
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// First four bytes of a hash in hex, for log lines.
pub fn abridged(hash: &Hash) -> String {
    hex::encode(&hash[..4])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_bincode_is_fixed_width() {
        let id = NodeId([7u8; 33]);
        let bytes = bincode::serialize(&id).unwrap();
        let decoded: NodeId = bincode::deserialize(&bytes).unwrap();
        assert_eq!(decoded, id);
    }

    #[test]
    fn test_abridged_formats() {
        let id = NodeId([0xABu8; 33]);
        assert_eq!(id.abridged(), "abababab");
        assert_eq!(abridged(&[0x01u8; 32]), "01010101");
        assert_eq!(format!("{:?}", id), "NodeId(abababab)");
    }
}

//! PBFT request types and the network envelope
//!
//! Every request shares the fixed fields of [`PbftMsg`] by composition. The
//! four request kinds form the [`PbftRequest`] sum type, dispatched on its
//! tag. Encoding is bincode, which writes fields in declaration order.
//!
//! Each message carries two signatures from its sender:
//!
//! - `sig` over `block_hash`
//! - `sig2` over `keccak(height || view || idx || timestamp)`

use super::{Block, ConsensusError, ConsensusResult, ExecutionResult};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, Bytes};
use shared_crypto::{keccak256_many, verify_signature, Secp256k1KeyPair};
use shared_types::{Hash, NodeId, Signature};
use std::fmt;
use std::sync::Arc;

/// Wire tag of a request kind
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum PacketKind {
    Prepare = 0,
    Sign = 1,
    Commit = 2,
    ViewChange = 3,
}

impl PacketKind {
    pub const ALL: [PacketKind; 4] = [
        PacketKind::Prepare,
        PacketKind::Sign,
        PacketKind::Commit,
        PacketKind::ViewChange,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PacketKind::Prepare => "prepare",
            PacketKind::Sign => "sign",
            PacketKind::Commit => "commit",
            PacketKind::ViewChange => "view_change",
        }
    }
}

impl TryFrom<u8> for PacketKind {
    type Error = ConsensusError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(PacketKind::Prepare),
            1 => Ok(PacketKind::Sign),
            2 => Ok(PacketKind::Commit),
            3 => Ok(PacketKind::ViewChange),
            other => Err(ConsensusError::UnknownPacketKind(other)),
        }
    }
}

impl From<PacketKind> for u8 {
    fn from(kind: PacketKind) -> Self {
        kind as u8
    }
}

impl fmt::Display for PacketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fields common to every request kind
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PbftMsg {
    pub height: u64,
    pub view: u64,
    /// Sender's validator index at send time
    pub idx: u64,
    /// Unix millis
    pub timestamp: u64,
    pub block_hash: Hash,
    #[serde_as(as = "Bytes")]
    pub sig: Signature,
    #[serde_as(as = "Bytes")]
    pub sig2: Signature,
}

impl PbftMsg {
    /// Build and sign a message.
    pub fn new_signed(
        key: &Secp256k1KeyPair,
        height: u64,
        view: u64,
        idx: u64,
        timestamp: u64,
        block_hash: Hash,
    ) -> Self {
        let mut msg = Self {
            height,
            view,
            idx,
            timestamp,
            block_hash,
            sig: [0u8; 64],
            sig2: [0u8; 64],
        };
        msg.sign(key);
        msg
    }

    /// Recompute both signatures with `key`.
    pub fn sign(&mut self, key: &Secp256k1KeyPair) {
        self.sig = key.sign(&self.block_hash).into_bytes();
        self.sig2 = key.sign(&self.field_hash()).into_bytes();
    }

    /// Digest of the round fields covered by `sig2`.
    pub fn field_hash(&self) -> Hash {
        keccak256_many(&[
            &self.height.to_le_bytes(),
            &self.view.to_le_bytes(),
            &self.idx.to_le_bytes(),
            &self.timestamp.to_le_bytes(),
        ])
    }

    /// Both signatures must verify against `signer`.
    pub fn verify(&self, signer: &NodeId) -> bool {
        verify_signature(signer, &self.block_hash, &self.sig)
            && verify_signature(signer, &self.field_hash(), &self.sig2)
    }

    /// Broadcast dedup key: hex of `sig` followed by hex of `sig2`.
    pub fn unique_key(&self) -> String {
        let mut key = hex::encode(self.sig);
        key.push_str(&hex::encode(self.sig2));
        key
    }
}

/// Pre-prepare: a proposed block from the round leader.
///
/// `exec` is local state attached after execution and never leaves the node.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PrepareReq {
    pub msg: PbftMsg,
    /// Encoded [`Block`]
    pub block: Vec<u8>,
    #[serde(skip)]
    pub exec: Option<Arc<ExecutionResult>>,
}

impl PrepareReq {
    /// Leader-side constructor for a freshly sealed block.
    pub fn new(
        key: &Secp256k1KeyPair,
        block: &Block,
        view: u64,
        idx: u64,
        timestamp: u64,
    ) -> ConsensusResult<Self> {
        Ok(Self {
            msg: PbftMsg::new_signed(key, block.number(), view, idx, timestamp, block.hash()),
            block: block.encode()?,
            exec: None,
        })
    }

    /// Working prepare derived from a raw one once its block has executed.
    pub fn from_executed(
        raw: &PrepareReq,
        key: &Secp256k1KeyPair,
        executed: &Block,
        exec: Arc<ExecutionResult>,
        timestamp: u64,
    ) -> ConsensusResult<Self> {
        Ok(Self {
            msg: PbftMsg::new_signed(
                key,
                raw.msg.height,
                raw.msg.view,
                raw.msg.idx,
                timestamp,
                executed.hash(),
            ),
            block: executed.encode()?,
            exec: Some(exec),
        })
    }

    /// Copy re-signed for another view and sender index.
    pub fn resigned(&self, key: &Secp256k1KeyPair, view: u64, idx: u64, timestamp: u64) -> Self {
        let mut req = self.clone();
        req.msg.view = view;
        req.msg.idx = idx;
        req.msg.timestamp = timestamp;
        req.msg.sign(key);
        req
    }

    pub fn decode_block(&self) -> ConsensusResult<Block> {
        Block::decode(&self.block)
    }
}

impl PartialEq for PrepareReq {
    fn eq(&self, other: &Self) -> bool {
        self.msg == other.msg && self.block == other.block
    }
}

impl Eq for PrepareReq {}

/// Prepare-phase vote for a working prepare's block hash
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignReq {
    pub msg: PbftMsg,
}

impl SignReq {
    pub fn new(prepare: &PrepareReq, key: &Secp256k1KeyPair, idx: u64, timestamp: u64) -> Self {
        Self {
            msg: PbftMsg::new_signed(
                key,
                prepare.msg.height,
                prepare.msg.view,
                idx,
                timestamp,
                prepare.msg.block_hash,
            ),
        }
    }
}

impl AsRef<PbftMsg> for SignReq {
    fn as_ref(&self) -> &PbftMsg {
        &self.msg
    }
}

/// Commit-phase vote
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitReq {
    pub msg: PbftMsg,
}

impl CommitReq {
    pub fn new(prepare: &PrepareReq, key: &Secp256k1KeyPair, idx: u64, timestamp: u64) -> Self {
        Self {
            msg: PbftMsg::new_signed(
                key,
                prepare.msg.height,
                prepare.msg.view,
                idx,
                timestamp,
                prepare.msg.block_hash,
            ),
        }
    }
}

impl AsRef<PbftMsg> for CommitReq {
    fn as_ref(&self) -> &PbftMsg {
        &self.msg
    }
}

/// Vote to move to `view`. `height` and `block_hash` name the sender's
/// chain head.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewChangeReq {
    pub msg: PbftMsg,
}

impl ViewChangeReq {
    pub fn new(
        key: &Secp256k1KeyPair,
        height: u64,
        view: u64,
        idx: u64,
        timestamp: u64,
        head_hash: Hash,
    ) -> Self {
        Self {
            msg: PbftMsg::new_signed(key, height, view, idx, timestamp, head_hash),
        }
    }
}

/// Any PBFT request, tagged by kind
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PbftRequest {
    Prepare(PrepareReq),
    Sign(SignReq),
    Commit(CommitReq),
    ViewChange(ViewChangeReq),
}

impl PbftRequest {
    pub fn kind(&self) -> PacketKind {
        match self {
            PbftRequest::Prepare(_) => PacketKind::Prepare,
            PbftRequest::Sign(_) => PacketKind::Sign,
            PbftRequest::Commit(_) => PacketKind::Commit,
            PbftRequest::ViewChange(_) => PacketKind::ViewChange,
        }
    }

    pub fn msg(&self) -> &PbftMsg {
        match self {
            PbftRequest::Prepare(req) => &req.msg,
            PbftRequest::Sign(req) => &req.msg,
            PbftRequest::Commit(req) => &req.msg,
            PbftRequest::ViewChange(req) => &req.msg,
        }
    }

    pub fn encode(&self) -> ConsensusResult<Vec<u8>> {
        let encoded = match self {
            PbftRequest::Prepare(req) => bincode::serialize(req),
            PbftRequest::Sign(req) => bincode::serialize(req),
            PbftRequest::Commit(req) => bincode::serialize(req),
            PbftRequest::ViewChange(req) => bincode::serialize(req),
        };
        encoded.map_err(|e| ConsensusError::Encode {
            what: self.kind().as_str(),
            reason: e.to_string(),
        })
    }

    pub fn decode(kind: PacketKind, bytes: &[u8]) -> ConsensusResult<Self> {
        let decoded = match kind {
            PacketKind::Prepare => bincode::deserialize(bytes).map(PbftRequest::Prepare),
            PacketKind::Sign => bincode::deserialize(bytes).map(PbftRequest::Sign),
            PacketKind::Commit => bincode::deserialize(bytes).map(PbftRequest::Commit),
            PacketKind::ViewChange => bincode::deserialize(bytes).map(PbftRequest::ViewChange),
        };
        decoded.map_err(|e| ConsensusError::Decode {
            what: kind.as_str(),
            reason: e.to_string(),
        })
    }
}

/// `sender_idx` of a packet relayed by a node outside the validator set
pub const RELAY_SENDER_IDX: u64 = u64::MAX;

/// Network envelope around an encoded request
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PbftMsgPacket {
    /// Index of the validator that handed us this packet (not necessarily
    /// the request's author), or [`RELAY_SENDER_IDX`] for an observer
    pub sender_idx: u64,
    pub sender_id: NodeId,
    pub kind: PacketKind,
    pub ttl: u8,
    pub payload: Vec<u8>,
}

impl PbftMsgPacket {
    pub fn new(
        request: &PbftRequest,
        sender_idx: u64,
        sender_id: NodeId,
        ttl: u8,
    ) -> ConsensusResult<Self> {
        Ok(Self {
            sender_idx,
            sender_id,
            kind: request.kind(),
            ttl,
            payload: request.encode()?,
        })
    }

    pub fn request(&self) -> ConsensusResult<PbftRequest> {
        PbftRequest::decode(self.kind, &self.payload)
    }

    pub fn encode(&self) -> ConsensusResult<Vec<u8>> {
        bincode::serialize(self).map_err(|e| ConsensusError::Encode {
            what: "packet",
            reason: e.to_string(),
        })
    }

    pub fn decode(bytes: &[u8]) -> ConsensusResult<Self> {
        bincode::deserialize(bytes).map_err(|e| ConsensusError::Decode {
            what: "packet",
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{genesis_block, Transaction};

    fn key() -> Secp256k1KeyPair {
        Secp256k1KeyPair::from_bytes([7u8; 32]).unwrap()
    }

    fn block() -> Block {
        Block::new(1, genesis_block().hash(), 0, 5, vec![Transaction::new(0, vec![1])])
    }

    #[test]
    fn test_signatures_verify_against_sender() {
        let key = key();
        let msg = PbftMsg::new_signed(&key, 3, 1, 2, 99, [5u8; 32]);
        assert!(msg.verify(&key.node_id()));

        let other = Secp256k1KeyPair::from_bytes([8u8; 32]).unwrap();
        assert!(!msg.verify(&other.node_id()));
    }

    #[test]
    fn test_tampered_round_fields_fail_second_signature() {
        let key = key();
        let mut msg = PbftMsg::new_signed(&key, 3, 1, 2, 99, [5u8; 32]);
        msg.view = 2;
        assert!(!msg.verify(&key.node_id()));
    }

    #[test]
    fn test_unique_key_concatenates_both_signatures() {
        let msg = PbftMsg::new_signed(&key(), 1, 0, 0, 1, [1u8; 32]);
        let key = msg.unique_key();
        assert_eq!(key.len(), 256);
        assert!(key.starts_with(&hex::encode(msg.sig)));
        assert!(key.ends_with(&hex::encode(msg.sig2)));
    }

    #[test]
    fn test_request_roundtrip_every_kind() {
        let key = key();
        let prepare = PrepareReq::new(&key, &block(), 0, 1, 10).unwrap();
        let requests = vec![
            PbftRequest::Sign(SignReq::new(&prepare, &key, 2, 11)),
            PbftRequest::Commit(CommitReq::new(&prepare, &key, 2, 12)),
            PbftRequest::ViewChange(ViewChangeReq::new(&key, 0, 1, 2, 13, [3u8; 32])),
            PbftRequest::Prepare(prepare),
        ];
        for request in requests {
            let packet = PbftMsgPacket::new(&request, 2, key.node_id(), 2).unwrap();
            let decoded = PbftMsgPacket::decode(&packet.encode().unwrap()).unwrap();
            assert_eq!(decoded.kind, request.kind());
            assert_eq!(decoded.request().unwrap(), request);
        }
    }

    #[test]
    fn test_prepare_exec_is_local_only() {
        let key = key();
        let raw = PrepareReq::new(&key, &block(), 0, 1, 10).unwrap();
        let mut executed = block();
        executed.header.state_root = [4u8; 32];
        let working = PrepareReq::from_executed(
            &raw,
            &key,
            &executed,
            Arc::new(ExecutionResult::new([4u8; 32], 1)),
            20,
        )
        .unwrap();
        assert_eq!(working.msg.height, raw.msg.height);
        assert_eq!(working.msg.block_hash, executed.hash());

        let request = PbftRequest::Prepare(working.clone());
        let decoded = PbftRequest::decode(PacketKind::Prepare, &request.encode().unwrap()).unwrap();
        match decoded {
            PbftRequest::Prepare(req) => {
                assert!(req.exec.is_none());
                assert_eq!(req, working);
            }
            other => panic!("unexpected {:?}", other.kind()),
        }
    }

    #[test]
    fn test_resigned_prepare_verifies_for_new_signer() {
        let leader = key();
        let me = Secp256k1KeyPair::from_bytes([9u8; 32]).unwrap();
        let prepare = PrepareReq::new(&leader, &block(), 0, 1, 10).unwrap();
        let resigned = prepare.resigned(&me, 3, 2, 30);
        assert_eq!(resigned.msg.view, 3);
        assert_eq!(resigned.msg.block_hash, prepare.msg.block_hash);
        assert!(resigned.msg.verify(&me.node_id()));
        assert!(!resigned.msg.verify(&leader.node_id()));
    }

    #[test]
    fn test_unknown_packet_kind_rejected() {
        assert!(matches!(
            PacketKind::try_from(9),
            Err(ConsensusError::UnknownPacketKind(9))
        ));
        assert!(bincode::deserialize::<PacketKind>(&[7u8]).is_err());
        assert_eq!(
            bincode::deserialize::<PacketKind>(&[3u8]).unwrap(),
            PacketKind::ViewChange
        );
    }
}

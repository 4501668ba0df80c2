//! Driving ports (Inbound API)

use crate::domain::{Block, ConsensusError, PbftMsgPacket};
use crate::service::ConsensusStatus;
use async_trait::async_trait;
use shared_types::NodeId;

/// API offered to the sealer, the transport and the operator
#[async_trait]
pub trait ConsensusApi: Send + Sync {
    /// Whether this node should build a block for the current round
    async fn should_seal(&self) -> Result<bool, ConsensusError>;

    /// Hand a locally sealed block to consensus.
    ///
    /// Returns false if this node is not the leader of the round.
    async fn generate_prepare(&self, block: Block) -> Result<bool, ConsensusError>;

    /// Advisory cap on the transactions the next proposal may carry
    async fn max_packable_tx_count(&self) -> Result<u64, ConsensusError>;

    /// Queue a packet received from `peer`
    fn submit_packet(&self, peer: NodeId, packet: PbftMsgPacket) -> Result<(), ConsensusError>;

    /// Snapshot for observability
    async fn consensus_status(&self) -> Result<ConsensusStatus, ConsensusError>;
}

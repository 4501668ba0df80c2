//! Committed-prepare backup record
//!
//! A single durable slot. The record carries an explicit schema version so
//! a node never acts on a layout it does not understand.

use super::{ConsensusError, ConsensusResult, PacketKind, PbftRequest, PrepareReq};
use serde::{Deserialize, Serialize};

/// Current layout of [`BackupRecord`]
pub const BACKUP_SCHEMA_VERSION: u32 = 1;

/// Key of the committed-prepare slot in the backup store
pub const COMMITTED_PREPARE_KEY: &str = "committed";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRecord {
    pub schema_version: u32,
    /// Encoded [`PrepareReq`]
    pub committed_prepare: Vec<u8>,
}

impl BackupRecord {
    pub fn new(prepare: &PrepareReq) -> ConsensusResult<Self> {
        Ok(Self {
            schema_version: BACKUP_SCHEMA_VERSION,
            committed_prepare: PbftRequest::Prepare(prepare.clone()).encode()?,
        })
    }

    pub fn is_supported(&self) -> bool {
        self.schema_version == BACKUP_SCHEMA_VERSION
    }

    pub fn prepare(&self) -> ConsensusResult<PrepareReq> {
        match PbftRequest::decode(PacketKind::Prepare, &self.committed_prepare)? {
            PbftRequest::Prepare(req) => Ok(req),
            other => Err(ConsensusError::Decode {
                what: "backup record",
                reason: format!("unexpected {} payload", other.kind()),
            }),
        }
    }

    pub fn encode(&self) -> ConsensusResult<Vec<u8>> {
        bincode::serialize(self).map_err(|e| ConsensusError::Encode {
            what: "backup record",
            reason: e.to_string(),
        })
    }

    pub fn decode(bytes: &[u8]) -> ConsensusResult<Self> {
        bincode::deserialize(bytes).map_err(|e| ConsensusError::Decode {
            what: "backup record",
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{genesis_block, Block};
    use shared_crypto::Secp256k1KeyPair;

    #[test]
    fn test_record_restores_prepare() {
        let key = Secp256k1KeyPair::from_bytes([3u8; 32]).unwrap();
        let block = Block::new(1, genesis_block().hash(), 1, 7, vec![]);
        let prepare = PrepareReq::new(&key, &block, 0, 1, 9).unwrap();

        let record = BackupRecord::decode(&BackupRecord::new(&prepare).unwrap().encode().unwrap())
            .unwrap();
        assert!(record.is_supported());
        assert_eq!(record.prepare().unwrap(), prepare);
    }

    #[test]
    fn test_unknown_schema_version() {
        let record = BackupRecord {
            schema_version: 7,
            committed_prepare: vec![],
        };
        assert!(!record.is_supported());
        assert!(record.prepare().is_err());
    }
}

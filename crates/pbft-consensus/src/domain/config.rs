//! Engine configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// PBFT engine configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PbftConfig {
    /// Base view timeout (milliseconds)
    pub view_timeout_ms: u64,
    /// Treat an empty proposal as a reason to rotate the leader
    pub omit_empty_block: bool,
    /// TTL stamped on locally originated packets
    pub max_ttl: u8,
    /// Maximum buffered future prepares
    pub future_cache_capacity: usize,
    /// Dedup keys remembered per peer and packet kind
    pub broadcast_cache_capacity: usize,
    /// Messages this many blocks behind the chain head are not forwarded
    pub forward_height_window: u64,
    /// Minimum spacing between garbage collection passes (milliseconds)
    pub collect_interval_ms: u64,
    /// Ceiling for the timeout backoff exponent
    pub max_change_cycle: u64,
    /// Inbound queue wait between timer checks (milliseconds)
    pub queue_poll_ms: u64,
    /// Upper bound on transactions per proposal
    pub default_max_tx_per_block: u64,
    /// Target block interval (milliseconds)
    pub block_interval_ms: u64,
}

impl Default for PbftConfig {
    fn default() -> Self {
        Self {
            view_timeout_ms: 3_000,
            omit_empty_block: true,
            max_ttl: 2,
            future_cache_capacity: 20,
            broadcast_cache_capacity: 1_024,
            forward_height_window: 10,
            collect_interval_ms: 60_000,
            max_change_cycle: 20,
            queue_poll_ms: 5,
            default_max_tx_per_block: 1_000,
            block_interval_ms: 1_000,
        }
    }
}

/// Location and durability settings of the committed-prepare backup
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupConfig {
    pub path: PathBuf,
    /// Refuse to start below this much free space (bytes)
    pub min_free_bytes: u64,
    /// fsync every write
    pub sync_writes: bool,
}

impl BackupConfig {
    /// Backup directory below a node data directory.
    pub fn under(data_dir: impl AsRef<Path>) -> Self {
        Self {
            path: data_dir.as_ref().join("pbftMsgBackup").join("RocksDB"),
            ..Self::default()
        }
    }

    /// Config for tests: no fsync and no free space floor.
    pub fn for_testing(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            min_free_bytes: 0,
            sync_writes: false,
        }
    }
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/pbftMsgBackup/RocksDB"),
            min_free_bytes: 100 * 1024 * 1024,
            sync_writes: true,
        }
    }
}

//! Backup store selection

use crate::container::StorageConfig;
use pbft_consensus::{BackupStore, InMemoryBackupStore};
use shared_types::StorageError;
use std::sync::Arc;
use tracing::info;

/// Committed-prepare backup of validator `idx`.
///
/// RocksDB when `persistent_backup` is set and the `rocksdb` feature is
/// built in, process memory otherwise.
pub fn open_backup(
    storage: &StorageConfig,
    idx: usize,
) -> Result<Arc<dyn BackupStore>, StorageError> {
    if storage.persistent_backup {
        #[cfg(feature = "rocksdb")]
        {
            let config = storage.backup_for(idx);
            let store = pbft_consensus::adapters::RocksDbBackupStore::open(&config)?;
            info!(idx, path = %config.path.display(), "Opened RocksDB backup");
            return Ok(Arc::new(store));
        }
        #[cfg(not(feature = "rocksdb"))]
        tracing::warn!(idx, "Persistent backup requested without the rocksdb feature, using memory");
    }
    info!(idx, "Using in-memory backup");
    Ok(Arc::new(InMemoryBackupStore::new()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pbft_consensus::domain::COMMITTED_PREPARE_KEY;

    #[test]
    fn test_memory_backup_when_not_persistent() {
        let storage = StorageConfig {
            persistent_backup: false,
            ..StorageConfig::default()
        };
        let store = open_backup(&storage, 0).unwrap();
        store.put(COMMITTED_PREPARE_KEY, b"prepare").unwrap();
        assert_eq!(
            store.get(COMMITTED_PREPARE_KEY).unwrap(),
            Some(b"prepare".to_vec())
        );
    }

    #[cfg(feature = "rocksdb")]
    #[test]
    fn test_rocksdb_backup_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageConfig {
            data_dir: dir.path().to_path_buf(),
            persistent_backup: true,
            min_free_bytes: 0,
            sync_writes: false,
        };
        {
            let store = open_backup(&storage, 1).unwrap();
            store.put(COMMITTED_PREPARE_KEY, b"prepare").unwrap();
        }
        let store = open_backup(&storage, 1).unwrap();
        assert_eq!(
            store.get(COMMITTED_PREPARE_KEY).unwrap(),
            Some(b"prepare".to_vec())
        );
        assert!(dir.path().join("node-1/pbftMsgBackup/RocksDB").exists());
    }
}

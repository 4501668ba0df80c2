//! # RocksDB Backup Store
//!
//! Durable home of the committed-prepare record, opened once at startup at
//! `<data_dir>/pbftMsgBackup/RocksDB`.
//!
//! Opening refuses to proceed when the volume is nearly full: a node that
//! cannot persist its committed prepare must not vote.

use super::ensure_disk_space;
use crate::domain::BackupConfig;
use crate::ports::BackupStore;
use rocksdb::{Options, WriteOptions, DB};
use shared_types::StorageError;

/// RocksDB-backed backup store
pub struct RocksDbBackupStore {
    db: DB,
    sync_writes: bool,
}

impl RocksDbBackupStore {
    /// Check free space, then open or create the database.
    pub fn open(config: &BackupConfig) -> Result<Self, StorageError> {
        ensure_disk_space(&config.path, config.min_free_bytes)?;

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_compression_type(rocksdb::DBCompressionType::Snappy);

        let db = DB::open(&opts, &config.path).map_err(|e| {
            StorageError::DatabaseError(format!("Failed to open RocksDB: {}", e))
        })?;

        Ok(Self {
            db,
            sync_writes: config.sync_writes,
        })
    }
}

impl BackupStore for RocksDbBackupStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        self.db
            .get(key.as_bytes())
            .map_err(|e| StorageError::DatabaseError(format!("RocksDB get failed: {}", e)))
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.sync_writes);

        self.db
            .put_opt(key.as_bytes(), value, &write_opts)
            .map_err(|e| StorageError::DatabaseError(format!("RocksDB put failed: {}", e)))
    }
}

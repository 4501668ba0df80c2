//! In-memory backup store

use crate::ports::BackupStore;
use parking_lot::RwLock;
use shared_types::StorageError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Backup store kept in process memory.
///
/// Survives an engine restart as long as the same instance is reused,
/// which is how tests simulate a crash.
#[derive(Default)]
pub struct InMemoryBackupStore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
    writes: AtomicU64,
    fail_writes: AtomicBool,
}

impl InMemoryBackupStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `put` calls
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Make every following `put` fail with an I/O error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl BackupStore for InMemoryBackupStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Io("injected write failure".into()));
        }
        self.entries.write().insert(key.to_string(), value.to_vec());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_and_injected_failure() {
        let store = InMemoryBackupStore::new();
        assert_eq!(store.get("committed").unwrap(), None);

        store.put("committed", b"one").unwrap();
        store.put("committed", b"two").unwrap();
        assert_eq!(store.get("committed").unwrap(), Some(b"two".to_vec()));
        assert_eq!(store.write_count(), 2);

        store.set_fail_writes(true);
        assert!(store.put("committed", b"three").is_err());
        assert_eq!(store.get("committed").unwrap(), Some(b"two".to_vec()));
    }
}

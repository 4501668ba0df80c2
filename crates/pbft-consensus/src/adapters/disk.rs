//! Free-space guard for the backup directory

use shared_types::StorageError;
use std::path::Path;

/// Fail with [`StorageError::DiskFull`] when the volume holding `path` has
/// `min_free_bytes` or less available. The directory is created first.
pub fn ensure_disk_space(path: &Path, min_free_bytes: u64) -> Result<(), StorageError> {
    std::fs::create_dir_all(path).map_err(|e| StorageError::Io(e.to_string()))?;
    if min_free_bytes == 0 {
        return Ok(());
    }
    let available = fs2::available_space(path).map_err(|e| StorageError::Io(e.to_string()))?;
    if available <= min_free_bytes {
        return Err(StorageError::DiskFull {
            path: path.display().to_string(),
            available,
            required: min_free_bytes,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_creates_directory_and_passes_without_floor() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("pbftMsgBackup").join("RocksDB");
        ensure_disk_space(&path, 0).unwrap();
        assert!(path.is_dir());
    }

    #[test]
    fn test_impossible_floor_is_disk_full() {
        let temp_dir = TempDir::new().unwrap();
        let err = ensure_disk_space(temp_dir.path(), u64::MAX).unwrap_err();
        assert!(matches!(err, StorageError::DiskFull { required, .. } if required == u64::MAX));
    }
}

//! # Error Types
//!
//! Storage failures shared by every durable adapter.

use thiserror::Error;

/// Errors raised by on-disk stores.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    /// Free space on the target volume is below the configured floor.
    #[error("Disk full: {available} bytes available at {path}, need {required}")]
    DiskFull {
        path: String,
        available: u64,
        required: u64,
    },

    /// Database operation failed.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Filesystem operation failed.
    #[error("I/O error: {0}")]
    Io(String),
}

//! Adapters layer (Hexagonal Architecture)
//!
//! Backup store implementations. The RocksDB store is behind the `rocksdb`
//! feature; the in-memory store serves tests and single-process networks.

mod disk;
mod memory_backup;
#[cfg(feature = "rocksdb")]
mod rocksdb_backup;

pub use disk::*;
pub use memory_backup::*;
#[cfg(feature = "rocksdb")]
pub use rocksdb_backup::*;

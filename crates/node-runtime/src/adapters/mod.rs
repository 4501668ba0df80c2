//! # Adapter Implementations
//!
//! In-process implementations of the engine's outbound ports.
//!
//! ```text
//!   PbftEngine ──→ Executor ──────────── DeterministicExecutor
//!              ──→ Ledger ────────────── InMemoryLedger
//!              ──→ TxPool ────────────── InMemoryTxPool
//!              ──→ Transport ─────────── LoopbackTransport ──→ LoopbackHub
//!              ──→ BackupStore ───────── open_backup (RocksDB or memory)
//!              ──→ ValidatorSetProvider ─ StaticValidatorProvider
//! ```

pub mod backup;
pub mod executor;
pub mod ledger;
pub mod transport;
pub mod tx_pool;
pub mod validators;

pub use backup::open_backup;
pub use executor::DeterministicExecutor;
pub use ledger::InMemoryLedger;
pub use transport::{LoopbackHub, LoopbackTransport};
pub use tx_pool::InMemoryTxPool;
pub use validators::StaticValidatorProvider;

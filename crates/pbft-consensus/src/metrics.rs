//! # Consensus Metrics
//!
//! Prometheus metrics for monitoring the PBFT engine.
//!
//! ## Usage
//!
//! Enable with the `metrics` feature:
//! ```toml
//! pbft-consensus = { path = "...", features = ["metrics"] }
//! ```
//!
//! ## Metrics Exported
//!
//! - `pbft_blocks_committed_total` - Blocks appended through consensus
//! - `pbft_view_changes_total` - Views adopted
//! - `pbft_timeouts_total` - Round timeouts
//! - `pbft_messages_rejected_total` - Rejected inbound requests (by packet kind)
//! - `pbft_execution_latency_seconds` - Histogram of block execution times

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
use prometheus::{
    register_counter_vec, register_histogram, register_int_counter, CounterVec, Histogram,
    IntCounter,
};

#[cfg(feature = "metrics")]
lazy_static! {
    /// Blocks appended to the ledger by this engine
    pub static ref BLOCKS_COMMITTED: IntCounter = register_int_counter!(
        "pbft_blocks_committed_total",
        "Total number of blocks committed through PBFT"
    )
    .expect("Failed to create BLOCKS_COMMITTED metric");

    /// Views adopted after a view-change quorum
    pub static ref VIEW_CHANGES: IntCounter = register_int_counter!(
        "pbft_view_changes_total",
        "Total number of views adopted"
    )
    .expect("Failed to create VIEW_CHANGES metric");

    /// Round timeouts
    pub static ref TIMEOUTS: IntCounter = register_int_counter!(
        "pbft_timeouts_total",
        "Total number of round timeouts"
    )
    .expect("Failed to create TIMEOUTS metric");

    /// Rejected inbound requests, labeled by packet kind
    pub static ref MESSAGES_REJECTED: CounterVec = register_counter_vec!(
        "pbft_messages_rejected_total",
        "Total number of rejected PBFT requests",
        &["kind"]
    )
    .expect("Failed to create MESSAGES_REJECTED metric");

    /// Histogram of block execution latency
    pub static ref EXECUTION_LATENCY: Histogram = register_histogram!(
        "pbft_execution_latency_seconds",
        "Time taken to execute a proposed block in seconds",
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
    )
    .expect("Failed to create EXECUTION_LATENCY metric");
}

#[cfg(feature = "metrics")]
pub fn record_block_committed() {
    BLOCKS_COMMITTED.inc();
}

#[cfg(feature = "metrics")]
pub fn record_view_change() {
    VIEW_CHANGES.inc();
}

#[cfg(feature = "metrics")]
pub fn record_timeout() {
    TIMEOUTS.inc();
}

/// Record a rejected request by packet kind
#[cfg(feature = "metrics")]
pub fn record_message_rejected(kind: &str) {
    MESSAGES_REJECTED.with_label_values(&[kind]).inc();
}

#[cfg(feature = "metrics")]
pub fn record_execution_latency(seconds: f64) {
    EXECUTION_LATENCY.observe(seconds);
}

// No-op implementations when metrics feature is disabled
#[cfg(not(feature = "metrics"))]
pub fn record_block_committed() {}

#[cfg(not(feature = "metrics"))]
pub fn record_view_change() {}

#[cfg(not(feature = "metrics"))]
pub fn record_timeout() {}

#[cfg(not(feature = "metrics"))]
pub fn record_message_rejected(_kind: &str) {}

#[cfg(not(feature = "metrics"))]
pub fn record_execution_latency(_seconds: f64) {}

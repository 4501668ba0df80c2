//! # Shared Types Crate
//!
//! Primitive identifiers used by every crate in the workspace.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: hashes, signatures and node identities are
//!   defined here and nowhere else.
//! - **Fixed-size bytes**: every identifier is a byte array with a stable
//!   serde representation, so binary encodings never depend on host layout.

pub mod entities;
pub mod errors;

pub use entities::*;
pub use errors::*;

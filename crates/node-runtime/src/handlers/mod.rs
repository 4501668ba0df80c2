//! # Handlers
//!
//! Tasks that drive a validator from the outside of its engine.

pub mod sealer;

pub use sealer::{Sealer, SealerState};

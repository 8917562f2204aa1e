//! Core deterministic primitives.
//!
//! Everything the crash point and the multiplier clock are computed from.
//! No floats, no clocks, no randomness.

pub mod multiplier;
pub mod hash;

// Re-export core types
pub use multiplier::{Multiplier, MULTIPLIER_SCALE, DEFAULT_STEP};
pub use hash::{StateHash, hash_bytes, hash_with_domain};

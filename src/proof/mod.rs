//! Fairness Proofs
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  round_start:  commitment = SHA-256(domain, seed:round)     │
//! │  round_crash:  reveal seed + crash point                    │
//! │  anyone:       verify commitment, recompute crash point     │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod commitment;

pub use commitment::{RoundCommitment, RoundReveal, CommitmentError};

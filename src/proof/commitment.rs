//! Round Commitment Protocol
//!
//! Commit to the round seed before the multiplier starts moving.
//! Reveal the seed at crash so anyone can verify the commitment and
//! recompute the crash point.

use serde::{Serialize, Deserialize};
use crate::core::hash::{StateHash, hash_with_domain, to_hex, from_hex};
use crate::core::multiplier::Multiplier;
use crate::game::crash::generate;
use crate::game::round::{Round, RoundNumber};

/// Domain separator for commitments.
const COMMITMENT_DOMAIN: &[u8] = b"CRASH_COMMIT_V1";

/// Published at round start. Reveals nothing about the crash point.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundCommitment {
    /// Round this commitment binds to.
    pub round_number: RoundNumber,

    /// SHA-256 over domain, seed and round number.
    pub commitment_hash: StateHash,
}

impl RoundCommitment {
    /// Commit to `seed` for `round_number`.
    pub fn new(seed: &str, round_number: RoundNumber) -> Self {
        Self {
            round_number,
            commitment_hash: compute_commitment_hash(seed, round_number),
        }
    }

    /// Rebuild from the hex string sent on the wire.
    pub fn from_hex(round_number: RoundNumber, hex: &str) -> Option<Self> {
        Some(Self {
            round_number,
            commitment_hash: from_hex(hex)?,
        })
    }

    /// Hex form for the wire.
    pub fn to_hex(&self) -> String {
        to_hex(&self.commitment_hash)
    }

    /// Verify that a seed matches this commitment.
    pub fn verify(&self, seed: &str) -> bool {
        compute_commitment_hash(seed, self.round_number) == self.commitment_hash
    }
}

/// Compute commitment hash from seed and round.
fn compute_commitment_hash(seed: &str, round_number: RoundNumber) -> StateHash {
    let preimage = format!("{}:{}", seed, round_number);
    hash_with_domain(COMMITMENT_DOMAIN, preimage.as_bytes())
}

/// Published at crash time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoundReveal {
    /// Round being revealed.
    pub round_number: RoundNumber,

    /// The seed committed to at start.
    pub seed: String,

    /// Claimed crash point.
    pub crash_point: Multiplier,
}

impl RoundReveal {
    /// Reveal for a finished round.
    pub fn from_round(round: &Round) -> Self {
        Self {
            round_number: round.number,
            seed: round.seed.clone(),
            crash_point: round.crash_point,
        }
    }

    /// Verify reveal against commitment.
    pub fn verify(&self, commitment: &RoundCommitment) -> Result<(), CommitmentError> {
        // 1. Same round
        if commitment.round_number != self.round_number {
            return Err(CommitmentError::RoundMismatch {
                expected: commitment.round_number,
                got: self.round_number,
            });
        }

        // 2. Seed matches commitment
        if !commitment.verify(&self.seed) {
            return Err(CommitmentError::PreimageMismatch);
        }

        // 3. Crash point follows from the seed
        let expected = generate(&self.seed, self.round_number);
        if expected != self.crash_point {
            return Err(CommitmentError::CrashPointMismatch {
                expected,
                got: self.crash_point,
            });
        }

        Ok(())
    }
}

/// Errors that can occur during reveal verification.
#[derive(Debug, Clone, PartialEq)]
pub enum CommitmentError {
    /// Reveal is for a different round.
    RoundMismatch {
        /// Round the commitment binds to.
        expected: RoundNumber,
        /// Round in the reveal.
        got: RoundNumber,
    },

    /// Seed hash doesn't match commitment.
    PreimageMismatch,

    /// Crash point doesn't follow from the seed.
    CrashPointMismatch {
        /// Recomputed crash point.
        expected: Multiplier,
        /// Claimed crash point.
        got: Multiplier,
    },
}

impl std::fmt::Display for CommitmentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RoundMismatch { expected, got } => {
                write!(f, "Round mismatch: commitment for {}, reveal for {}", expected, got)
            }
            Self::PreimageMismatch => write!(f, "Seed doesn't match commitment"),
            Self::CrashPointMismatch { expected, got } => {
                write!(f, "Crash point mismatch: expected {}, got {}", expected, got)
            }
        }
    }
}

impl std::error::Error for CommitmentError {}

//! Crash Point Generator
//!
//! Pure function from (seed, round number) to crash multiplier. Anyone who
//! knows the seed can recompute a round's outcome after the fact.
//!
//! ## Policy
//!
//! ```text
//! digest     = SHA-256(seed ++ decimal(round))
//! n          = big-endian u32 of digest[0..4]
//! r          = n mod 10_000
//! crash      = 1 + r / 1000, rounded half-up to 0.01
//!            = (100 + (r + 5) / 10) hundredths
//! ```
//!
//! Range: 1.00x ..= 11.00x. These constants are part of the verification
//! contract and must not change.

use crate::core::hash::{hash_bytes, leading_u32};
use crate::core::multiplier::Multiplier;
use crate::game::round::RoundNumber;

/// Modulus applied to the leading digest word.
pub const CRASH_MODULUS: u32 = 10_000;

/// `r / CRASH_DIVISOR` is the multiplier above 1.00x before rounding.
pub const CRASH_DIVISOR: u32 = 1_000;

/// Lowest possible crash point, in hundredths.
pub const CRASH_OFFSET_HUNDREDTHS: u32 = 100;

/// Highest possible crash point.
pub const MAX_CRASH_POINT: Multiplier = Multiplier::from_hundredths(1100);

/// Derive the crash point for a round.
///
/// Deterministic and total over non-empty seeds and any round number.
pub fn generate(seed: &str, round: RoundNumber) -> Multiplier {
    let preimage = format!("{}{}", seed, round);
    let digest = hash_bytes(preimage.as_bytes());
    let r = leading_u32(&digest) % CRASH_MODULUS;

    // r / 1000 in thousandths -> hundredths, half-up
    let scale = CRASH_DIVISOR / 100;
    let hundredths = CRASH_OFFSET_HUNDREDTHS + (r + scale / 2) / scale;

    Multiplier::from_hundredths(hundredths)
}

//! Fixed-Point Multiplier
//!
//! The live round multiplier and the crash point share one integer
//! representation so the crash transition is decided by exact comparison.
//!
//! ## Format
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Basis points: 1.00x == 10_000                              │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Storage:    u32                                            │
//! │  Resolution: 0.0001x                                        │
//! │  Range:      1.0000x to ~429496.7295x                       │
//! │  Display:    two decimals (1.05x)                           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Floats only appear at the edges: wire rendering and payout amounts.

use std::fmt;
use serde::{Serialize, Deserialize};

/// Basis points per 1.00x.
pub const MULTIPLIER_SCALE: u32 = 10_000;

/// Basis points per hundredth (0.01x).
pub const BP_PER_HUNDREDTH: u32 = MULTIPLIER_SCALE / 100;

/// Default tick step: 0.05x.
pub const DEFAULT_STEP: Multiplier = Multiplier(500);

/// A payout multiplier in basis points.
///
/// Never below 1.00x when produced by the engine or the crash point generator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Multiplier(u32);

impl Multiplier {
    /// 1.00x, where every round starts.
    pub const ONE: Multiplier = Multiplier(MULTIPLIER_SCALE);

    /// Create from raw basis points.
    pub const fn from_basis_points(bp: u32) -> Self {
        Self(bp)
    }

    /// Create from hundredths (335 -> 3.35x).
    pub const fn from_hundredths(hundredths: u32) -> Self {
        Self(hundredths * BP_PER_HUNDREDTH)
    }

    /// Raw basis points.
    pub const fn basis_points(self) -> u32 {
        self.0
    }

    /// Whether the value sits exactly on a 0.01x boundary.
    pub const fn is_two_decimal(self) -> bool {
        self.0 % BP_PER_HUNDREDTH == 0
    }

    /// Advance by `step`, never passing `ceiling`.
    #[inline]
    pub fn step_towards(self, step: Multiplier, ceiling: Multiplier) -> Multiplier {
        Multiplier(self.0.saturating_add(step.0).min(ceiling.0))
    }

    /// Full-precision float value. Use for payout math only.
    #[inline]
    pub fn to_f64(self) -> f64 {
        self.0 as f64 / MULTIPLIER_SCALE as f64
    }

    /// Value rounded half-up to two decimals, for the wire.
    pub fn display_value(self) -> f64 {
        let hundredths = (self.0 + BP_PER_HUNDREDTH / 2) / BP_PER_HUNDREDTH;
        hundredths as f64 / 100.0
    }
}

impl Default for Multiplier {
    fn default() -> Self {
        Self::ONE
    }
}

impl fmt::Display for Multiplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}x", self.display_value())
    }
}

//! Game Logic Module
//!
//! Crash round rules. Synchronous and free of I/O; the runtime owns the
//! clock and the network.
//!
//! ## Module Structure
//!
//! - `crash`: Crash point generator
//! - `round`: Round, bet and settlement records
//! - `registry`: Per-round bet registry
//! - `engine`: Round state machine
//! - `error`: Rejection taxonomy

pub mod crash;
pub mod round;
pub mod registry;
pub mod engine;
pub mod error;

// Re-export key types
pub use crash::{generate, MAX_CRASH_POINT};
pub use round::{Bet, BetRequest, CashoutRecord, ConnectionId, CryptoType, Round, RoundNumber, RoundPhase};
pub use registry::BetRegistry;
pub use engine::{EngineConfig, EngineStatus, RoundEngine, SeedPolicy, TickOutcome};
pub use error::{ErrorCode, RoundError};

//! Rejection Taxonomy
//!
//! Every way a bet or cash-out can be refused. None of these affects
//! other participants' state.

use serde::{Serialize, Deserialize};

/// Gameplay rejection reasons.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RoundError {
    /// Bet placed after the round left the Open phase.
    #[error("Round already started")]
    AlreadyStarted,

    /// No round is running (or open, for bets).
    #[error("No active round")]
    NoActiveRound,

    /// Connection has no bet in the current round.
    #[error("No active bet")]
    NoActiveBet,

    /// Connection's bet was already settled.
    #[error("Already cashed out")]
    AlreadyCashedOut,

    /// Multiplier already reached the crash point.
    #[error("Too late: round crashed")]
    TooLate,

    /// Bet amounts are missing, negative, or not finite.
    #[error("Invalid bet: {0}")]
    InvalidBet(String),

    /// Ledger refused the stake debit.
    #[error("Insufficient balance")]
    InsufficientBalance,

    /// Ledger has no wallet for this player.
    #[error("Unknown player: {0}")]
    UnknownParticipant(String),

    /// External credit/debit failed or timed out.
    #[error("Ledger failure: {0}")]
    LedgerFailure(String),

    /// Credit outcome unknown (ledger timed out); the bet is held until reconciled.
    #[error("Settlement pending reconciliation")]
    SettlementPending,

    /// Round save failed.
    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),

    /// Engine actor is no longer running.
    #[error("Engine stopped")]
    EngineStopped,
}

impl RoundError {
    /// Stable wire code for this rejection.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::AlreadyStarted => ErrorCode::AlreadyStarted,
            Self::NoActiveRound => ErrorCode::NoActiveRound,
            Self::NoActiveBet => ErrorCode::NoActiveBet,
            Self::AlreadyCashedOut => ErrorCode::AlreadyCashedOut,
            Self::TooLate => ErrorCode::TooLate,
            Self::InvalidBet(_) => ErrorCode::InvalidBet,
            Self::InsufficientBalance => ErrorCode::InsufficientBalance,
            Self::UnknownParticipant(_) => ErrorCode::UnknownPlayer,
            Self::LedgerFailure(_) => ErrorCode::LedgerFailure,
            Self::SettlementPending => ErrorCode::SettlementPending,
            Self::PersistenceFailure(_) => ErrorCode::PersistenceFailure,
            Self::EngineStopped => ErrorCode::InternalError,
        }
    }

    /// Whether the failure is on the server side rather than the request.
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::LedgerFailure(_)
                | Self::SettlementPending
                | Self::PersistenceFailure(_)
                | Self::EngineStopped
        )
    }
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Round already started.
    AlreadyStarted,
    /// No active round.
    NoActiveRound,
    /// No active bet.
    NoActiveBet,
    /// Already cashed out.
    AlreadyCashedOut,
    /// Multiplier reached the crash point.
    TooLate,
    /// Malformed bet.
    InvalidBet,
    /// Not enough funds for the stake.
    InsufficientBalance,
    /// No wallet for the player id.
    UnknownPlayer,
    /// Ledger failure.
    LedgerFailure,
    /// Cash-out held for reconciliation.
    SettlementPending,
    /// Persistence failure.
    PersistenceFailure,
    /// Invalid message.
    InvalidInput,
    /// Server at connection capacity.
    ServerOverloaded,
    /// Internal error.
    InternalError,
}

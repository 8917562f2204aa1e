//! Bet Registry
//!
//! Per-round mapping of connection -> bet. Accepts entries only until it is
//! closed at the Open -> Running transition.
//!
//! The registry has no lock of its own: it lives inside the engine actor and
//! is only reached through `&mut` from one message handler at a time, so each
//! call is its own critical section and none spans an await.

use crate::game::error::RoundError;
use crate::game::round::{Bet, ConnectionId};

/// Bets for one round.
#[derive(Debug, Default)]
pub struct BetRegistry {
    bets: Vec<Bet>,
    closed: bool,
}

impl BetRegistry {
    /// Create an open, empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept a bet, unless the registry is closed.
    pub fn register(&mut self, bet: Bet) -> Result<(), RoundError> {
        if self.closed {
            return Err(RoundError::AlreadyStarted);
        }
        self.bets.push(bet);
        Ok(())
    }

    /// Active (not cashed out, not held) bet for a connection.
    pub fn find(&self, connection_id: ConnectionId) -> Option<&Bet> {
        self.position(connection_id).map(|idx| &self.bets[idx])
    }

    /// Index of the active bet for a connection.
    pub(crate) fn position(&self, connection_id: ConnectionId) -> Option<usize> {
        self.bets.iter()
            .position(|b| {
                b.connection_id == connection_id && !b.has_cashed_out && !b.settlement_unknown
            })
    }

    /// Whether the connection holds a bet that was already settled.
    pub fn has_settled(&self, connection_id: ConnectionId) -> bool {
        self.bets.iter()
            .any(|b| b.connection_id == connection_id && b.has_cashed_out)
    }

    /// Whether the connection holds a bet whose credit outcome is unknown.
    pub fn has_pending_settlement(&self, connection_id: ConnectionId) -> bool {
        self.bets.iter()
            .any(|b| b.connection_id == connection_id && b.settlement_unknown)
    }

    /// Flip `has_cashed_out` for the bet at `idx`.
    ///
    /// Fails if the bet already flipped or is held; the flag never goes back.
    pub(crate) fn mark_cashed_out(&mut self, idx: usize) -> Result<&Bet, RoundError> {
        let bet = self.bets.get_mut(idx).ok_or(RoundError::NoActiveBet)?;
        if bet.has_cashed_out {
            return Err(RoundError::AlreadyCashedOut);
        }
        if bet.settlement_unknown {
            return Err(RoundError::SettlementPending);
        }
        bet.has_cashed_out = true;
        Ok(bet)
    }

    /// Hold the bet at `idx`: no further cash-out or refund until reconciled.
    pub(crate) fn mark_settlement_unknown(&mut self, idx: usize) -> Result<&Bet, RoundError> {
        let bet = self.bets.get_mut(idx).ok_or(RoundError::NoActiveBet)?;
        if bet.has_cashed_out {
            return Err(RoundError::AlreadyCashedOut);
        }
        bet.settlement_unknown = true;
        Ok(&*bet)
    }

    /// Freeze the registry. Returns false if it was already closed.
    pub fn close(&mut self) -> bool {
        !std::mem::replace(&mut self.closed, true)
    }

    /// Whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// All bets in placement order.
    pub fn bets(&self) -> &[Bet] {
        &self.bets
    }

    /// Number of bets.
    pub fn len(&self) -> usize {
        self.bets.len()
    }

    /// Whether no bets were placed.
    pub fn is_empty(&self) -> bool {
        self.bets.is_empty()
    }

    /// Consume into the round's bet list.
    pub fn into_bets(self) -> Vec<Bet> {
        self.bets
    }
}

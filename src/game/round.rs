//! Round Records
//!
//! The data entities describing one round's committed outcome and
//! its participants.

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use uuid::Uuid;

use crate::core::multiplier::Multiplier;

/// Server-assigned connection identifier.
pub type ConnectionId = u64;

/// Round sequence number (starts at 1).
pub type RoundNumber = u64;

/// Participant (wallet owner) identifier.
pub type ParticipantId = String;

/// Supported stake currencies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CryptoType {
    /// Bitcoin
    #[serde(rename = "BTC")]
    Btc,
    /// Ether
    #[serde(rename = "ETH")]
    Eth,
}

impl CryptoType {
    /// Ticker symbol.
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Btc => "BTC",
            Self::Eth => "ETH",
        }
    }
}

impl Default for CryptoType {
    fn default() -> Self {
        Self::Btc
    }
}

impl std::fmt::Display for CryptoType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Round lifecycle phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundPhase {
    /// No round, waiting for participants.
    Idle,
    /// Round created, accepting bets, multiplier not moving.
    Open,
    /// Multiplier ticking upward.
    Running,
    /// Terminal per round; cooldown until the next Open.
    Crashed,
}

/// A participant's stake in one round.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bet {
    /// Wallet owner.
    pub participant_id: ParticipantId,
    /// Connection that placed the bet.
    pub connection_id: ConnectionId,
    /// Stake in USD at placement time.
    pub usd_amount: f64,
    /// Stake in crypto units.
    pub crypto_amount: f64,
    /// Stake currency.
    pub crypto_type: CryptoType,
    /// Flips false -> true at most once.
    #[serde(default)]
    pub has_cashed_out: bool,
    /// Cash-out credit timed out; the payout may or may not have landed.
    #[serde(default)]
    pub settlement_unknown: bool,
    /// Debit transaction id.
    pub transaction_id: Uuid,
    /// When the bet was accepted.
    pub placed_at: DateTime<Utc>,
}

/// An incoming stake before it is accepted.
#[derive(Clone, Debug, PartialEq)]
pub struct BetRequest {
    /// Wallet owner.
    pub participant_id: ParticipantId,
    /// Stake in USD.
    pub usd_amount: f64,
    /// Stake in crypto units.
    pub crypto_amount: f64,
    /// Stake currency.
    pub crypto_type: CryptoType,
}

impl BetRequest {
    /// Reject malformed amounts.
    pub fn validate(&self) -> Result<(), String> {
        if self.participant_id.trim().is_empty() {
            return Err("missing player id".into());
        }
        if !self.usd_amount.is_finite() || self.usd_amount <= 0.0 {
            return Err("usd amount must be positive".into());
        }
        if !self.crypto_amount.is_finite() || self.crypto_amount <= 0.0 {
            return Err("crypto amount must be positive".into());
        }
        Ok(())
    }

    /// Build the accepted bet.
    pub fn into_bet(self, connection_id: ConnectionId, placed_at: DateTime<Utc>) -> Bet {
        Bet {
            participant_id: self.participant_id,
            connection_id,
            usd_amount: self.usd_amount,
            crypto_amount: self.crypto_amount,
            crypto_type: self.crypto_type,
            has_cashed_out: false,
            settlement_unknown: false,
            transaction_id: Uuid::new_v4(),
            placed_at,
        }
    }
}

/// Append-only settlement record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CashoutRecord {
    /// Wallet credited.
    pub participant_id: ParticipantId,
    /// Crypto amount credited.
    pub payout_amount: f64,
    /// Multiplier locked in.
    pub multiplier_at_exit: Multiplier,
    /// Payout currency.
    pub currency: CryptoType,
    /// Credit transaction id.
    pub transaction_id: Uuid,
    /// When the settlement was recorded.
    pub timestamp: DateTime<Utc>,
}

/// One play of the game.
///
/// Owned by the engine while open; immutable once handed to persistence.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Round {
    /// Sequence number.
    pub number: RoundNumber,
    /// Seed the crash point was derived from (revealed at crash).
    pub seed: String,
    /// Hex commitment published at round start.
    pub commitment: String,
    /// Fixed before the first tick.
    pub crash_point: Multiplier,
    /// When the round opened.
    pub start_time: DateTime<Utc>,
    /// When the round crashed.
    pub end_time: Option<DateTime<Utc>>,
    /// Accepted bets, in placement order.
    pub bets: Vec<Bet>,
    /// Settlements, in settlement order.
    pub cashouts: Vec<CashoutRecord>,
}

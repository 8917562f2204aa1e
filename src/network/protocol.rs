//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! Every frame is a JSON text message tagged by `type` (snake_case) with
//! camelCase fields.

use serde::{Serialize, Deserialize};
use uuid::Uuid;

use crate::game::error::{ErrorCode, RoundError};
use crate::game::round::{Bet, BetRequest, CryptoType, ParticipantId, RoundNumber};
use crate::runtime::ingress::EngineEvent;
use crate::settlement::ledger::Wallet;

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Say hello; answered with `welcome`.
    #[serde(rename_all = "camelCase")]
    Join {
        /// Optional player id for the greeting.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        player_id: Option<ParticipantId>,
    },

    /// Stake on the open round.
    PlaceBet(PlaceBet),

    /// Cash out this connection's active bet.
    Cashout,

    /// Wallet lookup.
    #[serde(rename_all = "camelCase")]
    Balance {
        /// Wallet owner.
        player_id: ParticipantId,
    },

    /// Ping for latency measurement.
    Ping {
        /// Client timestamp, echoed back.
        timestamp: u64,
    },
}

/// Bet placement request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceBet {
    /// Wallet to debit.
    pub player_id: ParticipantId,
    /// Stake in USD.
    pub usd_amount: f64,
    /// Stake in crypto units.
    pub crypto_amount: f64,
    /// Stake currency.
    #[serde(default)]
    pub crypto_type: CryptoType,
}

impl From<PlaceBet> for BetRequest {
    fn from(bet: PlaceBet) -> Self {
        BetRequest {
            participant_id: bet.player_id,
            usd_amount: bet.usd_amount,
            crypto_amount: bet.crypto_amount,
            crypto_type: bet.crypto_type,
        }
    }
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Greeting after `join`.
    #[serde(rename_all = "camelCase")]
    Welcome {
        /// Greeting text.
        message: String,
        /// Server-assigned connection id.
        connection_id: u64,
    },

    /// Bet acknowledgement (targeted).
    #[serde(rename_all = "camelCase")]
    BetPlaced {
        /// Whether the bet was accepted.
        success: bool,
        /// Debit transaction id when accepted.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        transaction_id: Option<Uuid>,
        /// Rejection reason when refused.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<ErrorCode>,
        /// Human-readable detail.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    /// Round opened for bets. Carries a commitment, never the crash point.
    #[serde(rename_all = "camelCase")]
    RoundStart {
        /// Round number.
        round_number: RoundNumber,
        /// Hex SHA-256 commitment to the round seed.
        commitment: String,
    },

    /// Multiplier advanced one tick.
    MultiplierUpdate {
        /// Current multiplier, two decimals.
        multiplier: f64,
    },

    /// Round ended; seed revealed for verification.
    #[serde(rename_all = "camelCase")]
    RoundCrash {
        /// Round number.
        round_number: RoundNumber,
        /// Exact crash point, two decimals.
        crash_point: f64,
        /// Seed the crash point was derived from.
        seed: String,
    },

    /// Someone cashed out (broadcast).
    #[serde(rename_all = "camelCase")]
    PlayerCashout {
        /// Who cashed out.
        player_id: ParticipantId,
        /// Crypto credited.
        payout: f64,
        /// Payout currency.
        currency: CryptoType,
        /// Multiplier locked in, two decimals.
        multiplier: f64,
    },

    /// Cash-out refused (targeted).
    CashoutFailed {
        /// Machine-readable reason.
        reason: ErrorCode,
        /// Human-readable detail.
        message: String,
    },

    /// Cooldown between rounds.
    Waiting {
        /// Human-readable notice.
        message: String,
    },

    /// Wallet balances (targeted).
    #[serde(rename_all = "camelCase")]
    Balance {
        /// Wallet owner.
        player_id: ParticipantId,
        /// Bitcoin balance.
        btc: f64,
        /// Ether balance.
        eth: f64,
    },

    /// Pong response.
    #[serde(rename_all = "camelCase")]
    Pong {
        /// Echoed client timestamp.
        timestamp: u64,
        /// Server time in Unix milliseconds.
        server_time: u64,
    },

    /// Error message.
    Error(ServerError),

    /// Server is shutting down.
    Shutdown {
        /// Why.
        reason: String,
    },
}

/// Server error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerError {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

impl From<&RoundError> for ServerError {
    fn from(e: &RoundError) -> Self {
        Self {
            code: e.code(),
            message: e.to_string(),
        }
    }
}

impl ServerMessage {
    /// Generic error frame.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error(ServerError {
            code,
            message: message.into(),
        })
    }

    /// Acknowledge an accepted bet.
    pub fn bet_accepted(bet: &Bet) -> Self {
        Self::BetPlaced {
            success: true,
            transaction_id: Some(bet.transaction_id),
            reason: None,
            message: None,
        }
    }

    /// Acknowledge a refused bet.
    pub fn bet_rejected(e: &RoundError) -> Self {
        Self::BetPlaced {
            success: false,
            transaction_id: None,
            reason: Some(e.code()),
            message: Some(e.to_string()),
        }
    }

    /// Refused cash-out.
    pub fn cashout_failed(e: &RoundError) -> Self {
        Self::CashoutFailed {
            reason: e.code(),
            message: e.to_string(),
        }
    }

    /// Wallet reply.
    pub fn balance(player_id: ParticipantId, wallet: Wallet) -> Self {
        Self::Balance {
            player_id,
            btc: wallet.btc,
            eth: wallet.eth,
        }
    }

    /// Pong for a client timestamp.
    pub fn pong(timestamp: u64) -> Self {
        Self::Pong {
            timestamp,
            server_time: chrono::Utc::now().timestamp_millis().max(0) as u64,
        }
    }
}

impl From<EngineEvent> for ServerMessage {
    fn from(event: EngineEvent) -> Self {
        match event {
            EngineEvent::RoundStarted { round_number, commitment } => {
                Self::RoundStart { round_number, commitment }
            }
            EngineEvent::MultiplierUpdated(multiplier) => Self::MultiplierUpdate {
                multiplier: multiplier.display_value(),
            },
            EngineEvent::RoundCrashed(reveal) => Self::RoundCrash {
                round_number: reveal.round_number,
                crash_point: reveal.crash_point.display_value(),
                seed: reveal.seed,
            },
            EngineEvent::CashedOut(record) => Self::PlayerCashout {
                player_id: record.participant_id,
                payout: record.payout_amount,
                currency: record.currency,
                multiplier: record.multiplier_at_exit.display_value(),
            },
            EngineEvent::Waiting { next_round_in_secs } => Self::Waiting {
                message: format!("Next round starts in {} seconds", next_round_in_secs),
            },
        }
    }
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

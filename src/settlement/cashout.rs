//! Cash-Out Processor
//!
//! Settles exits against the engine's live state and moves money through
//! the ledger. Every method takes `&mut RoundEngine`: the caller (the engine
//! actor) holds exclusive access for the whole validate -> credit -> record
//! sequence, so no tick or competing request can interleave.
//!
//! ```text
//!   check_cashout ──▶ ledger.credit (bounded) ──▶ commit_cashout
//!        │                │            │                │
//!     Rejected       LedgerFailure  timed out        Settled
//!                   (retry ok)   SettlementPending
//!                                (bet held, no retry)
//! ```

use std::sync::Arc;
use std::time::Duration;
use chrono::Utc;
use tokio::time::timeout;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::game::engine::RoundEngine;
use crate::game::error::RoundError;
use crate::game::round::{Bet, BetRequest, CashoutRecord, ConnectionId, CryptoType, Round};
use crate::settlement::ledger::{Ledger, LedgerError, Wallet};

impl From<LedgerError> for RoundError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::InsufficientFunds { .. } => RoundError::InsufficientBalance,
            LedgerError::UnknownParticipant(id) => RoundError::UnknownParticipant(id),
            LedgerError::InvalidAmount(amount) => {
                RoundError::InvalidBet(format!("invalid amount {}", amount))
            }
            LedgerError::Unavailable(reason) => RoundError::LedgerFailure(reason),
        }
    }
}

/// Settles bets and cash-outs against the ledger.
pub struct CashoutProcessor {
    ledger: Arc<dyn Ledger>,
    ledger_timeout: Duration,
}

impl CashoutProcessor {
    /// Create a processor. Each ledger call is bounded by `ledger_timeout`.
    pub fn new(ledger: Arc<dyn Ledger>, ledger_timeout: Duration) -> Self {
        Self { ledger, ledger_timeout }
    }

    /// Settle the caller's active bet at the current multiplier.
    ///
    /// A refused credit leaves the bet open for a retry. A credit that times
    /// out may still land, so the bet is held instead and never paid twice.
    pub async fn request(
        &self,
        engine: &mut RoundEngine,
        connection_id: ConnectionId,
    ) -> Result<CashoutRecord, RoundError> {
        let pending = engine.check_cashout(connection_id)?;
        let credit = self.ledger.credit(&pending.participant_id, pending.currency, pending.payout);

        match timeout(self.ledger_timeout, credit).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                warn!(
                    "Cash-out credit refused for {} ({} {}): {}",
                    pending.participant_id, pending.payout, pending.currency, e
                );
                return Err(RoundError::LedgerFailure(e.to_string()));
            }
            Err(_) => {
                error!(
                    "Cash-out credit for {} ({} {} at {}) timed out after {:?}, reconcile manually",
                    pending.participant_id, pending.payout, pending.currency,
                    pending.multiplier, self.ledger_timeout
                );
                engine.hold_cashout(&pending)?;
                return Err(RoundError::SettlementPending);
            }
        }

        let record = engine.commit_cashout(&pending, Uuid::new_v4(), Utc::now())?;
        info!(
            "{} cashed out {} {} at {}",
            record.participant_id, record.payout_amount, record.currency,
            record.multiplier_at_exit
        );
        Ok(record)
    }

    /// Debit the stake and record the bet in the open round.
    pub async fn stake(
        &self,
        engine: &mut RoundEngine,
        connection_id: ConnectionId,
        request: BetRequest,
    ) -> Result<Bet, RoundError> {
        engine.check_bet(&request)?;

        let (participant, currency, amount) =
            (request.participant_id.clone(), request.crypto_type, request.crypto_amount);

        self.bounded(self.ledger.debit(&participant, currency, amount)).await?;

        match engine.place_bet(connection_id, request, Utc::now()) {
            Ok(bet) => Ok(bet),
            Err(e) => {
                self.refund_stake(&participant, currency, amount).await;
                Err(e)
            }
        }
    }

    /// Credit back every stake in a discarded round that never cashed out.
    ///
    /// Held bets are skipped. Returns how many refunds succeeded.
    pub async fn refund(&self, round: &Round) -> usize {
        let mut refunded = 0;
        for bet in round.bets.iter().filter(|b| !b.has_cashed_out) {
            if bet.settlement_unknown {
                warn!("Not refunding held bet of {} in round {}", bet.participant_id, round.number);
                continue;
            }
            if self.refund_stake(&bet.participant_id, bet.crypto_type, bet.crypto_amount).await {
                refunded += 1;
            }
        }
        if refunded > 0 {
            info!("Refunded {} stakes from discarded round {}", refunded, round.number);
        }
        refunded
    }

    /// Wallet lookup.
    pub async fn balance(&self, participant: &str) -> Result<Wallet, RoundError> {
        self.bounded(self.ledger.balance(participant)).await
    }

    async fn refund_stake(&self, participant: &str, currency: CryptoType, amount: f64) -> bool {
        match self.bounded(self.ledger.credit(participant, currency, amount)).await {
            Ok(_) => true,
            Err(e) => {
                error!("Failed to refund {} {} to {}: {}", amount, currency, participant, e);
                false
            }
        }
    }

    /// Run a ledger call under the configured timeout.
    async fn bounded<T, F>(&self, call: F) -> Result<T, RoundError>
    where
        F: std::future::Future<Output = Result<T, LedgerError>>,
    {
        match timeout(self.ledger_timeout, call).await {
            Ok(result) => result.map_err(RoundError::from),
            Err(_) => {
                error!("Ledger call timed out after {:?}, outcome unknown", self.ledger_timeout);
                Err(RoundError::LedgerFailure(format!(
                    "ledger timed out after {:?}",
                    self.ledger_timeout
                )))
            }
        }
    }
}

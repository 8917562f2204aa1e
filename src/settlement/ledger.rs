//! Ledger Collaborator
//!
//! Balance storage lives outside the round engine. The engine only needs
//! atomic per-participant credit and debit; anything that provides them can
//! stand in for the wallet store.

use std::collections::BTreeMap;
use async_trait::async_trait;
use serde::{Serialize, Deserialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::game::round::{CryptoType, ParticipantId};

/// Crypto balances held by one participant.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    /// Bitcoin balance.
    #[serde(rename = "BTC", default)]
    pub btc: f64,
    /// Ether balance.
    #[serde(rename = "ETH", default)]
    pub eth: f64,
}

impl Wallet {
    /// Balance in one currency.
    pub fn get(&self, currency: CryptoType) -> f64 {
        match currency {
            CryptoType::Btc => self.btc,
            CryptoType::Eth => self.eth,
        }
    }

    fn get_mut(&mut self, currency: CryptoType) -> &mut f64 {
        match currency {
            CryptoType::Btc => &mut self.btc,
            CryptoType::Eth => &mut self.eth,
        }
    }
}

/// Ledger errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LedgerError {
    /// No wallet for this participant.
    #[error("Unknown participant: {0}")]
    UnknownParticipant(ParticipantId),

    /// Debit exceeds the balance.
    #[error("Insufficient {currency} balance: have {available}, need {requested}")]
    InsufficientFunds {
        /// Currency debited.
        currency: CryptoType,
        /// Balance before the debit.
        available: f64,
        /// Amount requested.
        requested: f64,
    },

    /// Amount is negative or not finite.
    #[error("Invalid amount: {0}")]
    InvalidAmount(f64),

    /// Backing store could not be reached.
    #[error("Ledger unavailable: {0}")]
    Unavailable(String),
}

/// Balance store consulted by bets and cash-outs.
///
/// Each call must be all-or-nothing for the participant.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Add `amount` to a balance. Returns the new balance.
    async fn credit(
        &self,
        participant: &str,
        currency: CryptoType,
        amount: f64,
    ) -> Result<f64, LedgerError>;

    /// Remove `amount` from a balance, failing if it would go negative.
    async fn debit(
        &self,
        participant: &str,
        currency: CryptoType,
        amount: f64,
    ) -> Result<f64, LedgerError>;

    /// Current balances for a participant.
    async fn balance(&self, participant: &str) -> Result<Wallet, LedgerError>;
}

/// Initial wallet for one participant, as read from a seed file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletSeed {
    /// Wallet owner.
    pub player_id: ParticipantId,
    /// Starting balances.
    pub wallet: Wallet,
}

impl WalletSeed {
    /// The three demo wallets used when no seed file is configured.
    pub fn demo() -> Vec<WalletSeed> {
        [("player1", 0.01, 0.5), ("player2", 0.02, 0.1), ("player3", 0.005, 1.0)]
            .into_iter()
            .map(|(id, btc, eth)| WalletSeed {
                player_id: id.to_string(),
                wallet: Wallet { btc, eth },
            })
            .collect()
    }

    /// Parse a JSON array of seeds.
    pub fn parse_list(json: &str) -> Result<Vec<WalletSeed>, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Process-local ledger.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    wallets: RwLock<BTreeMap<ParticipantId, Wallet>>,
}

impl InMemoryLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a ledger pre-loaded with wallets.
    pub fn with_seeds(seeds: impl IntoIterator<Item = WalletSeed>) -> Self {
        let wallets = seeds.into_iter()
            .map(|s| (s.player_id, s.wallet))
            .collect();
        Self { wallets: RwLock::new(wallets) }
    }

    /// Insert or replace wallets.
    pub async fn seed(&self, seeds: impl IntoIterator<Item = WalletSeed>) -> usize {
        let mut wallets = self.wallets.write().await;
        let mut count = 0;
        for seed in seeds {
            wallets.insert(seed.player_id, seed.wallet);
            count += 1;
        }
        count
    }

    /// Number of wallets.
    pub async fn len(&self) -> usize {
        self.wallets.read().await.len()
    }

    /// Whether no wallets are loaded.
    pub async fn is_empty(&self) -> bool {
        self.wallets.read().await.is_empty()
    }
}

fn check_amount(amount: f64) -> Result<(), LedgerError> {
    if amount.is_finite() && amount >= 0.0 {
        Ok(())
    } else {
        Err(LedgerError::InvalidAmount(amount))
    }
}

#[async_trait]
impl Ledger for InMemoryLedger {
    async fn credit(
        &self,
        participant: &str,
        currency: CryptoType,
        amount: f64,
    ) -> Result<f64, LedgerError> {
        check_amount(amount)?;
        let mut wallets = self.wallets.write().await;
        let wallet = wallets.get_mut(participant)
            .ok_or_else(|| LedgerError::UnknownParticipant(participant.to_string()))?;

        let balance = wallet.get_mut(currency);
        *balance += amount;
        debug!("Credited {} {} to {} (now {})", amount, currency, participant, balance);
        Ok(*balance)
    }

    async fn debit(
        &self,
        participant: &str,
        currency: CryptoType,
        amount: f64,
    ) -> Result<f64, LedgerError> {
        check_amount(amount)?;
        let mut wallets = self.wallets.write().await;
        let wallet = wallets.get_mut(participant)
            .ok_or_else(|| LedgerError::UnknownParticipant(participant.to_string()))?;

        let balance = wallet.get_mut(currency);
        if *balance < amount {
            return Err(LedgerError::InsufficientFunds {
                currency,
                available: *balance,
                requested: amount,
            });
        }
        *balance -= amount;
        debug!("Debited {} {} from {} (now {})", amount, currency, participant, balance);
        Ok(*balance)
    }

    async fn balance(&self, participant: &str) -> Result<Wallet, LedgerError> {
        self.wallets.read().await
            .get(participant)
            .copied()
            .ok_or_else(|| LedgerError::UnknownParticipant(participant.to_string()))
    }
}

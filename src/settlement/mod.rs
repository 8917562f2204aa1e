//! Settlement: ledger and persistence collaborators, and the cash-out
//! processor that moves money between them and the engine.

pub mod cashout;
pub mod ledger;
pub mod store;

pub use cashout::CashoutProcessor;
pub use ledger::{InMemoryLedger, Ledger, LedgerError, Wallet, WalletSeed};
pub use store::{InMemoryRoundStore, JsonlRoundStore, RoundStore, RoundWriter, StoreError};

//! # Crash Game Server
//!
//! Provably-fair multiplayer crash rounds: a shared multiplier climbs from
//! 1.00x until a pre-committed crash point, and players must cash out before
//! it gets there.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    CRASH SERVER                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/             - Deterministic primitives               │
//! │  ├── multiplier.rs - Basis-point multiplier                 │
//! │  └── hash.rs       - SHA-256 helpers                        │
//! │                                                             │
//! │  game/             - Round logic (synchronous, no I/O)      │
//! │  ├── crash.rs      - Crash point generator                  │
//! │  ├── round.rs      - Round, Bet, CashoutRecord              │
//! │  ├── registry.rs   - Per-round bet registry                 │
//! │  ├── engine.rs     - Round state machine                    │
//! │  └── error.rs      - Rejection taxonomy                     │
//! │                                                             │
//! │  proof/                                                     │
//! │  └── commitment.rs - Seed commitment and reveal             │
//! │                                                             │
//! │  settlement/       - External collaborators                 │
//! │  ├── ledger.rs     - Wallet credit/debit                    │
//! │  ├── store.rs      - Closed round persistence               │
//! │  └── cashout.rs    - Cash-out processor                     │
//! │                                                             │
//! │  runtime/          - Concurrency                            │
//! │  ├── actor.rs      - Single writer of round state           │
//! │  ├── ingress.rs    - Mailbox and handle                     │
//! │  └── lifecycle.rs  - Start/halt on population edges         │
//! │                                                             │
//! │  network/          - WebSocket front end                    │
//! │  ├── protocol.rs   - JSON messages                          │
//! │  └── server.rs     - Connections and routing                │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Fairness
//!
//! Each round's crash point is `generate(seed, round)`. The server publishes
//! a SHA-256 commitment to the seed when the round opens and reveals the
//! seed at the crash, so anyone can check both.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod network;
pub mod proof;
pub mod runtime;
pub mod settlement;

// Re-export commonly used types
pub use core::multiplier::Multiplier;
pub use game::crash::generate;
pub use game::engine::{EngineConfig, RoundEngine, SeedPolicy};
pub use game::error::RoundError;
pub use game::round::{Bet, CashoutRecord, CryptoType, Round, RoundPhase};
pub use runtime::{EngineActor, EngineHandle, LifecycleController};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

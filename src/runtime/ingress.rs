//! Engine Mailbox
//!
//! The request/response contract of the engine actor. Callers never touch
//! engine state directly: they send a message and wait on a oneshot reply.

use tokio::sync::{broadcast, mpsc, oneshot, watch};

use crate::core::multiplier::Multiplier;
use crate::game::engine::EngineStatus;
use crate::game::error::RoundError;
use crate::game::round::{Bet, BetRequest, CashoutRecord, ConnectionId, RoundNumber};
use crate::proof::commitment::RoundReveal;
use crate::settlement::ledger::Wallet;

/// Requests handled by the actor.
pub(crate) enum Message {
    Start {
        response: oneshot::Sender<()>,
    },
    Halt {
        response: oneshot::Sender<()>,
    },
    PlaceBet {
        connection_id: ConnectionId,
        request: BetRequest,
        response: oneshot::Sender<Result<Bet, RoundError>>,
    },
    Cashout {
        connection_id: ConnectionId,
        response: oneshot::Sender<Result<CashoutRecord, RoundError>>,
    },
    Balance {
        participant_id: String,
        response: oneshot::Sender<Result<Wallet, RoundError>>,
    },
}

/// Round events fanned out to every subscriber.
#[derive(Clone, Debug, PartialEq)]
pub enum EngineEvent {
    /// A round opened for bets.
    RoundStarted {
        /// New round number.
        round_number: RoundNumber,
        /// Hex commitment to the round seed.
        commitment: String,
    },
    /// The multiplier advanced one tick.
    MultiplierUpdated(Multiplier),
    /// The round crashed; seed revealed.
    RoundCrashed(RoundReveal),
    /// A participant settled.
    CashedOut(CashoutRecord),
    /// Cooldown started.
    Waiting {
        /// Seconds until the next round opens.
        next_round_in_secs: u64,
    },
}

/// Cloneable handle to the engine actor.
#[derive(Clone, Debug)]
pub struct EngineHandle {
    sender: mpsc::Sender<Message>,
    events: broadcast::Sender<EngineEvent>,
    status: watch::Receiver<EngineStatus>,
}

impl std::fmt::Debug for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Start { .. } => write!(f, "Start"),
            Self::Halt { .. } => write!(f, "Halt"),
            Self::PlaceBet { connection_id, .. } => write!(f, "PlaceBet({})", connection_id),
            Self::Cashout { connection_id, .. } => write!(f, "Cashout({})", connection_id),
            Self::Balance { participant_id, .. } => write!(f, "Balance({})", participant_id),
        }
    }
}

impl EngineHandle {
    pub(super) fn new(
        sender: mpsc::Sender<Message>,
        events: broadcast::Sender<EngineEvent>,
        status: watch::Receiver<EngineStatus>,
    ) -> Self {
        Self { sender, events, status }
    }

    /// Begin running rounds. No-op if already started.
    pub async fn start(&self) -> Result<(), RoundError> {
        let (response, receiver) = oneshot::channel();
        self.request(Message::Start { response }, receiver).await
    }

    /// Stop the clock, discard the round in flight, park in Idle.
    pub async fn halt(&self) -> Result<(), RoundError> {
        let (response, receiver) = oneshot::channel();
        self.request(Message::Halt { response }, receiver).await
    }

    /// Debit and register a bet for the open round.
    pub async fn place_bet(
        &self,
        connection_id: ConnectionId,
        request: BetRequest,
    ) -> Result<Bet, RoundError> {
        let (response, receiver) = oneshot::channel();
        self.request(Message::PlaceBet { connection_id, request, response }, receiver).await?
    }

    /// Cash out the connection's active bet.
    pub async fn cashout(&self, connection_id: ConnectionId) -> Result<CashoutRecord, RoundError> {
        let (response, receiver) = oneshot::channel();
        self.request(Message::Cashout { connection_id, response }, receiver).await?
    }

    /// Look up a participant's balances.
    pub async fn balance(&self, participant_id: impl Into<String>) -> Result<Wallet, RoundError> {
        let (response, receiver) = oneshot::channel();
        let participant_id = participant_id.into();
        self.request(Message::Balance { participant_id, response }, receiver).await?
    }

    /// Subscribe to round events.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Latest phase and multiplier snapshot.
    pub fn status(&self) -> EngineStatus {
        *self.status.borrow()
    }

    /// Receiver that observes every status change.
    pub fn watch_status(&self) -> watch::Receiver<EngineStatus> {
        self.status.clone()
    }

    async fn request<T>(
        &self,
        message: Message,
        receiver: oneshot::Receiver<T>,
    ) -> Result<T, RoundError> {
        self.sender.send(message).await.map_err(|_| RoundError::EngineStopped)?;
        receiver.await.map_err(|_| RoundError::EngineStopped)
    }
}

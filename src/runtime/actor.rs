//! Engine Actor
//!
//! The single exclusive writer of round state. One task owns the engine, its
//! registry and the cash-out processor, and drives the clock with one
//! deadline at a time:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ loop select! (biased)                                        │
//! │   1. deadline ──▶ Open:    begin_running, first tick         │
//! │                   Running: tick / crash, persist, cooldown   │
//! │                   Crashed: open next round                   │
//! │   2. mailbox  ──▶ Start / Halt / PlaceBet / Cashout / Balance│
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The timer branch is polled first so a busy mailbox cannot hold the
//! clock back. Halting clears the deadline, so no tick fires afterwards.

use std::sync::Arc;
use std::time::Duration;
use chrono::Utc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, instrument, warn};

use crate::game::engine::{EngineConfig, EngineStatus, RoundEngine, TickOutcome};
use crate::game::round::{Round, RoundPhase};
use crate::proof::commitment::RoundReveal;
use crate::runtime::ingress::{EngineEvent, EngineHandle, Message};
use crate::settlement::cashout::CashoutProcessor;
use crate::settlement::ledger::Ledger;
use crate::settlement::store::RoundWriter;

/// Pending requests before callers wait on the mailbox.
pub const MAILBOX_SIZE: usize = 1024;

/// Events buffered per subscriber before it starts lagging.
pub const EVENT_CAPACITY: usize = 1024;

/// Stand-in deadline while no timer is armed. Never awaited.
const IDLE_PARK: Duration = Duration::from_secs(86_400);

/// Owns all round-scoped mutable state.
pub struct EngineActor {
    engine: RoundEngine,
    processor: CashoutProcessor,
    writer: RoundWriter,
    mailbox: mpsc::Receiver<Message>,
    events: broadcast::Sender<EngineEvent>,
    status: watch::Sender<EngineStatus>,
    deadline: Option<Instant>,
    started: bool,
}

impl EngineActor {
    /// Build the actor and the handle callers use to reach it.
    pub fn new(
        config: EngineConfig,
        ledger: Arc<dyn Ledger>,
        writer: RoundWriter,
    ) -> (Self, EngineHandle) {
        let engine = RoundEngine::new(config);
        let processor = CashoutProcessor::new(ledger, engine.config().ledger_timeout);

        let (sender, mailbox) = mpsc::channel(MAILBOX_SIZE);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (status, status_rx) = watch::channel(engine.status());

        let handle = EngineHandle::new(sender, events.clone(), status_rx);
        let actor = Self {
            engine,
            processor,
            writer,
            mailbox,
            events,
            status,
            deadline: None,
            started: false,
        };

        (actor, handle)
    }

    /// Spawn the actor. It runs until every handle is dropped.
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        info!("Engine actor started");

        loop {
            let wake = self.deadline.unwrap_or_else(|| Instant::now() + IDLE_PARK);

            tokio::select! {
                biased;

                _ = sleep_until(wake), if self.deadline.is_some() => {
                    self.on_deadline();
                }
                message = self.mailbox.recv() => match message {
                    Some(message) => self.handle(message).await,
                    None => break,
                },
            }
        }

        if let Some(round) = self.engine.halt() {
            self.processor.refund(&round).await;
        }
        info!("Engine actor stopped");
    }

    async fn handle(&mut self, message: Message) {
        match message {
            Message::Start { response } => {
                self.on_start();
                let _ = response.send(());
            }
            Message::Halt { response } => {
                self.on_halt().await;
                let _ = response.send(());
            }
            Message::PlaceBet { connection_id, request, response } => {
                let result = self.processor.stake(&mut self.engine, connection_id, request).await;
                if let Err(ref e) = result {
                    debug!("Bet from connection {} rejected: {}", connection_id, e);
                }
                let _ = response.send(result);
            }
            Message::Cashout { connection_id, response } => {
                let result = self.processor.request(&mut self.engine, connection_id).await;
                match result {
                    Ok(ref record) => self.emit(EngineEvent::CashedOut(record.clone())),
                    Err(ref e) => debug!("Cash-out from connection {} rejected: {}", connection_id, e),
                }
                let _ = response.send(result);
            }
            Message::Balance { participant_id, response } => {
                let _ = response.send(self.processor.balance(&participant_id).await);
            }
        }
    }

    fn on_start(&mut self) {
        if self.started {
            return;
        }
        self.started = true;
        info!("Engine starting");

        if self.engine.phase() == RoundPhase::Idle {
            self.open_round();
        }
    }

    #[instrument(skip(self))]
    async fn on_halt(&mut self) {
        self.started = false;
        self.deadline = None;

        if let Some(round) = self.engine.halt() {
            self.processor.refund(&round).await;
        }
        self.publish_status();
    }

    fn on_deadline(&mut self) {
        let now = Instant::now();

        match self.engine.phase() {
            RoundPhase::Open => match self.engine.begin_running(Utc::now()) {
                Ok(None) => {
                    self.deadline = Some(now + self.engine.config().tick_interval);
                    self.publish_status();
                }
                Ok(Some(round)) => {
                    self.on_crash(round, now);
                    self.publish_status();
                }
                Err(e) => {
                    error!("Could not start round: {}", e);
                    self.deadline = None;
                }
            },
            RoundPhase::Running => self.on_tick(now),
            RoundPhase::Crashed => {
                if self.started {
                    self.open_round();
                } else {
                    self.deadline = None;
                }
            }
            RoundPhase::Idle => {
                warn!("Timer fired while idle");
                self.deadline = None;
            }
        }
    }

    fn on_tick(&mut self, now: Instant) {
        let scheduled = self.deadline.unwrap_or(now);

        match self.engine.tick(Utc::now()) {
            Some(TickOutcome::Climbing(multiplier)) => {
                self.deadline = Some(next_tick(scheduled, self.engine.config().tick_interval, now));
                self.emit(EngineEvent::MultiplierUpdated(multiplier));
            }
            Some(TickOutcome::Crashed(round)) => self.on_crash(round, now),
            None => {
                warn!("Tick outside a running round");
                self.deadline = None;
            }
        }
        self.publish_status();
    }

    /// Final multiplier, reveal, persist, then announce the cooldown.
    fn on_crash(&mut self, round: Round, now: Instant) {
        let cooldown = self.engine.config().cooldown;
        self.deadline = Some(now + cooldown);

        self.emit(EngineEvent::MultiplierUpdated(round.crash_point));
        self.emit(EngineEvent::RoundCrashed(RoundReveal::from_round(&round)));
        self.writer.save(round);
        self.emit(EngineEvent::Waiting {
            next_round_in_secs: whole_secs_ceil(cooldown),
        });
    }

    fn open_round(&mut self) {
        match self.engine.open_round(Utc::now()) {
            Ok(opened) => {
                if opened.history_reset {
                    self.writer.purge();
                }
                self.deadline = Some(Instant::now() + self.engine.config().betting_window);
                self.emit(EngineEvent::RoundStarted {
                    round_number: opened.round_number,
                    commitment: opened.commitment.to_hex(),
                });
            }
            Err(e) => {
                error!("Could not open round: {}", e);
                self.deadline = None;
            }
        }
        self.publish_status();
    }

    fn emit(&self, event: EngineEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn publish_status(&self) {
        self.status.send_replace(self.engine.status());
    }
}

/// Fixed-rate schedule; if the actor fell behind, skip to one period from now.
fn next_tick(scheduled: Instant, period: Duration, now: Instant) -> Instant {
    let next = scheduled + period;
    if next > now {
        next
    } else {
        now + period
    }
}

/// Seconds until the next round, rounded up so a short cooldown never reads as zero.
fn whole_secs_ceil(d: Duration) -> u64 {
    let secs = d.as_secs();
    if d.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

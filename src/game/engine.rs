//! Round Engine
//!
//! The canonical crash-round state machine. Synchronous and free of I/O:
//! the runtime actor drives it with timer events and requests, and owns it
//! exclusively.
//!
//! ```text
//!            start                 betting window        crash point
//!   Idle ──────────────▶ Open ─────────────────▶ Running ───────────▶ Crashed
//!    ▲                    ▲                         │ tick (+step)       │
//!    │ halt               │ cooldown                └──────┘             │
//!    └────────────────────┴────────────────────────────────────────────┘
//! ```

use std::str::FromStr;
use std::time::Duration;
use chrono::{DateTime, Utc};
use rand::RngCore;
use tracing::{debug, info, warn};

use crate::core::multiplier::{Multiplier, DEFAULT_STEP};
use crate::game::crash::generate;
use crate::game::error::RoundError;
use crate::game::registry::BetRegistry;
use crate::game::round::{
    Bet, BetRequest, CashoutRecord, ConnectionId, CryptoType, ParticipantId, Round,
    RoundNumber, RoundPhase,
};
use crate::proof::commitment::RoundCommitment;

/// Where each round's seed comes from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SeedPolicy {
    /// Fresh 32 random bytes per round, hex-encoded.
    Random,
    /// One shared secret for every round. Revealing it at crash exposes
    /// all later rounds, so only use it for replay and tests.
    Fixed(String),
}

/// Configuration for the round engine.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Wall-clock interval between ticks.
    pub tick_interval: Duration,
    /// Multiplier added per tick.
    pub multiplier_step: Multiplier,
    /// How long a round stays Open for bets.
    pub betting_window: Duration,
    /// Pause between a crash and the next Open.
    pub cooldown: Duration,
    /// Completed rounds before history is purged and numbering restarts (0 = never).
    pub rounds_before_reset: u64,
    /// Upper bound on a single ledger call inside the engine step.
    pub ledger_timeout: Duration,
    /// Seed source.
    pub seed_policy: SeedPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(100),
            multiplier_step: DEFAULT_STEP,
            betting_window: Duration::from_secs(7),
            cooldown: Duration::from_secs(3),
            rounds_before_reset: 1000,
            ledger_timeout: Duration::from_millis(50),
            seed_policy: SeedPolicy::Random,
        }
    }
}

impl EngineConfig {
    /// Create config from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let step_bp = env_or("CRASH_STEP_BP", defaults.multiplier_step.basis_points());

        Self {
            tick_interval: Duration::from_millis(env_or(
                "CRASH_TICK_MS",
                defaults.tick_interval.as_millis() as u64,
            )),
            multiplier_step: Multiplier::from_basis_points(step_bp),
            betting_window: Duration::from_millis(env_or(
                "CRASH_BETTING_WINDOW_MS",
                defaults.betting_window.as_millis() as u64,
            )),
            cooldown: Duration::from_millis(env_or(
                "CRASH_COOLDOWN_MS",
                defaults.cooldown.as_millis() as u64,
            )),
            rounds_before_reset: env_or("CRASH_RESET_AFTER", defaults.rounds_before_reset),
            ledger_timeout: Duration::from_millis(env_or(
                "CRASH_LEDGER_TIMEOUT_MS",
                defaults.ledger_timeout.as_millis() as u64,
            )),
            seed_policy: std::env::var("CRASH_FIXED_SEED")
                .ok()
                .filter(|s| !s.is_empty())
                .map(SeedPolicy::Fixed)
                .unwrap_or(SeedPolicy::Random),
        }
        .sanitized()
    }

    /// Replace unusable values with defaults.
    pub fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        if self.multiplier_step.basis_points() == 0 {
            warn!("Multiplier step must be positive, using {}", defaults.multiplier_step);
            self.multiplier_step = defaults.multiplier_step;
        }
        if self.tick_interval.is_zero() {
            warn!("Tick interval must be positive, using {:?}", defaults.tick_interval);
            self.tick_interval = defaults.tick_interval;
        }
        if let SeedPolicy::Fixed(ref seed) = self.seed_policy {
            if seed.is_empty() {
                self.seed_policy = SeedPolicy::Random;
            }
        }
        self
    }
}

/// Parse an environment variable, warning and falling back on bad input.
pub(crate) fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                warn!("Ignoring invalid {}={:?}", key, raw);
                default
            }
        },
        Err(_) => default,
    }
}

/// Result of opening a round.
#[derive(Clone, Debug)]
pub struct RoundOpened {
    /// New round number.
    pub round_number: RoundNumber,
    /// Commitment to publish.
    pub commitment: RoundCommitment,
    /// Numbering restarted at 1; stored history should be purged.
    pub history_reset: bool,
}

/// Result of a tick.
#[derive(Clone, Debug)]
pub enum TickOutcome {
    /// Multiplier advanced and is still below the crash point.
    Climbing(Multiplier),
    /// Multiplier reached the crash point. Carries the closed round.
    Crashed(Round),
}

/// A validated cash-out waiting for the ledger credit.
#[derive(Clone, Debug)]
pub struct PendingCashout {
    round_number: RoundNumber,
    bet_index: usize,
    /// Requesting connection.
    pub connection_id: ConnectionId,
    /// Wallet to credit.
    pub participant_id: ParticipantId,
    /// Staked amount.
    pub crypto_amount: f64,
    /// Payout currency.
    pub currency: CryptoType,
    /// Multiplier at the instant of validation.
    pub multiplier: Multiplier,
    /// Stake x multiplier.
    pub payout: f64,
}

/// Point-in-time view of the engine for readers outside the actor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EngineStatus {
    /// Current phase.
    pub phase: RoundPhase,
    /// Current (or just crashed) round.
    pub round_number: Option<RoundNumber>,
    /// Live multiplier.
    pub multiplier: Multiplier,
}

/// The round in flight and its bets.
#[derive(Debug)]
struct ActiveRound {
    round: Round,
    registry: BetRegistry,
}

/// Crash round state machine.
#[derive(Debug)]
pub struct RoundEngine {
    config: EngineConfig,
    phase: RoundPhase,
    active: Option<ActiveRound>,
    multiplier: Multiplier,
    next_round_number: RoundNumber,
    completed_rounds: u64,
}

impl RoundEngine {
    /// Create an idle engine.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config: config.sanitized(),
            phase: RoundPhase::Idle,
            active: None,
            multiplier: Multiplier::ONE,
            next_round_number: 1,
            completed_rounds: 0,
        }
    }

    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Current phase.
    pub fn phase(&self) -> RoundPhase {
        self.phase
    }

    /// Live multiplier.
    pub fn multiplier(&self) -> Multiplier {
        self.multiplier
    }

    /// Number of the round in flight (or just crashed).
    pub fn round_number(&self) -> Option<RoundNumber> {
        self.active.as_ref().map(|a| a.round.number)
    }

    /// Rounds crashed since the last history reset.
    pub fn completed_rounds(&self) -> u64 {
        self.completed_rounds
    }

    /// Bets of the round in flight.
    pub fn registry(&self) -> Option<&BetRegistry> {
        self.active.as_ref().map(|a| &a.registry)
    }

    /// Crash point of the round in flight. Never sent to clients before crash.
    pub(crate) fn crash_point(&self) -> Option<Multiplier> {
        self.active.as_ref().map(|a| a.round.crash_point)
    }

    /// Snapshot for readers outside the actor.
    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            phase: self.phase,
            round_number: self.round_number(),
            multiplier: self.multiplier,
        }
    }

    /// Idle/Crashed -> Open: allocate the next round and fix its crash point.
    pub fn open_round(&mut self, now: DateTime<Utc>) -> Result<RoundOpened, RoundError> {
        match self.phase {
            RoundPhase::Idle | RoundPhase::Crashed => {}
            RoundPhase::Open | RoundPhase::Running => return Err(RoundError::AlreadyStarted),
        }

        // Housekeeping only ever happens between rounds.
        let limit = self.config.rounds_before_reset;
        let history_reset = limit > 0 && self.completed_rounds >= limit;
        if history_reset {
            info!("Resetting round numbering after {} rounds", self.completed_rounds);
            self.next_round_number = 1;
            self.completed_rounds = 0;
        }

        let number = self.next_round_number;
        self.next_round_number += 1;

        let seed = self.next_seed();
        let crash_point = generate(&seed, number);
        let commitment = RoundCommitment::new(&seed, number);

        self.active = Some(ActiveRound {
            round: Round {
                number,
                seed,
                commitment: commitment.to_hex(),
                crash_point,
                start_time: now,
                end_time: None,
                bets: Vec::new(),
                cashouts: Vec::new(),
            },
            registry: BetRegistry::new(),
        });
        self.phase = RoundPhase::Open;
        self.multiplier = Multiplier::ONE;

        info!("Round {} open", number);

        Ok(RoundOpened {
            round_number: number,
            commitment,
            history_reset,
        })
    }

    /// Open -> Running: close the registry and start the clock at 1.00x.
    ///
    /// A 1.00x crash point is already reached, so the round crashes here
    /// and the closed round is returned.
    pub fn begin_running(&mut self, now: DateTime<Utc>) -> Result<Option<Round>, RoundError> {
        if self.phase != RoundPhase::Open {
            return Err(RoundError::NoActiveRound);
        }
        let active = self.active.as_mut().ok_or(RoundError::NoActiveRound)?;

        if !active.registry.close() {
            warn!("Registry for round {} was already closed", active.round.number);
        }
        self.phase = RoundPhase::Running;
        self.multiplier = Multiplier::ONE;

        info!("Round {} running with {} bets", active.round.number, active.registry.len());

        if self.multiplier >= active.round.crash_point {
            return Ok(self.crash(now));
        }
        Ok(None)
    }

    /// One tick of the clock. The only place the multiplier moves.
    ///
    /// Returns `None` unless Running.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Option<TickOutcome> {
        if self.phase != RoundPhase::Running {
            return None;
        }
        let crash_point = self.active.as_ref()?.round.crash_point;

        self.multiplier = self.multiplier.step_towards(self.config.multiplier_step, crash_point);

        if self.multiplier < crash_point {
            return Some(TickOutcome::Climbing(self.multiplier));
        }
        self.crash(now).map(TickOutcome::Crashed)
    }

    /// Running -> Crashed. Returns a copy of the closed round for persistence.
    fn crash(&mut self, now: DateTime<Utc>) -> Option<Round> {
        let active = self.active.as_mut()?;

        self.phase = RoundPhase::Crashed;
        self.completed_rounds += 1;
        active.round.end_time = Some(now);

        let mut closed = active.round.clone();
        closed.bets = active.registry.bets().to_vec();

        info!(
            "Round {} crashed at {} ({} bets, {} cashouts)",
            closed.number, closed.crash_point, closed.bets.len(), closed.cashouts.len()
        );

        Some(closed)
    }

    /// Validate a bet without recording it.
    pub fn check_bet(&self, request: &BetRequest) -> Result<RoundNumber, RoundError> {
        match self.phase {
            RoundPhase::Open => {}
            RoundPhase::Running => return Err(RoundError::AlreadyStarted),
            RoundPhase::Idle | RoundPhase::Crashed => return Err(RoundError::NoActiveRound),
        }
        request.validate().map_err(RoundError::InvalidBet)?;
        self.round_number().ok_or(RoundError::NoActiveRound)
    }

    /// Record a bet in the open round.
    pub fn place_bet(
        &mut self,
        connection_id: ConnectionId,
        request: BetRequest,
        now: DateTime<Utc>,
    ) -> Result<Bet, RoundError> {
        self.check_bet(&request)?;
        let active = self.active.as_mut().ok_or(RoundError::NoActiveRound)?;

        let bet = request.into_bet(connection_id, now);
        active.registry.register(bet.clone())?;

        debug!(
            "Round {}: {} bet {} {}",
            active.round.number, bet.participant_id, bet.crypto_amount, bet.crypto_type
        );
        Ok(bet)
    }

    /// Validate a cash-out against the live state.
    ///
    /// Order: round running, active bet, multiplier below crash point.
    /// After a crash, a bettor who never cashed out gets `TooLate`. A bet held
    /// after a credit timeout gets `SettlementPending` until reconciled.
    pub fn check_cashout(&self, connection_id: ConnectionId) -> Result<PendingCashout, RoundError> {
        let active = match (self.phase, self.active.as_ref()) {
            (RoundPhase::Running, Some(active)) => active,
            (RoundPhase::Crashed, Some(active)) => {
                return Err(if active.registry.find(connection_id).is_some() {
                    RoundError::TooLate
                } else if active.registry.has_settled(connection_id) {
                    RoundError::AlreadyCashedOut
                } else if active.registry.has_pending_settlement(connection_id) {
                    RoundError::SettlementPending
                } else {
                    RoundError::NoActiveRound
                });
            }
            _ => return Err(RoundError::NoActiveRound),
        };

        let Some(bet_index) = active.registry.position(connection_id) else {
            return Err(if active.registry.has_settled(connection_id) {
                RoundError::AlreadyCashedOut
            } else if active.registry.has_pending_settlement(connection_id) {
                RoundError::SettlementPending
            } else {
                RoundError::NoActiveBet
            });
        };

        if self.multiplier >= active.round.crash_point {
            return Err(RoundError::TooLate);
        }

        let bet = &active.registry.bets()[bet_index];
        Ok(PendingCashout {
            round_number: active.round.number,
            bet_index,
            connection_id,
            participant_id: bet.participant_id.clone(),
            crypto_amount: bet.crypto_amount,
            currency: bet.crypto_type,
            multiplier: self.multiplier,
            payout: bet.crypto_amount * self.multiplier.to_f64(),
        })
    }

    /// Flip the bet and append the settlement record.
    ///
    /// Must follow `check_cashout` with no engine mutation in between; the
    /// checks are repeated so a stale `PendingCashout` can never pay twice.
    pub fn commit_cashout(
        &mut self,
        pending: &PendingCashout,
        transaction_id: uuid::Uuid,
        now: DateTime<Utc>,
    ) -> Result<CashoutRecord, RoundError> {
        if self.phase != RoundPhase::Running {
            return Err(RoundError::TooLate);
        }
        let active = self.active.as_mut().ok_or(RoundError::NoActiveRound)?;
        if active.round.number != pending.round_number {
            return Err(RoundError::NoActiveBet);
        }
        if pending.multiplier >= active.round.crash_point {
            return Err(RoundError::TooLate);
        }

        active.registry.mark_cashed_out(pending.bet_index)?;

        let record = CashoutRecord {
            participant_id: pending.participant_id.clone(),
            payout_amount: pending.payout,
            multiplier_at_exit: pending.multiplier,
            currency: pending.currency,
            transaction_id,
            timestamp: now,
        };
        active.round.cashouts.push(record.clone());

        Ok(record)
    }

    /// Hold a validated cash-out whose credit outcome is unknown.
    ///
    /// The bet can no longer be cashed out or refunded; it is persisted with
    /// the round for reconciliation.
    pub fn hold_cashout(&mut self, pending: &PendingCashout) -> Result<(), RoundError> {
        let active = self.active.as_mut().ok_or(RoundError::NoActiveRound)?;
        if active.round.number != pending.round_number {
            return Err(RoundError::NoActiveBet);
        }
        let bet = active.registry.mark_settlement_unknown(pending.bet_index)?;
        warn!(
            "Round {}: holding {} bet {} {} pending reconciliation",
            active.round.number, bet.participant_id, bet.crypto_amount, bet.crypto_type
        );
        Ok(())
    }

    /// Drop the round in flight without completing it and park in Idle.
    ///
    /// Returns the discarded round (with its bets) so stakes can be refunded.
    /// A round that already crashed is complete and is not returned.
    pub fn halt(&mut self) -> Option<Round> {
        let unresolved = matches!(self.phase, RoundPhase::Open | RoundPhase::Running);
        let discarded = self.active.take()
            .filter(|_| unresolved)
            .map(|active| {
                let mut round = active.round;
                round.bets = active.registry.into_bets();
                round
            });

        match discarded {
            Some(ref round) => {
                info!("Halting engine, discarding round {} ({:?})", round.number, self.phase)
            }
            None => info!("Halting engine in {:?}", self.phase),
        }

        self.phase = RoundPhase::Idle;
        self.multiplier = Multiplier::ONE;
        discarded
    }

    /// Fresh seed per the configured policy.
    fn next_seed(&self) -> String {
        match self.config.seed_policy {
            SeedPolicy::Fixed(ref seed) => seed.clone(),
            SeedPolicy::Random => {
                let mut bytes = [0u8; 32];
                rand::thread_rng().fill_bytes(&mut bytes);
                hex::encode(bytes)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_engine(seed: &str) -> RoundEngine {
        RoundEngine::new(EngineConfig {
            seed_policy: SeedPolicy::Fixed(seed.into()),
            ..Default::default()
        })
    }

    fn btc_bet(player: &str, crypto_amount: f64) -> BetRequest {
        BetRequest {
            participant_id: player.into(),
            usd_amount: 10.0,
            crypto_amount,
            crypto_type: CryptoType::Btc,
        }
    }

    fn tick_until(engine: &mut RoundEngine, target: Multiplier) {
        while engine.multiplier() < target {
            match engine.tick(Utc::now()) {
                Some(TickOutcome::Climbing(_)) => {}
                other => panic!("unexpected tick outcome: {:?}", other),
            }
        }
    }

    fn crash(engine: &mut RoundEngine) -> Round {
        loop {
            match engine.tick(Utc::now()) {
                Some(TickOutcome::Climbing(_)) => continue,
                Some(TickOutcome::Crashed(round)) => return round,
                None => panic!("engine not running"),
            }
        }
    }

    #[test]
    fn test_starts_idle() {
        let mut engine = fixed_engine("secret-seed");
        assert_eq!(engine.phase(), RoundPhase::Idle);
        assert!(engine.round_number().is_none());
        assert!(engine.tick(Utc::now()).is_none());
    }

    #[test]
    fn test_open_fixes_crash_point() {
        let mut engine = fixed_engine("secret-seed");
        let opened = engine.open_round(Utc::now()).unwrap();

        assert_eq!(opened.round_number, 1);
        assert!(!opened.history_reset);
        assert_eq!(engine.phase(), RoundPhase::Open);
        assert_eq!(engine.crash_point(), Some(Multiplier::from_hundredths(335)));
        assert!(opened.commitment.verify("secret-seed"));
    }

    #[test]
    fn test_cannot_open_twice() {
        let mut engine = fixed_engine("secret-seed");
        engine.open_round(Utc::now()).unwrap();
        assert_eq!(engine.open_round(Utc::now()).unwrap_err(), RoundError::AlreadyStarted);
    }

    #[test]
    fn test_multiplier_does_not_move_while_open() {
        let mut engine = fixed_engine("secret-seed");
        engine.open_round(Utc::now()).unwrap();
        assert!(engine.tick(Utc::now()).is_none());
        assert_eq!(engine.multiplier(), Multiplier::ONE);
    }

    #[test]
    fn test_bet_after_running_rejected() {
        let mut engine = fixed_engine("secret-seed");
        engine.open_round(Utc::now()).unwrap();
        engine.place_bet(1, btc_bet("player1", 0.001), Utc::now()).unwrap();
        engine.begin_running(Utc::now()).unwrap();

        let result = engine.place_bet(2, btc_bet("player2", 0.001), Utc::now());
        assert_eq!(result.unwrap_err(), RoundError::AlreadyStarted);
        assert_eq!(engine.registry().unwrap().len(), 1);
        assert!(engine.registry().unwrap().is_closed());
    }

    #[test]
    fn test_bet_without_round_rejected() {
        let mut engine = fixed_engine("secret-seed");
        let result = engine.place_bet(1, btc_bet("player1", 0.001), Utc::now());
        assert_eq!(result.unwrap_err(), RoundError::NoActiveRound);
    }

    #[test]
    fn test_invalid_bet_rejected() {
        let mut engine = fixed_engine("secret-seed");
        engine.open_round(Utc::now()).unwrap();
        let result = engine.place_bet(1, btc_bet("player1", -1.0), Utc::now());
        assert!(matches!(result, Err(RoundError::InvalidBet(_))));
    }

    #[test]
    fn test_ticks_strictly_increase_until_crash() {
        let mut engine = fixed_engine("secret-seed");
        engine.open_round(Utc::now()).unwrap();
        engine.begin_running(Utc::now()).unwrap();

        let mut last = Multiplier::ONE;
        let mut ticks = 0;
        loop {
            match engine.tick(Utc::now()).unwrap() {
                TickOutcome::Climbing(m) => {
                    assert!(m > last);
                    last = m;
                    ticks += 1;
                }
                TickOutcome::Crashed(round) => {
                    assert_eq!(round.crash_point, Multiplier::from_hundredths(335));
                    assert!(round.end_time.is_some());
                    break;
                }
            }
        }

        // 1.00 -> 3.35 in 0.05 steps: 46 climbing ticks, crash on the 47th
        assert_eq!(ticks, 46);
        assert_eq!(engine.multiplier(), Multiplier::from_hundredths(335));
        assert_eq!(engine.phase(), RoundPhase::Crashed);
        assert_eq!(engine.completed_rounds(), 1);
    }

    #[test]
    fn test_crash_clamps_to_crash_point() {
        // seed-1456 round 1 crashes at 2.00; use a step that overshoots
        let mut engine = RoundEngine::new(EngineConfig {
            multiplier_step: Multiplier::from_hundredths(30),
            seed_policy: SeedPolicy::Fixed("seed-1456".into()),
            ..Default::default()
        });
        engine.open_round(Utc::now()).unwrap();
        engine.begin_running(Utc::now()).unwrap();

        let round = crash(&mut engine);
        assert_eq!(engine.multiplier(), round.crash_point);
        assert_eq!(round.crash_point, Multiplier::from_hundredths(200));
    }

    #[test]
    fn test_cashout_at_one_fifty() {
        // Crash point 2.00, exit at 1.50
        let mut engine = fixed_engine("seed-1456");
        engine.open_round(Utc::now()).unwrap();
        engine.place_bet(1, btc_bet("player1", 0.0002), Utc::now()).unwrap();
        engine.begin_running(Utc::now()).unwrap();
        tick_until(&mut engine, Multiplier::from_hundredths(150));

        let pending = engine.check_cashout(1).unwrap();
        assert_eq!(pending.multiplier, Multiplier::from_hundredths(150));
        assert!((pending.payout - 0.0003).abs() < 1e-12);

        let record = engine.commit_cashout(&pending, uuid::Uuid::new_v4(), Utc::now()).unwrap();
        assert_eq!(record.multiplier_at_exit, Multiplier::from_hundredths(150));
        assert_eq!(record.currency, CryptoType::Btc);

        // Second attempt sees the flipped flag
        assert_eq!(engine.check_cashout(1).unwrap_err(), RoundError::AlreadyCashedOut);

        let round = crash(&mut engine);
        assert_eq!(round.cashouts.len(), 1);
        assert!(round.bets[0].has_cashed_out);
        assert!(round.cashouts[0].multiplier_at_exit < round.crash_point);
    }

    #[test]
    fn test_stale_pending_cannot_commit_twice() {
        let mut engine = fixed_engine("seed-1456");
        engine.open_round(Utc::now()).unwrap();
        engine.place_bet(1, btc_bet("player1", 0.0002), Utc::now()).unwrap();
        engine.begin_running(Utc::now()).unwrap();

        let first = engine.check_cashout(1).unwrap();
        let second = engine.check_cashout(1).unwrap();

        engine.commit_cashout(&first, uuid::Uuid::new_v4(), Utc::now()).unwrap();
        let result = engine.commit_cashout(&second, uuid::Uuid::new_v4(), Utc::now());
        assert_eq!(result.unwrap_err(), RoundError::AlreadyCashedOut);
    }

    #[test]
    fn test_cashout_after_crash_is_too_late() {
        // seed-626 round 1 crashes at 1.20
        let mut engine = fixed_engine("seed-626");
        engine.open_round(Utc::now()).unwrap();
        engine.place_bet(1, btc_bet("player1", 0.0002), Utc::now()).unwrap();
        engine.begin_running(Utc::now()).unwrap();

        let pending = engine.check_cashout(1).unwrap();
        let round = crash(&mut engine);
        assert_eq!(round.crash_point, Multiplier::from_hundredths(120));

        assert_eq!(engine.check_cashout(1).unwrap_err(), RoundError::TooLate);
        // A request validated before the crash cannot be recorded after it
        let result = engine.commit_cashout(&pending, uuid::Uuid::new_v4(), Utc::now());
        assert_eq!(result.unwrap_err(), RoundError::TooLate);
    }

    #[test]
    fn test_cashout_rejections() {
        let mut engine = fixed_engine("secret-seed");
        assert_eq!(engine.check_cashout(1).unwrap_err(), RoundError::NoActiveRound);

        engine.open_round(Utc::now()).unwrap();
        engine.place_bet(1, btc_bet("player1", 0.001), Utc::now()).unwrap();
        assert_eq!(engine.check_cashout(1).unwrap_err(), RoundError::NoActiveRound);

        engine.begin_running(Utc::now()).unwrap();
        assert_eq!(engine.check_cashout(2).unwrap_err(), RoundError::NoActiveBet);
    }

    #[test]
    fn test_next_round_after_crash() {
        let mut engine = fixed_engine("secret-seed");
        engine.open_round(Utc::now()).unwrap();
        engine.begin_running(Utc::now()).unwrap();
        crash(&mut engine);

        let opened = engine.open_round(Utc::now()).unwrap();
        assert_eq!(opened.round_number, 2);
        assert_eq!(engine.crash_point(), Some(Multiplier::from_hundredths(817)));
        assert_eq!(engine.multiplier(), Multiplier::ONE);
        assert!(engine.registry().unwrap().is_empty());
    }

    #[test]
    fn test_one_x_crash_point_crashes_on_start() {
        // seed-6022 round 1 crashes at 1.00
        let mut engine = fixed_engine("seed-6022");
        engine.open_round(Utc::now()).unwrap();
        engine.place_bet(1, btc_bet("player1", 0.001), Utc::now()).unwrap();

        let round = engine.begin_running(Utc::now()).unwrap().unwrap();
        assert_eq!(round.crash_point, Multiplier::ONE);
        assert!(round.end_time.is_some());
        assert_eq!(round.bets.len(), 1);

        assert_eq!(engine.phase(), RoundPhase::Crashed);
        assert_eq!(engine.completed_rounds(), 1);
        assert!(engine.tick(Utc::now()).is_none());
        assert_eq!(engine.check_cashout(1).unwrap_err(), RoundError::TooLate);
    }

    #[test]
    fn test_held_cashout_cannot_settle() {
        let mut engine = fixed_engine("seed-1456");
        engine.open_round(Utc::now()).unwrap();
        engine.place_bet(1, btc_bet("player1", 0.0002), Utc::now()).unwrap();
        engine.begin_running(Utc::now()).unwrap();

        let pending = engine.check_cashout(1).unwrap();
        engine.hold_cashout(&pending).unwrap();

        assert_eq!(engine.check_cashout(1).unwrap_err(), RoundError::SettlementPending);
        let result = engine.commit_cashout(&pending, uuid::Uuid::new_v4(), Utc::now());
        assert_eq!(result.unwrap_err(), RoundError::SettlementPending);

        let round = crash(&mut engine);
        assert!(round.cashouts.is_empty());
        assert!(round.bets[0].settlement_unknown);
        assert_eq!(engine.check_cashout(1).unwrap_err(), RoundError::SettlementPending);
    }

    #[test]
    fn test_history_reset_between_rounds() {
        let mut engine = RoundEngine::new(EngineConfig {
            rounds_before_reset: 2,
            seed_policy: SeedPolicy::Fixed("secret-seed".into()),
            ..Default::default()
        });

        for expected in [1, 2] {
            let opened = engine.open_round(Utc::now()).unwrap();
            assert_eq!(opened.round_number, expected);
            assert!(!opened.history_reset);
            engine.begin_running(Utc::now()).unwrap();
            crash(&mut engine);
        }

        let opened = engine.open_round(Utc::now()).unwrap();
        assert_eq!(opened.round_number, 1);
        assert!(opened.history_reset);
        assert_eq!(engine.completed_rounds(), 0);
    }

    #[test]
    fn test_halt_discards_round() {
        let mut engine = fixed_engine("secret-seed");
        engine.open_round(Utc::now()).unwrap();
        engine.place_bet(1, btc_bet("player1", 0.001), Utc::now()).unwrap();
        engine.begin_running(Utc::now()).unwrap();
        engine.tick(Utc::now());

        let discarded = engine.halt().unwrap();
        assert_eq!(discarded.number, 1);
        assert_eq!(discarded.bets.len(), 1);
        assert!(discarded.end_time.is_none());

        assert_eq!(engine.phase(), RoundPhase::Idle);
        assert_eq!(engine.multiplier(), Multiplier::ONE);
        assert!(engine.tick(Utc::now()).is_none());
        assert_eq!(engine.completed_rounds(), 0);

        // Numbering continues after a halt
        assert_eq!(engine.open_round(Utc::now()).unwrap().round_number, 2);
    }

    #[test]
    fn test_halt_after_crash_discards_nothing() {
        let mut engine = fixed_engine("seed-626");
        engine.open_round(Utc::now()).unwrap();
        engine.place_bet(1, btc_bet("player1", 0.001), Utc::now()).unwrap();
        engine.begin_running(Utc::now()).unwrap();
        crash(&mut engine);

        assert!(engine.halt().is_none());
        assert_eq!(engine.phase(), RoundPhase::Idle);
        assert_eq!(engine.completed_rounds(), 1);
    }

    #[test]
    fn test_random_seeds_differ() {
        let mut engine = RoundEngine::new(EngineConfig::default());
        engine.open_round(Utc::now()).unwrap();
        let first = engine.halt().unwrap();
        engine.open_round(Utc::now()).unwrap();
        let second = engine.halt().unwrap();

        assert_eq!(first.seed.len(), 64);
        assert_ne!(first.seed, second.seed);
        assert_eq!(first.crash_point, generate(&first.seed, first.number));
    }

    #[test]
    fn test_zero_step_sanitized() {
        let engine = RoundEngine::new(EngineConfig {
            multiplier_step: Multiplier::from_basis_points(0),
            ..Default::default()
        });
        assert_eq!(engine.config().multiplier_step, DEFAULT_STEP);
    }
}

//! Round scheduling for one table.
//!
//! [`PhaseClock`] is the pure phase machine. [`TableRunner`] is the actor
//! that drives it: a single task per table owns every phase transition, and
//! all phase-advancing triggers (timers, crash detection, operator voids)
//! are consumed from one `select!` loop so no two transitions for a table
//! can interleave. Bets and cash-outs never pass through the runner; they
//! go straight to the ledger, which is gated by the phase.

use crate::auto_action::AutoActionEngine;
use crate::config::{PhaseDurations, SettlementConfig, TableConfig};
use crate::errors::RoundError;
use crate::games::outcome::OutcomeGenerator;
use crate::games::types::{Bet, GameType, Multiplier, Outcome, Phase, Round, RoundId, Slot, TableId, UserId, VRFBundle};
use crate::games::vrf_engine::VRFGameEngine;
use crate::ledger::BetLedger;
use crate::metrics::EngineMetrics;
use crate::settlement::{BetSettlement, RoundSeal, SettlementEngine, SettlementReport};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{interval_at, sleep, sleep_until, timeout_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Capacity of the per-table event broadcast
pub const EVENT_CAPACITY: usize = 1_024;

/// Pure phase transition rules
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PhaseClock {
    durations: PhaseDurations,
    continuous: bool,
}

impl PhaseClock {
    pub fn new(durations: PhaseDurations, game_type: GameType) -> Self {
        Self {
            durations,
            continuous: game_type.is_continuous(),
        }
    }

    /// Phase that follows `phase` in a normal cycle
    pub fn next_phase(phase: Phase) -> Phase {
        match phase {
            Phase::Betting => Phase::Locked,
            Phase::Locked => Phase::Resolving,
            Phase::Resolving => Phase::Settled,
            Phase::Settled | Phase::Voided => Phase::Cooldown,
            Phase::Cooldown => Phase::Betting,
        }
    }

    /// Whether `from -> to` is a legal transition. Voiding is legal from
    /// every phase that has not already finished the round.
    pub fn can_transition(from: Phase, to: Phase) -> bool {
        if to == Phase::Voided {
            return matches!(from, Phase::Betting | Phase::Locked | Phase::Resolving);
        }
        Self::next_phase(from) == to
    }

    /// Fixed length of a phase. `None` when the phase ends on an event:
    /// a crash flight ends at the crash point, settlement ends when it
    /// reports completion.
    pub fn duration(&self, phase: Phase) -> Option<Duration> {
        match phase {
            Phase::Betting => Some(self.durations.betting()),
            Phase::Locked if self.continuous => None,
            Phase::Locked => Some(self.durations.locked()),
            Phase::Resolving => Some(self.durations.resolving()),
            Phase::Settled | Phase::Voided => None,
            Phase::Cooldown => Some(self.durations.cooldown()),
        }
    }

    pub fn accepts_bets(phase: Phase) -> bool {
        phase == Phase::Betting
    }
}

/// Events streamed to UI layers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TableEvent {
    RoundPhaseChanged {
        round_id: RoundId,
        phase: Phase,
        at: DateTime<Utc>,
        #[serde(skip_serializing_if = "Option::is_none")]
        seed_commitment: Option<String>,
    },
    MultiplierTick {
        round_id: RoundId,
        multiplier: Multiplier,
    },
    OutcomeRevealed {
        round_id: RoundId,
        outcome: Outcome,
        fairness: VRFBundle,
    },
    BetSettled(BetSettlement),
    CashedOut {
        round_id: RoundId,
        user_id: UserId,
        slot: Slot,
        multiplier: Multiplier,
        automatic: bool,
    },
    RoundVoided {
        round_id: RoundId,
        reason: String,
        refunded: u64,
    },
}

/// Latest state of a table, held in a `watch` channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundSnapshot {
    pub table_id: TableId,
    pub round: Round,
    /// Live multiplier while a crash flight is in progress
    #[serde(skip_serializing_if = "Option::is_none")]
    pub live_multiplier: Option<Multiplier>,
    pub bet_count: usize,
}

/// Operator commands consumed by the runner
#[derive(Debug)]
pub enum TableCommand {
    /// Force the current round to `Voided`. Replies `true` if a round was voided.
    Void { reason: String, reply: oneshot::Sender<bool> },
    Shutdown,
}

/// Components of one table shared by the runner and client handles
pub struct TableContext {
    pub config: TableConfig,
    pub ledger: BetLedger,
    pub auto: AutoActionEngine,
    pub settlement: Arc<SettlementEngine>,
    pub events: broadcast::Sender<TableEvent>,
    pub metrics: EngineMetrics,
}

impl TableContext {
    pub fn emit(&self, event: TableEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

enum Interrupt {
    Void(String, Option<oneshot::Sender<bool>>),
    Shutdown,
}

enum RoundExit {
    Continue,
    Shutdown,
}

/// Per-table round actor
pub struct TableRunner {
    ctx: Arc<TableContext>,
    clock: PhaseClock,
    generator: Arc<dyn OutcomeGenerator>,
    vrf: Arc<VRFGameEngine>,
    settlement_config: SettlementConfig,
    commands: mpsc::Receiver<TableCommand>,
    snapshot: watch::Sender<RoundSnapshot>,
    current: Round,
    /// Outcome is withheld from snapshots until the reveal
    revealed: bool,
}

impl TableRunner {
    /// Open round 1 and return the runner with the client-side channel ends
    pub fn new(
        ctx: Arc<TableContext>,
        generator: Arc<dyn OutcomeGenerator>,
        vrf: Arc<VRFGameEngine>,
        settlement_config: SettlementConfig,
    ) -> (Self, mpsc::Sender<TableCommand>, watch::Receiver<RoundSnapshot>) {
        let clock = PhaseClock::new(ctx.config.phases, ctx.config.game_type);
        let current = open_round(&ctx, &clock, 1);
        let (command_tx, commands) = mpsc::channel(32);
        let (snapshot, snapshot_rx) = watch::channel(RoundSnapshot {
            table_id: ctx.config.id.clone(),
            round: current.clone(),
            live_multiplier: None,
            bet_count: 0,
        });

        let runner = Self {
            ctx,
            clock,
            generator,
            vrf,
            settlement_config,
            commands,
            snapshot,
            current,
            revealed: false,
        };
        (runner, command_tx, snapshot_rx)
    }

    /// Spawn the runner onto the tokio runtime
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        let span = info_span!("table", table = %self.ctx.config.id, game = %self.ctx.config.game_type);
        tokio::spawn(self.run().instrument(span))
    }

    pub async fn run(mut self) {
        info!("Table runner started");
        loop {
            match self.run_round().await {
                RoundExit::Continue => {
                    let number = self.current.id.number + 1;
                    self.current = open_round(&self.ctx, &self.clock, number);
                    self.revealed = false;
                }
                RoundExit::Shutdown => break,
            }
        }
        info!("Table runner stopped");
    }

    async fn run_round(&mut self) -> RoundExit {
        let round_id = self.current.id.clone();
        self.transition(Phase::Betting, None);

        if self.ctx.config.game_type.is_continuous() {
            let rebets = self.ctx.auto.place_rebets(&self.ctx.ledger, &round_id).await;
            if !rebets.is_empty() {
                debug!(round = %round_id, count = rebets.len(), "Auto re-bets placed");
            }
        }

        // Betting
        if let Some(interrupt) = self.wait_for(self.phase_length(Phase::Betting)).await {
            return self.interrupted(interrupt).await;
        }

        // Locked: freeze bets, then draw the seed and the outcome
        let frozen = self.ctx.ledger.close_round(&round_id).await;
        let opened_at = self.current.opened_at;
        let (seed, fairness) = match self.vrf.round_seed(&round_id, self.ctx.config.game_type, opened_at) {
            Ok(pair) => pair,
            Err(reason) => {
                let err = RoundError::OutcomeGenerationFailure { round_id, reason };
                return self.void_and_cool_down(err.to_string(), None).await;
            }
        };
        self.transition(Phase::Locked, Some(VRFGameEngine::seed_commitment(&seed)));

        let outcome = match self.generate_outcome(&seed) {
            Ok(outcome) => outcome,
            Err(err) => return self.void_and_cool_down(err.to_string(), None).await,
        };

        let final_bets = if let Outcome::Crash { crash_point } = outcome {
            match self.fly(&frozen, crash_point).await {
                Ok(bets) => bets,
                Err(interrupt) => return self.interrupted(interrupt).await,
            }
        } else {
            if let Some(interrupt) = self.wait_for(self.phase_length(Phase::Locked)).await {
                return self.interrupted(interrupt).await;
            }
            frozen
        };

        // Resolving: reveal, settle, hold the reveal for its full length
        self.current.reveal_ends_at = Some(Utc::now() + chrono_duration(self.phase_length(Phase::Resolving)));
        self.revealed = true;
        self.transition(Phase::Resolving, None);
        self.ctx.emit(TableEvent::OutcomeRevealed {
            round_id: round_id.clone(),
            outcome: outcome.clone(),
            fairness: fairness.clone(),
        });

        let seal = RoundSeal {
            round_id: round_id.clone(),
            game_type: self.ctx.config.game_type,
            fairness,
        };
        let report = match self.settle(seal, outcome, final_bets).await {
            Ok(report) => report,
            Err(interrupt) => return self.interrupted(interrupt).await,
        };

        self.transition(Phase::Settled, None);
        for bet in &report.bets {
            self.ctx.emit(TableEvent::BetSettled(bet.clone()));
        }

        self.cool_down().await
    }

    fn phase_length(&self, phase: Phase) -> Duration {
        self.clock.duration(phase).unwrap_or_default()
    }

    fn generate_outcome(&mut self, seed: &[u8; 32]) -> Result<Outcome, RoundError> {
        let round_id = self.current.id.clone();
        let started = Instant::now();
        let result = self
            .generator
            .generate(self.ctx.config.game_type, &self.ctx.config.game_params(), seed);

        let outcome = result.map_err(|reason| RoundError::OutcomeGenerationFailure {
            round_id: round_id.clone(),
            reason,
        })?;
        if started.elapsed() > self.settlement_config.outcome_timeout() {
            return Err(RoundError::OutcomeGenerationFailure {
                round_id,
                reason: format!(
                    "generation exceeded {}ms deadline",
                    self.settlement_config.outcome_timeout_ms
                ),
            });
        }

        self.current.set_outcome(outcome.clone())?;
        Ok(outcome)
    }

    /// Crash flight: tick the live multiplier until the crash point
    async fn fly(&mut self, frozen: &[Bet], crash_point: Multiplier) -> Result<Vec<Bet>, Interrupt> {
        let ctx = self.ctx.clone();
        let round_id = self.current.id.clone();
        let curve = ctx.config.crash_curve;
        let armed = ctx.auto.arm(frozen);
        debug!(round = %round_id, armed, "Flight started");

        let take_off = Instant::now();
        let crash_at = take_off + curve.time_to_reach(crash_point);
        // Highest multiplier a player can still hold before the crash
        let ceiling = Multiplier(crash_point.0.saturating_sub(Multiplier::SCALE / 100)).max(Multiplier::ONE);

        let mut ticker = interval_at(take_off + ctx.config.tick_interval(), ctx.config.tick_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = sleep_until(crash_at) => break,
                cmd = self.commands.recv() => {
                    ctx.auto.disarm();
                    return Err(command_interrupt(cmd));
                }
                _ = ticker.tick() => {
                    let multiplier = curve.multiplier_at(take_off.elapsed()).min(ceiling);
                    self.publish_live(Some(multiplier));
                    ctx.emit(TableEvent::MultiplierTick { round_id: round_id.clone(), multiplier });
                    let fired = ctx.auto.on_tick(&ctx.ledger, &round_id, multiplier).await;
                    emit_cash_outs(&ctx, &fired, true);
                }
            }
        }

        // Final sweep so every target strictly below the crash point is honoured
        let last_held = Multiplier(crash_point.0.saturating_sub(1)).max(Multiplier::ONE);
        let fired = ctx.auto.on_tick(&ctx.ledger, &round_id, last_held).await;
        emit_cash_outs(&ctx, &fired, true);
        ctx.auto.disarm();

        let bets = ctx.ledger.end_flight(&round_id).await;
        self.publish_live(None);
        info!(round = %round_id, %crash_point, "Crashed");
        Ok(bets)
    }

    /// Settle with retries until the settlement deadline. The reveal phase
    /// runs concurrently; the round ends only when both are done.
    async fn settle(&mut self, seal: RoundSeal, outcome: Outcome, bets: Vec<Bet>) -> Result<SettlementReport, Interrupt> {
        let started = Instant::now();
        let deadline = started + self.settlement_config.timeout();
        let reveal_end = started + self.phase_length(Phase::Resolving);
        let round_id = seal.round_id.clone();

        let engine = self.ctx.settlement.clone();
        let settling = async move {
            let mut attempt = 0u32;
            loop {
                match engine.settle(&seal, &outcome, &bets).await {
                    Ok(report) => return report,
                    Err(e) => {
                        attempt += 1;
                        warn!(round = %seal.round_id, attempt, error = %e, "Settlement failed, retrying");
                        sleep(Duration::from_millis(50)).await;
                    }
                }
            }
        };
        tokio::pin!(settling);

        let mut report = None;
        let mut reveal_done = false;
        while report.is_none() || !reveal_done {
            tokio::select! {
                biased;
                cmd = self.commands.recv() => return Err(command_interrupt(cmd)),
                result = timeout_at(deadline, &mut settling), if report.is_none() => match result {
                    Ok(done) => report = Some(done),
                    Err(_) => {
                        let err = RoundError::SettlementTimeout {
                            round_id: round_id.clone(),
                            timeout_ms: self.settlement_config.timeout_ms,
                        };
                        error!(round = %round_id, "Settlement timed out");
                        return Err(Interrupt::Void(err.to_string(), None));
                    }
                },
                _ = sleep_until(reveal_end), if !reveal_done => reveal_done = true,
            }
        }

        let report = report.ok_or_else(|| Interrupt::Void("settlement produced no report".to_string(), None))?;
        self.ctx.metrics.record_settlement(report.total_paid, started.elapsed());
        Ok(report)
    }

    async fn cool_down(&mut self) -> RoundExit {
        self.transition(Phase::Cooldown, None);
        let round_id = self.current.id.clone();
        let deadline = Instant::now() + self.phase_length(Phase::Cooldown);

        let exit = loop {
            match self.wait_until(deadline).await {
                None => break RoundExit::Continue,
                Some(Interrupt::Shutdown) => break RoundExit::Shutdown,
                Some(Interrupt::Void(reason, reply)) => {
                    // Nothing left to void once the round has finished
                    debug!(round = %round_id, %reason, "Void ignored during cooldown");
                    if let Some(reply) = reply {
                        let _ = reply.send(false);
                    }
                }
            }
        };

        self.ctx.ledger.finish_round(&round_id);
        self.ctx.settlement.forget_round(&round_id);
        exit
    }

    async fn interrupted(&mut self, interrupt: Interrupt) -> RoundExit {
        match interrupt {
            Interrupt::Void(reason, reply) => self.void_and_cool_down(reason, reply).await,
            Interrupt::Shutdown => {
                self.void("table shutting down").await;
                self.ctx.ledger.finish_round(&self.current.id);
                RoundExit::Shutdown
            }
        }
    }

    async fn void_and_cool_down(&mut self, reason: String, reply: Option<oneshot::Sender<bool>>) -> RoundExit {
        self.void(&reason).await;
        if let Some(reply) = reply {
            let _ = reply.send(true);
        }
        self.cool_down().await
    }

    /// Freeze the round and release every reservation not yet finalised
    async fn void(&mut self, reason: &str) {
        let round_id = self.current.id.clone();
        self.ctx.auto.disarm();
        let bets = self.ctx.ledger.end_flight(&round_id).await;
        let report = self.ctx.settlement.void_round(&round_id, &bets).await;

        self.current.phase = Phase::Voided;
        self.publish_live(None);
        self.ctx.emit(TableEvent::RoundPhaseChanged {
            round_id: round_id.clone(),
            phase: Phase::Voided,
            at: Utc::now(),
            seed_commitment: None,
        });
        self.ctx.emit(TableEvent::RoundVoided {
            round_id: round_id.clone(),
            reason: reason.to_string(),
            refunded: report.refunded,
        });
        for bet in report.bets {
            self.ctx.emit(TableEvent::BetSettled(bet));
        }
        self.ctx.metrics.record_void(report.refunded);
        warn!(round = %round_id, %reason, refunded = report.refunded, "Round voided, stakes refunded");
    }

    fn transition(&mut self, phase: Phase, seed_commitment: Option<String>) {
        let from = self.current.phase;
        if from != phase && !PhaseClock::can_transition(from, phase) {
            warn!(round = %self.current.id, %from, to = %phase, "Unexpected phase transition");
        }
        self.current.phase = phase;
        if seed_commitment.is_some() {
            self.current.seed_commitment = seed_commitment.clone();
        }
        self.publish_live(None);
        self.ctx.emit(TableEvent::RoundPhaseChanged {
            round_id: self.current.id.clone(),
            phase,
            at: Utc::now(),
            seed_commitment,
        });
        info!(round = %self.current.id, %phase, "Phase changed");
    }

    fn publish_live(&self, live_multiplier: Option<Multiplier>) {
        let bet_count = self
            .ctx
            .ledger
            .book(&self.current.id)
            .map(|b| b.len())
            .unwrap_or(0);
        let mut round = self.current.clone();
        if !self.revealed {
            round.outcome = None;
        }
        self.snapshot.send_replace(RoundSnapshot {
            table_id: self.ctx.config.id.clone(),
            round,
            live_multiplier,
            bet_count,
        });
    }

    async fn wait_for(&mut self, duration: Duration) -> Option<Interrupt> {
        self.wait_until(Instant::now() + duration).await
    }

    async fn wait_until(&mut self, deadline: Instant) -> Option<Interrupt> {
        tokio::select! {
            biased;
            cmd = self.commands.recv() => Some(command_interrupt(cmd)),
            _ = sleep_until(deadline) => None,
        }
    }
}

/// A closed command channel means every handle is gone
fn command_interrupt(command: Option<TableCommand>) -> Interrupt {
    match command {
        Some(TableCommand::Void { reason, reply }) => Interrupt::Void(reason, Some(reply)),
        Some(TableCommand::Shutdown) | None => Interrupt::Shutdown,
    }
}

fn open_round(ctx: &TableContext, clock: &PhaseClock, number: u64) -> Round {
    let round_id = RoundId::new(ctx.config.id.clone(), number);
    let opened_at = Utc::now();
    let betting = clock.duration(Phase::Betting).unwrap_or_default();
    ctx.ledger.open_round(round_id.clone());
    Round::new(round_id, ctx.config.game_type, opened_at, opened_at + chrono_duration(betting))
}

fn chrono_duration(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::zero())
}

fn emit_cash_outs(ctx: &TableContext, bets: &[Bet], automatic: bool) {
    for bet in bets {
        if let Some(multiplier) = bet.cashed_out_at {
            ctx.emit(TableEvent::CashedOut {
                round_id: bet.round_id.clone(),
                user_id: bet.user_id.clone(),
                slot: bet.slot,
                multiplier,
                automatic,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_phase_cycle() {
        let mut phase = Phase::Betting;
        let mut seen = vec![phase];
        for _ in 0..4 {
            phase = PhaseClock::next_phase(phase);
            seen.push(phase);
        }
        assert_eq!(
            seen,
            vec![Phase::Betting, Phase::Locked, Phase::Resolving, Phase::Settled, Phase::Cooldown]
        );
        assert_eq!(PhaseClock::next_phase(Phase::Cooldown), Phase::Betting);
        assert_eq!(PhaseClock::next_phase(Phase::Voided), Phase::Cooldown);
    }

    #[test]
    fn test_void_only_before_round_finishes() {
        assert!(PhaseClock::can_transition(Phase::Betting, Phase::Voided));
        assert!(PhaseClock::can_transition(Phase::Resolving, Phase::Voided));
        assert!(!PhaseClock::can_transition(Phase::Settled, Phase::Voided));
        assert!(!PhaseClock::can_transition(Phase::Cooldown, Phase::Voided));
        assert!(!PhaseClock::can_transition(Phase::Betting, Phase::Resolving));
    }

    #[test]
    fn test_durations_per_game() {
        let wingo = PhaseClock::new(PhaseDurations::for_game(GameType::WinGo), GameType::WinGo);
        assert_eq!(wingo.duration(Phase::Betting), Some(Duration::from_secs(27)));
        assert_eq!(wingo.duration(Phase::Locked), Some(Duration::from_secs(3)));

        let aviator = PhaseClock::new(PhaseDurations::for_game(GameType::Aviator), GameType::Aviator);
        assert_eq!(aviator.duration(Phase::Locked), None);
        assert_eq!(aviator.duration(Phase::Settled), None);
        assert!(PhaseClock::accepts_bets(Phase::Betting));
        assert!(!PhaseClock::accepts_bets(Phase::Locked));
    }

    #[test]
    fn test_event_serialises_with_tag() {
        let event = TableEvent::MultiplierTick {
            round_id: RoundId::new(TableId::from("aviator-1"), 3),
            multiplier: Multiplier::from_hundredths(150),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "multiplier_tick");
        assert_eq!(json["multiplier"], 15_000);
    }
}

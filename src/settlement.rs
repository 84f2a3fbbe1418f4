//! Settlement: resolve every frozen bet against the outcome and finalise
//! its reservation.
//!
//! Each `(round, bet)` pair is settled at most once. Bets run in parallel
//! because they touch independent reservations; a replayed call returns
//! the recorded result instead of moving money again.

use crate::errors::{EngineResult, WalletError};
use crate::games::payout::PayoutTable;
use crate::games::types::{
    Bet, BetId, BetStatus, GameType, HistoryEntry, Multiplier, Outcome, RoundId, Slot, UserId, VRFBundle,
};
use crate::history::HistoryStore;
use crate::wallet::{CommitOutcome, Wallet};
use chrono::Utc;
use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Final result of one bet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BetSettlement {
    pub bet_id: BetId,
    pub round_id: RoundId,
    pub user_id: UserId,
    pub slot: Slot,
    pub stake: u64,
    pub multiplier: Multiplier,
    /// Amount credited back to the user (stake included); refund for voids
    pub payout: u64,
    pub status: BetStatus,
}

/// Round-level facts settlement needs besides the bets
#[derive(Debug, Clone)]
pub struct RoundSeal {
    pub round_id: RoundId,
    pub game_type: GameType,
    pub fairness: VRFBundle,
}

#[derive(Debug, Clone)]
pub struct SettlementReport {
    pub round_id: RoundId,
    pub bets: Vec<BetSettlement>,
    pub total_staked: u64,
    pub total_paid: u64,
    /// Bets whose result was already recorded by an earlier call
    pub replayed: usize,
    pub history_appended: bool,
}

impl SettlementReport {
    /// Wallet delta for the round across all users: payouts minus stakes
    pub fn net_wallet_delta(&self) -> i128 {
        self.total_paid as i128 - self.total_staked as i128
    }
}

#[derive(Debug, Clone, Default)]
pub struct VoidReport {
    pub released: usize,
    pub refunded: u64,
    /// Bets already finalised by settlement before the void
    pub already_final: usize,
    pub failed: usize,
    pub bets: Vec<BetSettlement>,
}

pub struct SettlementEngine {
    wallet: Arc<dyn Wallet>,
    history: Arc<dyn HistoryStore>,
    payouts: PayoutTable,
    concurrency: usize,
    settled: DashMap<(RoundId, BetId), BetSettlement>,
    /// Entries of settled rounds the history store rejected, retried on
    /// every later settlement
    parked_history: DashMap<RoundId, HistoryEntry>,
}

impl SettlementEngine {
    pub fn new(wallet: Arc<dyn Wallet>, history: Arc<dyn HistoryStore>, concurrency: usize) -> Self {
        Self {
            wallet,
            history,
            payouts: PayoutTable::new(),
            concurrency: concurrency.max(1),
            settled: DashMap::new(),
            parked_history: DashMap::new(),
        }
    }

    /// Settle a round. Safe to call again with the same inputs after a
    /// failure; already-settled bets are skipped.
    ///
    /// Only wallet failures are returned. Once every bet is committed the
    /// round counts as settled even if the history store is down; its
    /// entry is parked and appended by a later call.
    pub async fn settle(&self, seal: &RoundSeal, outcome: &Outcome, bets: &[Bet]) -> EngineResult<SettlementReport> {
        self.retry_parked_history().await;

        let pending: Vec<_> = bets.iter().map(|bet| self.settle_bet(bet, outcome)).collect();
        let results: Vec<EngineResult<(BetSettlement, bool)>> = stream::iter(pending)
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut settled = Vec::with_capacity(results.len());
        let mut replayed = 0;
        let mut first_error = None;
        for result in results {
            match result {
                Ok((settlement, was_replayed)) => {
                    if was_replayed {
                        replayed += 1;
                    }
                    settled.push(settlement);
                }
                Err(e) => {
                    warn!(round = %seal.round_id, error = %e, "Bet settlement failed");
                    first_error.get_or_insert(e);
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        settled.sort_by_key(|s| (s.user_id.clone(), s.slot));
        let total_staked: u64 = settled.iter().map(|s| s.stake).sum();
        let total_paid: u64 = settled.iter().map(|s| s.payout).sum();

        let entry = HistoryEntry {
            round_id: seal.round_id.clone(),
            game_type: seal.game_type,
            outcome: outcome.clone(),
            fairness: seal.fairness.clone(),
            settled_at: Utc::now(),
            bet_count: settled.len(),
            total_staked,
            total_paid,
        };
        let history_appended = match self.history.append(entry.clone()).await {
            Ok(appended) => appended,
            Err(e) => {
                warn!(round = %seal.round_id, error = %e, "History append failed, entry parked");
                self.parked_history.insert(seal.round_id.clone(), entry);
                false
            }
        };

        info!(
            round = %seal.round_id,
            bets = settled.len(),
            staked = total_staked,
            paid = total_paid,
            replayed,
            "Round settled"
        );

        Ok(SettlementReport {
            round_id: seal.round_id.clone(),
            bets: settled,
            total_staked,
            total_paid,
            replayed,
            history_appended,
        })
    }

    async fn retry_parked_history(&self) {
        let parked: Vec<HistoryEntry> = self.parked_history.iter().map(|e| e.value().clone()).collect();
        for entry in parked {
            let round_id = entry.round_id.clone();
            match self.history.append(entry).await {
                Ok(_) => {
                    self.parked_history.remove(&round_id);
                    debug!(round = %round_id, "Parked history entry appended");
                }
                Err(e) => debug!(round = %round_id, error = %e, "Parked history entry still rejected"),
            }
        }
    }

    async fn settle_bet(&self, bet: &Bet, outcome: &Outcome) -> EngineResult<(BetSettlement, bool)> {
        let key = (bet.round_id.clone(), bet.id);
        if let Some(existing) = self.settled.get(&key) {
            return Ok((existing.clone(), true));
        }

        let multiplier = self.payouts.evaluate(bet, outcome);
        let payout = multiplier.apply(bet.stake);
        let (commit, status) = if payout > 0 {
            (self.wallet.commit_win(bet.reservation_id, payout).await?, BetStatus::Won)
        } else {
            (self.wallet.commit_loss(bet.reservation_id).await?, BetStatus::Lost)
        };

        let settlement = BetSettlement {
            bet_id: bet.id,
            round_id: bet.round_id.clone(),
            user_id: bet.user_id.clone(),
            slot: bet.slot,
            stake: bet.stake,
            multiplier,
            payout,
            status,
        };
        debug!(bet = %bet.id, %multiplier, payout, ?status, "Bet settled");

        let replayed = commit == CommitOutcome::Replayed;
        let recorded = self.settled.entry(key).or_insert(settlement).clone();
        Ok((recorded, replayed))
    }

    /// Release every reservation of a round that settlement has not
    /// finalised. Never releases a reservation twice. Bets settled before
    /// the void keep their recorded result, which is returned alongside
    /// the refunds.
    pub async fn void_round(&self, round_id: &RoundId, bets: &[Bet]) -> VoidReport {
        let mut report = VoidReport::default();
        let mut releases = Vec::new();
        for bet in bets {
            match self.result(round_id, bet.id) {
                Some(recorded) => {
                    report.already_final += 1;
                    report.bets.push(recorded);
                }
                None => releases.push(self.release_bet(bet)),
            }
        }

        let results: Vec<(BetSettlement, Result<CommitOutcome, WalletError>)> = stream::iter(releases)
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        for (refund, result) in results {
            match result {
                Ok(commit) => {
                    if commit == CommitOutcome::Applied {
                        report.refunded += refund.stake;
                    }
                    report.released += 1;
                    self.settled
                        .entry((round_id.clone(), refund.bet_id))
                        .or_insert_with(|| refund.clone());
                    report.bets.push(refund);
                }
                Err(WalletError::AlreadyFinalized(_)) => report.already_final += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(round = %round_id, bet = %refund.bet_id, error = %e, "Refund failed");
                }
            }
        }

        info!(
            round = %round_id,
            released = report.released,
            refunded = report.refunded,
            already_final = report.already_final,
            "Round voided"
        );
        report
    }

    async fn release_bet(&self, bet: &Bet) -> (BetSettlement, Result<CommitOutcome, WalletError>) {
        let refund = BetSettlement {
            bet_id: bet.id,
            round_id: bet.round_id.clone(),
            user_id: bet.user_id.clone(),
            slot: bet.slot,
            stake: bet.stake,
            multiplier: Multiplier::ONE,
            payout: bet.stake,
            status: BetStatus::Voided,
        };
        (refund, self.wallet.release(bet.reservation_id).await)
    }

    /// Recorded result of a bet, if settled or voided
    pub fn result(&self, round_id: &RoundId, bet_id: BetId) -> Option<BetSettlement> {
        self.settled.get(&(round_id.clone(), bet_id)).map(|s| s.clone())
    }

    /// Drop idempotency records for a round that has fully cycled
    pub fn forget_round(&self, round_id: &RoundId) {
        self.settled.retain(|(r, _), _| r != round_id);
    }
}

impl std::fmt::Debug for SettlementEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettlementEngine")
            .field("concurrency", &self.concurrency)
            .field("settled", &self.settled.len())
            .field("parked_history", &self.parked_history.len())
            .finish()
    }
}

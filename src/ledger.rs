//! Bet ledger for one table.
//!
//! Each round gets a [`RoundBook`]. Submissions hold the book's gate for
//! reading while they reserve stake, and closing the round takes it for
//! writing, so a close waits for in-flight submissions and a bet is either
//! fully recorded with its reservation or not present at all.

use crate::config::{StakeLimits, TableConfig};
use crate::errors::{BetError, RoundError};
use crate::games::outcome::GameParams;
use crate::games::payout::PayoutTable;
use crate::games::types::{Bet, BetId, BetKind, BetStatus, GameType, Multiplier, RoundId, Slot, UserId};
use crate::metrics::EngineMetrics;
use crate::wallet::Wallet;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Client request to place one bet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BetRequest {
    pub user_id: UserId,
    pub slot: Slot,
    pub kind: BetKind,
    pub stake: u64,
}

#[derive(Debug, Default)]
struct Gate {
    betting_open: bool,
    cashout_open: bool,
}

/// Bets of one round
#[derive(Debug)]
pub struct RoundBook {
    round_id: RoundId,
    gate: RwLock<Gate>,
    claims: DashMap<(UserId, Slot), Option<BetId>>,
    bets: DashMap<BetId, Bet>,
}

impl RoundBook {
    fn new(round_id: RoundId) -> Self {
        Self {
            round_id,
            gate: RwLock::new(Gate {
                betting_open: true,
                cashout_open: false,
            }),
            claims: DashMap::new(),
            bets: DashMap::new(),
        }
    }

    pub fn round_id(&self) -> &RoundId {
        &self.round_id
    }

    pub fn len(&self) -> usize {
        self.bets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bets.is_empty()
    }

    /// Bets ordered by placement time
    pub fn snapshot(&self) -> Vec<Bet> {
        let mut bets: Vec<Bet> = self.bets.iter().map(|b| b.value().clone()).collect();
        bets.sort_by_key(|b| b.placed_at);
        bets
    }

    pub fn bet_for(&self, user_id: &UserId, slot: Slot) -> Option<Bet> {
        let bet_id = (*self.claims.get(&(user_id.clone(), slot))?)?;
        self.bets.get(&bet_id).map(|b| b.clone())
    }
}

pub struct BetLedger {
    game_type: GameType,
    limits: StakeLimits,
    params: GameParams,
    max_slots: u8,
    payouts: PayoutTable,
    wallet: Arc<dyn Wallet>,
    metrics: EngineMetrics,
    books: DashMap<RoundId, Arc<RoundBook>>,
}

impl BetLedger {
    pub fn new(table: &TableConfig, wallet: Arc<dyn Wallet>, metrics: EngineMetrics) -> Self {
        Self {
            game_type: table.game_type,
            limits: table.stakes,
            params: table.game_params(),
            max_slots: table.max_slots,
            payouts: PayoutTable::new(),
            wallet,
            metrics,
            books: DashMap::new(),
        }
    }

    /// Start accepting bets for `round_id`
    pub fn open_round(&self, round_id: RoundId) -> Arc<RoundBook> {
        let book = Arc::new(RoundBook::new(round_id.clone()));
        self.books.insert(round_id, book.clone());
        book
    }

    pub fn book(&self, round_id: &RoundId) -> Option<Arc<RoundBook>> {
        self.books.get(round_id).map(|b| b.clone())
    }

    /// Validate, reserve and record one bet
    pub async fn submit(&self, round_id: &RoundId, request: BetRequest) -> Result<Bet, BetError> {
        let result = self.try_submit(round_id, request).await;
        match &result {
            Ok(bet) => self.metrics.record_bet_placed(bet.stake),
            Err(e) => {
                self.metrics.record_bet_rejected();
                debug!(round = %round_id, reason = e.code(), "Bet rejected");
            }
        }
        result
    }

    async fn try_submit(&self, round_id: &RoundId, request: BetRequest) -> Result<Bet, BetError> {
        if !self.limits.contains(request.stake) {
            return Err(BetError::StakeOutOfRange {
                stake: request.stake,
                min: self.limits.min,
                max: self.limits.max,
            });
        }
        if request.slot >= self.max_slots {
            return Err(BetError::InvalidBet {
                game: self.game_type,
                reason: format!("slot {} exceeds table limit of {}", request.slot, self.max_slots),
            });
        }
        self.payouts
            .validate(self.game_type, &request.kind, &self.params)
            .map_err(|reason| BetError::InvalidBet {
                game: self.game_type,
                reason,
            })?;

        let book = self.book(round_id).ok_or_else(|| BetError::UnknownRound(round_id.clone()))?;
        let gate = book.gate.read().await;
        if !gate.betting_open {
            return Err(BetError::RoundClosed(round_id.clone()));
        }

        let claim = (request.user_id.clone(), request.slot);
        match book.claims.entry(claim.clone()) {
            Entry::Occupied(_) => {
                return Err(BetError::DuplicateSlotBet {
                    round_id: round_id.clone(),
                    slot: request.slot,
                })
            }
            Entry::Vacant(entry) => {
                entry.insert(None);
            }
        }

        let reservation_id = match self.wallet.reserve(&request.user_id, request.stake).await {
            Ok(id) => id,
            Err(e) => {
                book.claims.remove(&claim);
                return Err(e.into());
            }
        };

        let bet = Bet {
            id: BetId::new(),
            round_id: round_id.clone(),
            user_id: request.user_id,
            slot: request.slot,
            kind: request.kind,
            stake: request.stake,
            reservation_id,
            status: BetStatus::Reserved,
            cashed_out_at: None,
            placed_at: Utc::now(),
        };
        book.bets.insert(bet.id, bet.clone());
        book.claims.insert(claim, Some(bet.id));
        drop(gate);

        debug!(round = %round_id, bet = %bet.id, user = %bet.user_id, stake = bet.stake, "Bet reserved");
        Ok(bet)
    }

    /// Freeze submissions and return the eligible bet set. Crash rounds
    /// open the cash-out window at the same time.
    pub async fn close_round(&self, round_id: &RoundId) -> Vec<Bet> {
        let Some(book) = self.book(round_id) else {
            return Vec::new();
        };
        let mut gate = book.gate.write().await;
        gate.betting_open = false;
        gate.cashout_open = self.game_type.is_continuous();
        drop(gate);

        let bets = book.snapshot();
        info!(round = %round_id, bets = bets.len(), "Betting closed");
        bets
    }

    /// Freeze a crash bet's multiplier while the flight is live
    pub async fn cash_out(
        &self,
        round_id: &RoundId,
        user_id: &UserId,
        slot: Slot,
        multiplier: Multiplier,
    ) -> Result<Bet, RoundError> {
        let rejected = |reason: &str| RoundError::CashOutRejected {
            multiplier,
            reason: reason.to_string(),
        };

        let book = self.book(round_id).ok_or_else(|| rejected("round is not live"))?;
        let gate = book.gate.read().await;
        if !gate.cashout_open {
            return Err(rejected("flight is not in progress"));
        }

        let bet_id = book
            .claims
            .get(&(user_id.clone(), slot))
            .and_then(|c| *c)
            .ok_or_else(|| rejected("no bet in this slot"))?;
        let mut bet = book.bets.get_mut(&bet_id).ok_or_else(|| rejected("no bet in this slot"))?;
        if bet.cashed_out_at.is_some() {
            return Err(rejected("already cashed out"));
        }
        if multiplier < Multiplier::ONE {
            return Err(rejected("multiplier below 1.00x"));
        }

        bet.cashed_out_at = Some(multiplier);
        let cashed = bet.clone();
        drop(bet);
        drop(gate);

        self.metrics.record_cash_out();
        info!(round = %round_id, user = %user_id, slot, %multiplier, "Cashed out");
        Ok(cashed)
    }

    /// Close the cash-out window and return the final bet set
    pub async fn end_flight(&self, round_id: &RoundId) -> Vec<Bet> {
        let Some(book) = self.book(round_id) else {
            return Vec::new();
        };
        let mut gate = book.gate.write().await;
        gate.cashout_open = false;
        gate.betting_open = false;
        drop(gate);
        book.snapshot()
    }

    /// Drop a finished round's book
    pub fn finish_round(&self, round_id: &RoundId) -> Option<Arc<RoundBook>> {
        self.books.remove(round_id).map(|(_, book)| book)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::types::{DragonTigerSide, TableId};
    use crate::wallet::InMemoryWallet;

    fn setup(game: GameType) -> (BetLedger, Arc<InMemoryWallet>, RoundId) {
        let wallet = Arc::new(InMemoryWallet::new());
        let table = TableConfig::for_game(game);
        let ledger = BetLedger::new(&table, wallet.clone(), EngineMetrics::new());
        let round_id = RoundId::new(table.id.clone(), 1);
        ledger.open_round(round_id.clone());
        (ledger, wallet, round_id)
    }

    fn request(user: &str, slot: Slot, kind: BetKind, stake: u64) -> BetRequest {
        BetRequest {
            user_id: UserId::from(user),
            slot,
            kind,
            stake,
        }
    }

    #[tokio::test]
    async fn test_submit_reserves_stake() {
        let (ledger, wallet, round_id) = setup(GameType::DragonTiger);
        wallet.deposit(&UserId::from("alice"), 1_000);

        let bet = ledger
            .submit(&round_id, request("alice", 0, BetKind::DragonTiger(DragonTigerSide::Tie), 100))
            .await
            .unwrap();
        assert_eq!(bet.status, BetStatus::Reserved);
        assert_eq!(wallet.balance(&UserId::from("alice")).await.unwrap(), 900);
        assert_eq!(ledger.book(&round_id).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_insufficient_funds_leaves_no_record() {
        let (ledger, wallet, round_id) = setup(GameType::DragonTiger);
        wallet.deposit(&UserId::from("bob"), 50);

        let err = ledger
            .submit(&round_id, request("bob", 0, BetKind::DragonTiger(DragonTigerSide::Dragon), 100))
            .await
            .unwrap_err();
        assert_eq!(err, BetError::InsufficientFunds);
        assert!(ledger.book(&round_id).unwrap().is_empty());
        assert_eq!(wallet.balance(&UserId::from("bob")).await.unwrap(), 50);

        // The slot claim was rolled back, so a smaller stake succeeds
        ledger
            .submit(&round_id, request("bob", 0, BetKind::DragonTiger(DragonTigerSide::Dragon), 50))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_duplicate_slot_rejected() {
        let (ledger, wallet, round_id) = setup(GameType::Aviator);
        wallet.deposit(&UserId::from("carol"), 1_000);

        ledger.submit(&round_id, request("carol", 0, BetKind::Crash, 100)).await.unwrap();
        ledger.submit(&round_id, request("carol", 1, BetKind::Crash, 100)).await.unwrap();
        let err = ledger
            .submit(&round_id, request("carol", 0, BetKind::Crash, 100))
            .await
            .unwrap_err();
        assert!(matches!(err, BetError::DuplicateSlotBet { slot: 0, .. }));
        assert_eq!(wallet.balance(&UserId::from("carol")).await.unwrap(), 800);
    }

    #[tokio::test]
    async fn test_limits_and_selector_checked_before_reserve() {
        let (ledger, wallet, round_id) = setup(GameType::WinGo);
        wallet.deposit(&UserId::from("dave"), 1_000_000);

        let err = ledger
            .submit(&round_id, request("dave", 0, BetKind::WinGoNumber(3), 1))
            .await
            .unwrap_err();
        assert!(matches!(err, BetError::StakeOutOfRange { .. }));

        let err = ledger
            .submit(&round_id, request("dave", 0, BetKind::Crash, 100))
            .await
            .unwrap_err();
        assert!(matches!(err, BetError::InvalidBet { .. }));

        let err = ledger
            .submit(&round_id, request("dave", 5, BetKind::WinGoNumber(3), 100))
            .await
            .unwrap_err();
        assert!(matches!(err, BetError::InvalidBet { .. }));
        assert_eq!(wallet.balance(&UserId::from("dave")).await.unwrap(), 1_000_000);
    }

    #[tokio::test]
    async fn test_closed_round_rejects() {
        let (ledger, wallet, round_id) = setup(GameType::SicBo);
        wallet.deposit(&UserId::from("erin"), 1_000);

        let frozen = ledger.close_round(&round_id).await;
        assert!(frozen.is_empty());

        let err = ledger
            .submit(
                &round_id,
                request("erin", 0, BetKind::SicBo(crate::games::types::SicBoBet::Big), 100),
            )
            .await
            .unwrap_err();
        assert_eq!(err, BetError::RoundClosed(round_id.clone()));
        assert_eq!(wallet.balance(&UserId::from("erin")).await.unwrap(), 1_000);

        let unknown = RoundId::new(TableId::from("sic_bo-1"), 99);
        let err = ledger
            .submit(&unknown, request("erin", 0, BetKind::SicBo(crate::games::types::SicBoBet::Big), 100))
            .await
            .unwrap_err();
        assert_eq!(err, BetError::UnknownRound(unknown));
    }

    #[tokio::test]
    async fn test_cash_out_only_during_flight() {
        let (ledger, wallet, round_id) = setup(GameType::Aviator);
        let frank = UserId::from("frank");
        wallet.deposit(&frank, 1_000);
        ledger.submit(&round_id, request("frank", 0, BetKind::Crash, 100)).await.unwrap();

        let early = ledger.cash_out(&round_id, &frank, 0, Multiplier::from_whole(2)).await;
        assert!(early.is_err());

        ledger.close_round(&round_id).await;
        let bet = ledger
            .cash_out(&round_id, &frank, 0, Multiplier::from_hundredths(150))
            .await
            .unwrap();
        assert_eq!(bet.cashed_out_at, Some(Multiplier::from_hundredths(150)));

        let twice = ledger.cash_out(&round_id, &frank, 0, Multiplier::from_whole(3)).await;
        assert!(twice.is_err());

        let bets = ledger.end_flight(&round_id).await;
        assert_eq!(bets[0].cashed_out_at, Some(Multiplier::from_hundredths(150)));
        assert!(ledger.cash_out(&round_id, &frank, 1, Multiplier::from_whole(2)).await.is_err());
    }

    #[tokio::test]
    async fn test_concurrent_submissions_respect_balance() {
        let (ledger, wallet, round_id) = setup(GameType::Aviator);
        let ledger = Arc::new(ledger);
        for i in 0..20 {
            wallet.deposit(&UserId(format!("user-{i}")), 150);
        }

        let tasks: Vec<_> = (0..20)
            .flat_map(|i| (0..2).map(move |slot| (i, slot)))
            .map(|(i, slot)| {
                let ledger = ledger.clone();
                let round_id = round_id.clone();
                tokio::spawn(async move {
                    ledger
                        .submit(
                            &round_id,
                            BetRequest {
                                user_id: UserId(format!("user-{i}")),
                                slot,
                                kind: BetKind::Crash,
                                stake: 100,
                            },
                        )
                        .await
                })
            })
            .collect();

        let accepted = futures::future::join_all(tasks)
            .await
            .into_iter()
            .filter(|r| matches!(r, Ok(Ok(_))))
            .count();

        // Each user can only afford one of their two slots
        assert_eq!(accepted, 20);
        assert_eq!(ledger.close_round(&round_id).await.len(), 20);
        assert_eq!(wallet.open_reservations(), 20);
    }
}

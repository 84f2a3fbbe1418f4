//! Automation rules for crash tables: auto cash-out and auto re-bet.
//!
//! Rules are armed against the frozen bet set when a flight starts. Every
//! live multiplier tick fires the armed rules whose target has been reached,
//! and the bet is frozen at the target, not at the sampled tick value.

use crate::errors::BetError;
use crate::games::types::{Bet, GameType, Multiplier, RoundId, Slot, UserId};
use crate::ledger::{BetLedger, BetRequest};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Per-slot automation registered by a client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AutoRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cash_out_at: Option<Multiplier>,
    #[serde(default)]
    pub auto_rebet: bool,
}

#[derive(Debug, Default)]
pub struct AutoActionEngine {
    rules: DashMap<(UserId, Slot), AutoRule>,
    last_bets: DashMap<(UserId, Slot), BetRequest>,
    armed: DashMap<(UserId, Slot), Multiplier>,
}

impl AutoActionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace the rule for one slot
    pub fn register(&self, user_id: UserId, slot: Slot, rule: AutoRule) -> Result<(), BetError> {
        if let Some(target) = rule.cash_out_at {
            if target <= Multiplier::ONE {
                return Err(BetError::InvalidBet {
                    game: GameType::Aviator,
                    reason: format!("auto cash-out target {} must exceed 1.00x", target),
                });
            }
        }
        debug!(user = %user_id, slot, ?rule, "Auto rule registered");
        self.rules.insert((user_id, slot), rule);
        Ok(())
    }

    pub fn clear(&self, user_id: &UserId, slot: Slot) {
        let key = (user_id.clone(), slot);
        self.rules.remove(&key);
        self.armed.remove(&key);
    }

    pub fn rule(&self, user_id: &UserId, slot: Slot) -> Option<AutoRule> {
        self.rules.get(&(user_id.clone(), slot)).map(|r| *r)
    }

    /// Remember an accepted bet so it can be repeated next round
    pub fn remember_bet(&self, request: &BetRequest) {
        self.last_bets
            .insert((request.user_id.clone(), request.slot), request.clone());
    }

    /// Arm cash-out targets for the bets frozen at take-off
    pub fn arm(&self, bets: &[Bet]) -> usize {
        self.armed.clear();
        for bet in bets {
            let key = (bet.user_id.clone(), bet.slot);
            if let Some(target) = self.rules.get(&key).and_then(|r| r.cash_out_at) {
                self.armed.insert(key, target);
            }
        }
        self.armed.len()
    }

    /// Fire every armed rule whose target is at or below `observed`
    pub async fn on_tick(&self, ledger: &BetLedger, round_id: &RoundId, observed: Multiplier) -> Vec<Bet> {
        let due: Vec<((UserId, Slot), Multiplier)> = self
            .armed
            .iter()
            .filter(|entry| *entry.value() <= observed)
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();

        let mut cashed = Vec::with_capacity(due.len());
        for (key, target) in due {
            self.armed.remove(&key);
            let (user_id, slot) = key;
            match ledger.cash_out(round_id, &user_id, slot, target).await {
                Ok(bet) => cashed.push(bet),
                Err(e) => debug!(round = %round_id, user = %user_id, slot, error = %e, "Auto cash-out skipped"),
            }
        }
        cashed
    }

    /// Disarm everything once the flight has ended
    pub fn disarm(&self) {
        self.armed.clear();
    }

    /// Submit the remembered bet for every slot with auto re-bet enabled.
    /// A failed re-bet switches re-betting off for that slot.
    pub async fn place_rebets(&self, ledger: &BetLedger, round_id: &RoundId) -> Vec<Bet> {
        let requests: Vec<BetRequest> = self
            .rules
            .iter()
            .filter(|rule| rule.auto_rebet)
            .filter_map(|rule| self.last_bets.get(rule.key()).map(|r| r.clone()))
            .collect();

        let mut placed = Vec::with_capacity(requests.len());
        for request in requests {
            let key = (request.user_id.clone(), request.slot);
            match ledger.submit(round_id, request).await {
                Ok(bet) => placed.push(bet),
                Err(e) => {
                    warn!(round = %round_id, user = %key.0, slot = key.1, error = %e, "Auto re-bet failed, disabling");
                    if let Some(mut rule) = self.rules.get_mut(&key) {
                        rule.auto_rebet = false;
                    }
                }
            }
        }
        placed
    }
}

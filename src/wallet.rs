//! Wallet collaborator.
//!
//! The wallet owns authoritative balances. The engine only ever holds a
//! reservation, which is finalised exactly once by a win, a loss or a
//! release. Replaying the same finalisation is a no-op so a retried
//! settlement never moves money twice.

use crate::errors::WalletError;
use crate::games::types::{ReservationId, UserId};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// How a reservation was finalised
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Finalization {
    Won { amount: u64 },
    Lost,
    Released,
}

/// Whether a finalising call moved money or replayed an earlier one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Applied,
    Replayed,
}

#[async_trait]
pub trait Wallet: Send + Sync {
    /// Atomically move `amount` from the user's available balance into a hold
    async fn reserve(&self, user_id: &UserId, amount: u64) -> Result<ReservationId, WalletError>;

    /// Consume the hold and credit `amount` (total return, stake included)
    async fn commit_win(&self, reservation_id: ReservationId, amount: u64) -> Result<CommitOutcome, WalletError>;

    /// Consume the hold with no credit
    async fn commit_loss(&self, reservation_id: ReservationId) -> Result<CommitOutcome, WalletError>;

    /// Return the held stake untouched
    async fn release(&self, reservation_id: ReservationId) -> Result<CommitOutcome, WalletError>;

    /// Spendable balance, excluding holds
    async fn balance(&self, user_id: &UserId) -> Result<u64, WalletError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Account {
    pub available: u64,
    pub held: u64,
}

#[derive(Debug, Clone)]
struct Reservation {
    user_id: UserId,
    amount: u64,
    finalized: Option<Finalization>,
}

/// DashMap-backed wallet. Each account entry is its own shard lock, so
/// concurrent reservations for one user serialise and never overdraw.
#[derive(Debug, Default)]
pub struct InMemoryWallet {
    accounts: DashMap<UserId, Account>,
    reservations: DashMap<ReservationId, Reservation>,
}

impl InMemoryWallet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit spendable funds, opening the account if needed
    pub fn deposit(&self, user_id: &UserId, amount: u64) {
        let mut account = self.accounts.entry(user_id.clone()).or_default();
        account.available = account.available.saturating_add(amount);
    }

    pub fn account(&self, user_id: &UserId) -> Option<Account> {
        self.accounts.get(user_id).map(|a| *a)
    }

    /// Final state of a reservation, if it has been finalised
    pub fn finalization(&self, reservation_id: &ReservationId) -> Option<Finalization> {
        self.reservations.get(reservation_id).and_then(|r| r.finalized)
    }

    pub fn open_reservations(&self) -> usize {
        self.reservations.iter().filter(|r| r.finalized.is_none()).count()
    }

    fn finalize(&self, reservation_id: ReservationId, finalization: Finalization) -> Result<CommitOutcome, WalletError> {
        let mut reservation = self
            .reservations
            .get_mut(&reservation_id)
            .ok_or_else(|| WalletError::UnknownReservation(reservation_id.to_string()))?;

        if let Some(previous) = reservation.finalized {
            return if previous == finalization {
                Ok(CommitOutcome::Replayed)
            } else {
                Err(WalletError::AlreadyFinalized(reservation_id.to_string()))
            };
        }

        let mut account = self
            .accounts
            .get_mut(&reservation.user_id)
            .ok_or_else(|| WalletError::UnknownAccount(reservation.user_id.to_string()))?;

        account.held = account.held.saturating_sub(reservation.amount);
        match finalization {
            Finalization::Won { amount } => account.available = account.available.saturating_add(amount),
            Finalization::Released => account.available = account.available.saturating_add(reservation.amount),
            Finalization::Lost => {}
        }
        reservation.finalized = Some(finalization);

        debug!(
            reservation = %reservation_id,
            user = %reservation.user_id,
            ?finalization,
            "Reservation finalised"
        );
        Ok(CommitOutcome::Applied)
    }
}

#[async_trait]
impl Wallet for InMemoryWallet {
    async fn reserve(&self, user_id: &UserId, amount: u64) -> Result<ReservationId, WalletError> {
        {
            let mut account = self
                .accounts
                .get_mut(user_id)
                .ok_or_else(|| WalletError::UnknownAccount(user_id.to_string()))?;
            if account.available < amount {
                return Err(WalletError::InsufficientFunds {
                    requested: amount,
                    available: account.available,
                });
            }
            account.available -= amount;
            account.held += amount;
        }

        let reservation_id = ReservationId::new();
        self.reservations.insert(
            reservation_id,
            Reservation {
                user_id: user_id.clone(),
                amount,
                finalized: None,
            },
        );
        Ok(reservation_id)
    }

    async fn commit_win(&self, reservation_id: ReservationId, amount: u64) -> Result<CommitOutcome, WalletError> {
        self.finalize(reservation_id, Finalization::Won { amount })
    }

    async fn commit_loss(&self, reservation_id: ReservationId) -> Result<CommitOutcome, WalletError> {
        self.finalize(reservation_id, Finalization::Lost)
    }

    async fn release(&self, reservation_id: ReservationId) -> Result<CommitOutcome, WalletError> {
        self.finalize(reservation_id, Finalization::Released)
    }

    async fn balance(&self, user_id: &UserId) -> Result<u64, WalletError> {
        self.accounts
            .get(user_id)
            .map(|a| a.available)
            .ok_or_else(|| WalletError::UnknownAccount(user_id.to_string()))
    }
}

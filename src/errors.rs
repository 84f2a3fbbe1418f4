//! Error types for the round engine
//!
//! Every rejection is local and synchronous: a failed bet never leaves a
//! dangling reservation, and a failed round is isolated to its own table.

use crate::games::types::{GameType, Multiplier, RoundId, TableId};

/// Root error type for all engine operations
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Bet rejected: {0}")]
    Bet(#[from] BetError),

    #[error("Wallet error: {0}")]
    Wallet(#[from] WalletError),

    #[error("Round error: {0}")]
    Round(#[from] RoundError),

    #[error("History store error: {0}")]
    History(String),
}

/// Configuration and validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Missing required field: {0}")]
    MissingRequired(String),

    #[error("Invalid value for {field}: '{value}' ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("Failed to save configuration: {0}")]
    SaveFailed(String),
}

/// Reasons a bet submission is refused. None of these leave side effects.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BetError {
    #[error("Insufficient funds")]
    InsufficientFunds,

    #[error("Round {0} is not accepting bets")]
    RoundClosed(RoundId),

    #[error("Slot {slot} already holds a bet in round {round_id}")]
    DuplicateSlotBet { round_id: RoundId, slot: u8 },

    #[error("Stake {stake} outside limits [{min}, {max}]")]
    StakeOutOfRange { stake: u64, min: u64, max: u64 },

    #[error("Bet is not valid for {game}: {reason}")]
    InvalidBet { game: GameType, reason: String },

    #[error("Unknown table: {0}")]
    UnknownTable(TableId),

    #[error("Unknown round: {0}")]
    UnknownRound(RoundId),

    #[error("Wallet unavailable: {0}")]
    WalletUnavailable(String),
}

impl BetError {
    /// Short machine-readable label, used for metrics and event payloads
    pub fn code(&self) -> &'static str {
        match self {
            BetError::InsufficientFunds => "insufficient_funds",
            BetError::RoundClosed(_) => "round_closed",
            BetError::DuplicateSlotBet { .. } => "duplicate_slot_bet",
            BetError::StakeOutOfRange { .. } => "stake_out_of_range",
            BetError::InvalidBet { .. } => "invalid_bet",
            BetError::UnknownTable(_) => "unknown_table",
            BetError::UnknownRound(_) => "unknown_round",
            BetError::WalletUnavailable(_) => "wallet_unavailable",
        }
    }
}

/// Errors surfaced by a [`crate::wallet::Wallet`] implementation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WalletError {
    #[error("Insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds { requested: u64, available: u64 },

    #[error("Unknown account: {0}")]
    UnknownAccount(String),

    #[error("Unknown reservation: {0}")]
    UnknownReservation(String),

    #[error("Reservation {0} already finalized differently")]
    AlreadyFinalized(String),

    #[error("Wallet unavailable: {0}")]
    Unavailable(String),
}

impl From<WalletError> for BetError {
    fn from(e: WalletError) -> Self {
        match e {
            WalletError::InsufficientFunds { .. } | WalletError::UnknownAccount(_) => {
                BetError::InsufficientFunds
            }
            other => BetError::WalletUnavailable(other.to_string()),
        }
    }
}

/// Round-level failures. Each one voids the affected round only.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RoundError {
    #[error("Settlement for round {round_id} did not finish within {timeout_ms}ms")]
    SettlementTimeout { round_id: RoundId, timeout_ms: u64 },

    #[error("Outcome generation failed for round {round_id}: {reason}")]
    OutcomeGenerationFailure { round_id: RoundId, reason: String },

    #[error("Outcome already generated for round {0}")]
    OutcomeAlreadyGenerated(RoundId),

    #[error("Cash-out rejected at {multiplier}: {reason}")]
    CashOutRejected { multiplier: Multiplier, reason: String },

    #[error("Round {0} was voided by operator")]
    Cancelled(RoundId),
}

impl From<toml::de::Error> for ConfigurationError {
    fn from(e: toml::de::Error) -> Self {
        ConfigurationError::LoadFailed(format!("Failed to parse TOML: {}", e))
    }
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        EngineError::Configuration(ConfigurationError::LoadFailed(e.to_string()))
    }
}

// Convenience type alias for Results
pub type EngineResult<T> = Result<T, EngineError>;

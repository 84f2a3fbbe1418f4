//! Roundhouse - round-based casino outcome and settlement engine
//!
//! Each table runs a fixed cycle: accept bets, lock them, draw one
//! provably fair outcome, settle every bet against a wallet exactly once,
//! then cool down and open the next round. Crash tables fly a live
//! multiplier during the locked phase and honour manual and automatic
//! cash-outs.

pub mod auto_action;
pub mod casino;
pub mod config;
pub mod errors;
pub mod games;
pub mod history;
pub mod ledger;
pub mod logging;
pub mod metrics;
pub mod scheduler;
pub mod settlement;
pub mod wallet;

pub use auto_action::{AutoActionEngine, AutoRule};
pub use casino::{Casino, CasinoBuilder, TableHandle};
pub use config::{ConfigBuilder, ConfigLoader, EngineConfig, TableConfig};
pub use errors::{BetError, ConfigurationError, EngineError, EngineResult, RoundError, WalletError};
pub use history::{HistoryStore, InMemoryHistoryStore};
pub use ledger::{BetLedger, BetRequest};
pub use metrics::EngineMetrics;
pub use scheduler::{PhaseClock, RoundSnapshot, TableEvent};
pub use settlement::{BetSettlement, SettlementEngine, SettlementReport, VoidReport};
pub use wallet::{InMemoryWallet, Wallet};

pub mod cards;
pub mod outcome;
pub mod payout;
pub mod rng;
pub mod types;
pub mod vrf_engine;

pub use outcome::{CrashCurve, GameParams, OutcomeGenerator, StandardOutcomes};
pub use payout::PayoutTable;
pub use rng::RoundRng;
pub use types::*;
pub use vrf_engine::VRFGameEngine;
